//! Operator Resolution and Descriptor Benchmarks
//!
//! Measures the cost of the per-node type checks done while translating
//! expressions.
//!
//! # Key Metrics
//!
//! - Table lookup: a single indexed load per binary operator
//! - Descriptor interning: linear scan of the blob on every declaration
//! - End-to-end: translating a chain of additions inside one procedure

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tally_compiler::ops::{resolve_binary, resolve_store};
use tally_compiler::types::{DescriptorBlob, FieldDescriptor};
use tally_compiler::values::ParamSpec;
use tally_compiler::{
    BinaryOp, CompilationUnit, CompilerConfig, ExprOp, Primitive, TypeCode, TypeSpec,
};
use tally_core::{CompileResult, Span};

// =============================================================================
// Table Lookup
// =============================================================================

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    group.bench_function("add_int8_int16", |b| {
        b.iter(|| {
            black_box(resolve_binary(
                black_box(BinaryOp::Add),
                black_box(Primitive::Int8),
                black_box(Primitive::Int16),
            ))
        })
    });

    group.bench_function("all_pairs", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for op in BinaryOp::ALL {
                for l in Primitive::ALL {
                    for r in Primitive::ALL {
                        hits += usize::from(resolve_binary(op, l, r).is_some());
                    }
                }
            }
            black_box(hits)
        })
    });

    group.bench_function("store_text_char", |b| {
        b.iter(|| black_box(resolve_store(black_box(Primitive::Text), black_box(Primitive::Char))))
    });

    group.finish();
}

// =============================================================================
// Descriptor Interning
// =============================================================================

fn table_fields(prefix: &str, columns: usize) -> Vec<FieldDescriptor> {
    (0..columns)
        .map(|i| FieldDescriptor {
            label: format!("{prefix}{i}").into(),
            ty: TypeCode::basic(Primitive::ALL[1 + i % 16]),
        })
        .collect()
}

fn bench_descriptors(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptors");

    for columns in [1usize, 8, 32] {
        let fields = table_fields("col", columns);
        group.bench_with_input(BenchmarkId::new("encode", columns), &fields, |b, fields| {
            b.iter(|| black_box(DescriptorBlob::encode(TypeCode::TABLE, fields)))
        });
    }

    // Re-interning the last of many distinct descriptors scans the whole blob.
    for distinct in [16usize, 256] {
        let mut blob = DescriptorBlob::new();
        for i in 0..distinct {
            let _ = blob.intern(TypeCode::TABLE, &table_fields(&format!("t{i}_"), 1 + i % 8));
        }
        let probe = table_fields(&format!("t{}_", distinct - 1), 1 + (distinct - 1) % 8);
        group.bench_with_input(BenchmarkId::new("intern_hit", distinct), &probe, |b, probe| {
            b.iter_batched_ref(
                || blob.clone(),
                |blob| black_box(blob.intern(TypeCode::TABLE, probe)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// =============================================================================
// Expression Translation
// =============================================================================

/// Compile `RETURN n + n + ... + n` with `terms` operands.
fn compile_sum(terms: usize) -> CompileResult<usize> {
    let mut unit = CompilationUnit::new(CompilerConfig::default());
    let span = Span::new(1, 2);
    let name = unit.values().identifier("sum", span)?;
    let param = ParamSpec {
        name: "n".into(),
        spec: TypeSpec::basic(Primitive::Int32),
        span,
    };
    let params = unit.values().param_list(vec![param], span)?;
    let ret = unit
        .values()
        .type_spec(TypeSpec::basic(Primitive::Int64), span)?;
    unit.declare_procedure(name, ret, Some(params), false)?;
    let name = unit.values().identifier("sum", span)?;
    unit.begin_procedure(name)?;

    let mut acc = unit.values().identifier("n", span)?;
    for _ in 1..terms {
        let next = unit.values().identifier("n", span)?;
        acc = unit
            .values()
            .create_exp_link(ExprOp::Binary(BinaryOp::Add), &[acc, next], span)?;
    }
    unit.return_statement(acc)?;
    unit.end_procedure()?;
    let image = unit.finish()?;
    Ok(image.code("sum").map_or(0, <[u8]>::len))
}

fn bench_translate(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate");

    for terms in [2usize, 64, 512] {
        group.bench_with_input(BenchmarkId::new("sum_chain", terms), &terms, |b, &terms| {
            b.iter(|| black_box(compile_sum(terms)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_descriptors, bench_translate);
criterion_main!(benches);
