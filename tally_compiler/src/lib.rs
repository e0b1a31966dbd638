//! Semantic analysis and bytecode generation for tally.
//!
//! The crate is the back half of the front end: an external parser driver
//! builds [semantic values](values) for each reduction and calls the
//! actions of a [`CompilationUnit`], which checks types, resolves names and
//! emits stack bytecode.
//!
//! # Architecture
//!
//! ```text
//! parser actions → ValuePool → ExprTranslator / StatementCompiler → CompiledUnit
//!                                   │                │
//!                           ops tables, types   branch/loop backpatch stacks
//! ```
//!
//! # Key Types
//!
//! - [`CompilationUnit`] - Per-unit compiler state and the semantic actions
//! - [`TypeCode`] - Primitive base plus array/field/table modifiers
//! - [`Opcode`] - Bytecode operation enumeration
//! - [`CompiledUnit`] - Code, constants area and type descriptors of a unit
//!
//! # Example
//!
//! ```
//! use tally_compiler::values::ParamSpec;
//! use tally_compiler::{BinaryOp, CompilationUnit, CompilerConfig, ExprOp, Primitive, TypeSpec};
//! use tally_core::Span;
//!
//! let mut unit = CompilationUnit::new(CompilerConfig::default());
//!
//! // PROCEDURE twice(n AS INT8) AS INT32
//! let name = unit.values().identifier("twice", Span::new(10, 15))?;
//! let n = ParamSpec {
//!     name: "n".into(),
//!     spec: TypeSpec::basic(Primitive::Int8),
//!     span: Span::new(16, 17),
//! };
//! let params = unit.values().param_list(vec![n], Span::new(16, 25))?;
//! let ret = unit.values().type_spec(TypeSpec::basic(Primitive::Int32), Span::new(30, 35))?;
//! unit.declare_procedure(name, ret, Some(params), false)?;
//!
//! let name = unit.values().identifier("twice", Span::new(10, 15))?;
//! unit.begin_procedure(name)?;
//!
//! // RETURN n + n
//! let l = unit.values().identifier("n", Span::new(50, 51))?;
//! let r = unit.values().identifier("n", Span::new(54, 55))?;
//! let sum = unit
//!     .values()
//!     .create_exp_link(ExprOp::Binary(BinaryOp::Add), &[l, r], Span::new(50, 55))?;
//! unit.return_statement(sum)?;
//! unit.end_procedure()?;
//!
//! let image = unit.finish()?;
//! let body = image.procedure("twice").and_then(|p| p.body.as_ref());
//! assert!(body.is_some_and(|b| b.code.ends_with(&[0x40, 0x01])));
//! # Ok::<(), tally_core::CompileError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod ops;
pub mod scope;
pub mod types;
pub mod unit;
pub mod values;

// Re-export main types
pub use bytecode::{CodeBuilder, InstrOffset, Opcode, Operand, decode, disassemble};
pub use compiler::{ExprResult, ExprTranslator, StatementCompiler};
pub use config::CompilerConfig;
pub use ops::{BinaryOp, UnaryOp};
pub use types::{FieldSpec, Primitive, TypeCode, TypeFlags, TypeRef, TypeSpec, ValueKind};
pub use unit::{CompilationUnit, CompiledUnit, GlobalImage, ProcedureCode, ProcedureImage};
pub use values::{ExprOp, Literal, SemValue, ValueId, ValuePool};
