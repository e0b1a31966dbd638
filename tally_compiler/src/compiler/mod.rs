//! Syntax-directed translation into bytecode.
//!
//! The parser driver reduces source text into trees of pooled semantic
//! values; the [`ExprTranslator`] walks an expression tree post-order and
//! the [`StatementCompiler`] wraps conditions and bodies with the jump
//! skeletons of `IF`, `WHILE`, `UNTIL` and `SYNC`.
//!
//! Both borrow the unit-wide [`UnitContext`] and the [`ProcedureState`] of
//! the procedure being compiled.

mod expr;
mod stmt;

pub use expr::ExprTranslator;
pub use stmt::StatementCompiler;

use crate::bytecode::{CodeBuilder, InstrOffset};
use crate::config::CompilerConfig;
use crate::scope::{GlobalScope, LocalScope, ProcId};
use crate::types::{
    DescriptorBlob, FieldArena, FieldDescriptor, Primitive, TypeCode, TypeRef, TypeSpec,
    ValueKind,
};
use crate::values::ValuePool;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tally_core::{
    CompileResult, Diagnostic, DiagnosticLog, MessageCode, Severity, Span, StringPool,
};

/// Branch stack; `IF` chains rarely nest deeper than four.
pub type BranchStack = SmallVec<[BranchEntry; 4]>;

/// Loop stack holding loops and their pending `BREAK`/`CONTINUE` jumps.
pub type LoopStack = SmallVec<[LoopEntry; 4]>;

// =============================================================================
// Expression Results
// =============================================================================

/// Type and shape of a translated expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprResult {
    /// Result type; `TypeCode::UNKNOWN` after an error.
    pub ty: TypeRef,
    /// Assignability.
    pub kind: ValueKind,
    /// The expression is a literal.
    pub literal: bool,
    /// Source span.
    pub span: Span,
}

impl ExprResult {
    /// The failure sentinel.
    #[must_use]
    pub const fn unknown(span: Span) -> Self {
        Self::rvalue(TypeCode::UNKNOWN, span)
    }

    /// A computed value of type `ty`.
    #[must_use]
    pub const fn rvalue(ty: TypeCode, span: Span) -> Self {
        Self {
            ty: TypeRef::plain(ty),
            kind: ValueKind::RValue,
            literal: false,
            span,
        }
    }

    /// Whether translation failed.
    #[inline]
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.ty.ty.is_unknown()
    }

    /// Base primitive when the result is a basic type.
    #[inline]
    #[must_use]
    pub const fn basic(&self) -> Option<Primitive> {
        if self.ty.ty.is_basic() {
            Some(self.ty.ty.base)
        } else {
            None
        }
    }
}

// =============================================================================
// Backpatch Stacks
// =============================================================================

/// Kind of an `IF` chain entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// The `IF` opening a chain.
    If,
    /// An `ELSEIF` continuing it.
    ElseIf,
}

/// Pending jumps of one arm of an `IF` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchEntry {
    /// Entry kind.
    pub kind: BranchKind,
    /// The arm's conditional jump over its body.
    pub start: InstrOffset,
    /// Jump from the end of the body past the rest of the chain.
    pub else_pos: Option<InstrOffset>,
    /// An `ELSE` has been seen.
    pub has_else: bool,
}

/// Entry of the loop stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEntry {
    /// A `WHILE` loop: condition start and exit jump.
    While {
        /// First instruction of the condition.
        start: InstrOffset,
        /// Conditional jump leaving the loop.
        exit: InstrOffset,
    },
    /// An `UNTIL` loop.
    Until {
        /// First instruction of the body.
        start: InstrOffset,
    },
    /// Pending `BREAK`.
    Break {
        /// Jump to patch past the loop.
        jump: InstrOffset,
    },
    /// Pending `CONTINUE` of an `UNTIL` loop.
    Continue {
        /// Jump to patch to the condition.
        jump: InstrOffset,
    },
}

impl LoopEntry {
    /// Whether the entry opens a loop.
    #[inline]
    #[must_use]
    pub const fn is_loop(&self) -> bool {
        matches!(self, Self::While { .. } | Self::Until { .. })
    }
}

// =============================================================================
// Procedure State
// =============================================================================

/// Everything owned by the procedure being compiled.
///
/// Dropped together when the procedure ends.
#[derive(Debug)]
pub struct ProcedureState {
    /// Procedure symbol; `None` when the header was rejected and the body
    /// is compiled only for diagnostics.
    pub proc: Option<ProcId>,
    /// Procedure name.
    pub name: Box<str>,
    /// Declared return type.
    pub return_type: TypeRef,
    /// Parameters and locals.
    pub locals: LocalScope,
    /// Instruction buffer.
    pub code: CodeBuilder,
    /// Open `IF` chains.
    pub branches: BranchStack,
    /// Open loops.
    pub loops: LoopStack,
    /// Sync counter: low bit set inside a block, block index above it.
    pub sync: u32,
    /// `SYNC` blocks that were rejected and whose end is still pending.
    pub sync_rejected: u32,
}

impl ProcedureState {
    /// Create the state for a procedure body.
    #[must_use]
    pub fn new(proc: Option<ProcId>, name: &str, return_type: TypeRef, locals: LocalScope) -> Self {
        Self {
            proc,
            name: name.into(),
            return_type,
            locals,
            code: CodeBuilder::new(),
            branches: BranchStack::new(),
            loops: LoopStack::new(),
            sync: 0,
            sync_rejected: 0,
        }
    }

    /// Whether a `SYNC` block is open.
    #[inline]
    #[must_use]
    pub const fn in_sync(&self) -> bool {
        self.sync & 1 == 1 || self.sync_rejected > 0
    }

    /// Number of sync blocks emitted so far.
    #[inline]
    #[must_use]
    pub const fn sync_blocks(&self) -> u32 {
        (self.sync + 1) >> 1
    }

    /// Whether every backpatch stack is empty and no sync block is open.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.branches.is_empty() && self.loops.is_empty() && !self.in_sync()
    }
}

// =============================================================================
// Unit Context
// =============================================================================

/// State shared by every action of one compilation unit.
#[derive(Debug)]
pub struct UnitContext {
    /// Semantic values handed over by the parser driver.
    pub values: ValuePool,
    /// Globals and procedures.
    pub globals: GlobalScope,
    /// Field lists of table types.
    pub fields: FieldArena,
    /// Interned type descriptors.
    pub descriptors: DescriptorBlob,
    /// Constants area.
    pub constants: StringPool,
    /// Reported diagnostics.
    pub diagnostics: DiagnosticLog,
    /// Options.
    pub config: CompilerConfig,
    /// An error was reported; no image will be produced.
    pub aborted: bool,
}

impl UnitContext {
    /// Create an empty context.
    #[must_use]
    pub fn new(config: CompilerConfig, mut diagnostics: DiagnosticLog) -> Self {
        diagnostics.set_warnings_as_errors(config.warnings_as_errors);
        Self {
            values: ValuePool::new(),
            globals: GlobalScope::new(),
            fields: FieldArena::new(),
            descriptors: DescriptorBlob::new(),
            constants: StringPool::new(),
            diagnostics,
            config,
            aborted: false,
        }
    }

    /// Report a user error and set the abort flag.
    pub fn error(&mut self, code: MessageCode, span: Span, message: impl Into<String>) {
        self.aborted = true;
        self.diagnostics.report(Diagnostic::at(code, span, message));
    }

    /// Report a warning.
    pub fn warning(&mut self, code: MessageCode, span: Span, message: impl Into<String>) {
        if self.config.warnings_as_errors {
            self.aborted = true;
        }
        self.diagnostics
            .report(Diagnostic::at(code, span, message).with_severity(Severity::Warning));
    }

    /// Attach a contextual note to the previous diagnostic.
    pub fn note(&mut self, code: MessageCode, span: Span, message: impl Into<String>) {
        self.diagnostics
            .report(Diagnostic::at(code, span, message).with_severity(Severity::Extra));
    }

    /// Resolve a written type: validate table columns and store them in
    /// the field arena.
    ///
    /// A repeated column label, or a column typed as a field or table, is
    /// reported and the column dropped.
    pub fn resolve_type_spec(&mut self, spec: TypeSpec) -> CompileResult<TypeRef> {
        if !spec.ty.is_table() || spec.fields.is_empty() {
            return Ok(TypeRef::plain(spec.ty));
        }
        let mut seen = FxHashSet::default();
        let mut columns = Vec::with_capacity(spec.fields.len());
        for field in spec.fields {
            if !seen.insert(field.name.clone()) {
                self.error(
                    MessageCode::DuplicateField,
                    field.span,
                    format!("field `{}` is declared twice in this table", field.name),
                );
                continue;
            }
            if field.ty.is_field() || field.ty.is_table() {
                self.error(
                    MessageCode::InvalidColumnType,
                    field.span,
                    format!(
                        "column `{}` cannot have type {}; columns hold basic values or arrays",
                        field.name, field.ty
                    ),
                );
                continue;
            }
            columns.push(FieldDescriptor {
                label: field.name,
                ty: field.ty,
            });
        }
        let id = self.fields.alloc(columns)?;
        Ok(TypeRef {
            ty: spec.ty,
            fields: Some(id),
        })
    }

    /// Intern the descriptor of a resolved type.
    pub fn descriptor_of(&mut self, ty: TypeRef) -> CompileResult<u32> {
        let columns = ty.fields.map_or(&[][..], |id| self.fields.get(id));
        self.descriptors.intern(ty.ty, columns)
    }
}
