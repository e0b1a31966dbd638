//! Operator resolution.
//!
//! Maps operand types to the opcode to emit and the result type. Basic
//! operands go through the static tables in [`tables`]; composite stores
//! (tables, fields, arrays) are checked structurally.

pub mod tables;

use crate::bytecode::Opcode;
use crate::types::{
    FieldArena, FieldMismatch, Primitive, TypeCode, TypeRef, fields_compatible, tables_compatible,
};
use std::fmt;
use tables::{BinaryTable, UnaryTable};

/// Binary operators with a dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `OR`
    Or,
    /// `AND`
    And,
    /// `XOR`
    Xor,
}

impl BinaryOp {
    /// Every binary operator.
    pub const ALL: [BinaryOp; 14] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::Eq,
        Self::Ne,
        Self::Or,
        Self::And,
        Self::Xor,
    ];

    /// The operator's dispatch table.
    #[must_use]
    pub fn table(self) -> &'static BinaryTable {
        match self {
            Self::Add => &tables::ADD,
            Self::Sub => &tables::SUB,
            Self::Mul => &tables::MUL,
            Self::Div => &tables::DIV,
            Self::Mod => &tables::MOD,
            Self::Lt => &tables::LT,
            Self::Le => &tables::LE,
            Self::Gt => &tables::GT,
            Self::Ge => &tables::GE,
            Self::Eq => &tables::EQ,
            Self::Ne => &tables::NE,
            Self::Or => &tables::OR,
            Self::And => &tables::AND,
            Self::Xor => &tables::XOR,
        }
    }

    /// Whether `table[a][b] == table[b][a]` must hold.
    #[inline]
    #[must_use]
    pub const fn is_symmetric(self) -> bool {
        !matches!(self, Self::Mod)
    }

    /// Source spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Or => "OR",
            Self::And => "AND",
            Self::Xor => "XOR",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `++`
    Inc,
    /// `--`
    Dec,
    /// `NOT`
    Not,
}

impl UnaryOp {
    /// The operator's dispatch table.
    #[must_use]
    pub fn table(self) -> &'static UnaryTable {
        match self {
            Self::Inc => &tables::INC,
            Self::Dec => &tables::DEC,
            Self::Not => &tables::NOT,
        }
    }

    /// Whether the operand must be assignable.
    #[inline]
    #[must_use]
    pub const fn needs_lvalue(self) -> bool {
        matches!(self, Self::Inc | Self::Dec)
    }

    /// Source spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Inc => "++",
            Self::Dec => "--",
            Self::Not => "NOT",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Outcome of resolving an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpResolution {
    /// Opcode to emit.
    pub opcode: Opcode,
    /// Result type.
    pub result: TypeCode,
    /// Integer operands of different signedness.
    pub sign_mismatch: bool,
}

impl From<tables::TableEntry> for OpResolution {
    fn from(entry: tables::TableEntry) -> Self {
        Self {
            opcode: entry.opcode,
            result: TypeCode::basic(entry.result),
            sign_mismatch: entry.sign_mismatch,
        }
    }
}

/// Resolve a binary operator on basic operands.
#[must_use]
pub fn resolve_binary(op: BinaryOp, left: Primitive, right: Primitive) -> Option<OpResolution> {
    op.table()[left.index()][right.index()].map(OpResolution::from)
}

/// Resolve a unary operator on a basic operand.
#[must_use]
pub fn resolve_unary(op: UnaryOp, operand: Primitive) -> Option<OpResolution> {
    op.table()[operand.index()].map(OpResolution::from)
}

/// Resolve a store of a basic `src` into a basic `dst`.
#[must_use]
pub fn resolve_store(dst: Primitive, src: Primitive) -> Option<OpResolution> {
    tables::STORE[dst.index()][src.index()].map(OpResolution::from)
}

/// Why a value cannot be stored into a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMismatch {
    /// No store rule for the type pair.
    NotApplicable,
    /// Table columns do not line up.
    Fields(FieldMismatch),
}

/// Resolve a store of any type into any type, composites included.
///
/// With `ignore_missing`, a destination table column absent from the
/// source table is tolerated (assignment); argument passing and returns
/// use strict matching.
pub fn resolve_assignment(
    arena: &FieldArena,
    dst: TypeRef,
    src: TypeRef,
    ignore_missing: bool,
) -> Result<OpResolution, StoreMismatch> {
    let (d, s) = (dst.ty, src.ty);
    if d.is_unknown() || s.is_unknown() {
        return Err(StoreMismatch::NotApplicable);
    }
    let is_null = s == TypeCode::NULL;
    let composite = |opcode| {
        Ok(OpResolution {
            opcode,
            result: d,
            sign_mismatch: false,
        })
    };

    if d.is_table() {
        if is_null {
            return composite(Opcode::StoTA);
        }
        if !s.is_table() {
            return Err(StoreMismatch::NotApplicable);
        }
        return match (dst.fields, src.fields) {
            (None, _) => composite(Opcode::StoTA),
            (Some(_), None) => Err(StoreMismatch::NotApplicable),
            (Some(df), Some(sf)) => tables_compatible(arena, sf, df, ignore_missing)
                .map_err(StoreMismatch::Fields)
                .and_then(|()| composite(Opcode::StoTA)),
        };
    }

    if d.is_field() {
        if is_null {
            return composite(Opcode::StoF);
        }
        if !s.is_field() || s.is_table() {
            return Err(StoreMismatch::NotApplicable);
        }
        let (dc, sc) = (strip_field(d), strip_field(s));
        let generic = dc == TypeCode::NULL;
        if generic || fields_compatible(dc, sc) {
            return composite(Opcode::StoF);
        }
        return Err(StoreMismatch::NotApplicable);
    }

    if d.is_array() {
        if is_null {
            return composite(Opcode::StoA);
        }
        if !s.is_array() || s.is_field() || s.is_table() {
            return Err(StoreMismatch::NotApplicable);
        }
        if d.base == s.base
            || d.base == Primitive::Undetermined
            || s.base == Primitive::Undetermined
        {
            return composite(Opcode::StoA);
        }
        return Err(StoreMismatch::NotApplicable);
    }

    if !s.is_basic() {
        return Err(StoreMismatch::NotApplicable);
    }
    resolve_store(d.base, s.base).ok_or(StoreMismatch::NotApplicable)
}

fn strip_field(ty: TypeCode) -> TypeCode {
    TypeCode {
        base: ty.base,
        flags: ty.flags.difference(crate::types::TypeFlags::FIELD),
    }
}
