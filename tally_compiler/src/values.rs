//! Semantic value pool.
//!
//! The parser driver produces one semantic value per token or reduced
//! sub-expression and hands the compiler [`ValueId`]s. Values live in an
//! arena of slots; consuming a value frees its slot for reuse, and a freed
//! slot can never be read again through a stale id without an internal
//! error being raised.

use crate::ops::{BinaryOp, UnaryOp};
use crate::types::{Primitive, TypeCode, TypeSpec};
use tally_core::{CompileError, CompileResult, MessageCode, Span};

/// Index of a slot in the [`ValuePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ValueId(pub u32);

/// Calendar date literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateValue {
    /// Year.
    pub year: u16,
    /// Month, 1-12.
    pub month: u8,
    /// Day, 1-31.
    pub day: u8,
}

impl DateValue {
    /// Packed encoding `year << 16 | month << 8 | day`.
    #[inline]
    #[must_use]
    pub const fn packed(self) -> u32 {
        (self.year as u32) << 16 | (self.month as u32) << 8 | self.day as u32
    }
}

/// Time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeValue {
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
    /// Second, 0-59.
    pub second: u8,
    /// Microsecond, only kept by high resolution literals.
    pub micros: u32,
}

impl TimeValue {
    /// Date and time packed as `date << 32 | hour << 16 | minute << 8 | second`.
    #[inline]
    #[must_use]
    pub const fn packed_with(self, date: DateValue) -> u64 {
        (date.packed() as u64) << 32
            | (self.hour as u64) << 16
            | (self.minute as u64) << 8
            | self.second as u64
    }
}

/// A literal value as delivered by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// `NULL`.
    Null,
    /// `TRUE` / `FALSE`.
    Bool(bool),
    /// Character literal.
    Char(char),
    /// Integer literal as magnitude and sign.
    Int {
        /// Absolute value.
        magnitude: u64,
        /// Preceded by a minus sign.
        negative: bool,
    },
    /// Real literal split into integer part and scaled fraction.
    Real {
        /// Integer part, signed.
        integer: i64,
        /// Fraction digits as an integer.
        fraction: u64,
        /// Power of ten dividing `fraction`.
        precision: u64,
    },
    /// Text literal.
    Text(Box<str>),
    /// Date literal.
    Date(DateValue),
    /// Date-time literal.
    DateTime(DateValue, TimeValue),
    /// High resolution time literal.
    HiresTime(DateValue, TimeValue),
}

impl Literal {
    /// Integer literal from a signed value.
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Int {
            magnitude: value.unsigned_abs(),
            negative: value < 0,
        }
    }

    /// Type of the literal.
    ///
    /// Integers take the narrowest signed type that holds them, or
    /// `UINT64` above `i64::MAX`. A negative integer below `i64::MIN`
    /// fits nothing and types as `UNKNOWN`. Reals are always `RICHREAL`.
    #[must_use]
    pub fn type_code(&self) -> TypeCode {
        let base = match self {
            Self::Null => Primitive::Undetermined,
            Self::Bool(_) => Primitive::Bool,
            Self::Char(_) => Primitive::Char,
            Self::Int {
                magnitude,
                negative,
            } => integer_kind(*magnitude, *negative),
            Self::Real { .. } => Primitive::RichReal,
            Self::Text(_) => Primitive::Text,
            Self::Date(_) => Primitive::Date,
            Self::DateTime(..) => Primitive::DateTime,
            Self::HiresTime(..) => Primitive::HiresTime,
        };
        TypeCode::basic(base)
    }
}

fn integer_kind(magnitude: u64, negative: bool) -> Primitive {
    let limit = |max: u64| if negative { magnitude <= max + 1 } else { magnitude <= max };
    if limit(i8::MAX as u64) {
        Primitive::Int8
    } else if limit(i16::MAX as u64) {
        Primitive::Int16
    } else if limit(i32::MAX as u64) {
        Primitive::Int32
    } else if limit(i64::MAX as u64) {
        Primitive::Int64
    } else if negative {
        Primitive::Unknown
    } else {
        Primitive::UInt64
    }
}

/// Operation of an expression tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    /// `left <op> right`.
    Binary(BinaryOp),
    /// `<op> operand`.
    Unary(UnaryOp),
    /// `destination = source`.
    Assign,
    /// `base[index]`.
    Index,
    /// `table.field`: operands are the table and an identifier.
    Field,
    /// `table[row, field]`: table, row, identifier.
    TableValue,
    /// `callee(args)`: identifier and an argument list.
    Call,
}

/// A procedure parameter as written in a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: Box<str>,
    /// Parameter type.
    pub spec: TypeSpec,
    /// Position of the name.
    pub span: Span,
}

/// A pooled semantic value.
#[derive(Debug, Clone, PartialEq)]
pub enum SemValue {
    /// Slot available for reuse.
    Free,
    /// Identifier token.
    Identifier(Box<str>),
    /// Literal token.
    Literal(Literal),
    /// Comma-separated identifiers of a declaration.
    IdList(Vec<(Box<str>, Span)>),
    /// Type specification.
    TypeSpec(TypeSpec),
    /// Procedure parameter list.
    ParamList(Vec<ParamSpec>),
    /// Call argument expressions.
    ArgList(Vec<ValueId>),
    /// Expression tree node.
    ExpLink {
        /// Node operation.
        op: ExprOp,
        /// Child values; unused trailing slots are `None`.
        operands: [Option<ValueId>; 3],
    },
}

impl SemValue {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Free => "free slot",
            Self::Identifier(_) => "identifier",
            Self::Literal(_) => "literal",
            Self::IdList(_) => "identifier list",
            Self::TypeSpec(_) => "type specification",
            Self::ParamList(_) => "parameter list",
            Self::ArgList(_) => "argument list",
            Self::ExpLink { .. } => "expression",
        }
    }
}

#[derive(Debug)]
struct Slot {
    value: SemValue,
    span: Span,
}

/// Arena of semantic values for one compilation unit.
#[derive(Debug, Default)]
pub struct ValuePool {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ValuePool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, reusing a freed slot when one is available.
    pub fn alloc(&mut self, value: SemValue, span: Span) -> CompileResult<ValueId> {
        if matches!(value, SemValue::Free) {
            return Err(invalid("cannot allocate a free slot"));
        }
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Slot { value, span };
            return Ok(ValueId(index));
        }
        let index = u32::try_from(self.slots.len())
            .map_err(|_| CompileError::out_of_memory("value pool"))?;
        self.slots
            .try_reserve(1)
            .map_err(|_| CompileError::out_of_memory("value pool"))?;
        self.slots.push(Slot { value, span });
        Ok(ValueId(index))
    }

    /// Store an identifier.
    pub fn identifier(&mut self, name: &str, span: Span) -> CompileResult<ValueId> {
        self.alloc(SemValue::Identifier(name.into()), span)
    }

    /// Store a literal.
    pub fn literal(&mut self, literal: Literal, span: Span) -> CompileResult<ValueId> {
        self.alloc(SemValue::Literal(literal), span)
    }

    /// Store a type specification.
    pub fn type_spec(&mut self, spec: TypeSpec, span: Span) -> CompileResult<ValueId> {
        self.alloc(SemValue::TypeSpec(spec), span)
    }

    /// Store the identifiers of a declaration.
    pub fn id_list(&mut self, names: Vec<(Box<str>, Span)>, span: Span) -> CompileResult<ValueId> {
        self.alloc(SemValue::IdList(names), span)
    }

    /// Store a procedure parameter list.
    pub fn param_list(&mut self, params: Vec<ParamSpec>, span: Span) -> CompileResult<ValueId> {
        self.alloc(SemValue::ParamList(params), span)
    }

    /// Store a call argument list.
    pub fn arg_list(&mut self, args: Vec<ValueId>, span: Span) -> CompileResult<ValueId> {
        self.alloc(SemValue::ArgList(args), span)
    }

    /// Create an expression tree node over previously stored operands.
    ///
    /// The node's span covers all operand spans.
    pub fn create_exp_link(
        &mut self,
        op: ExprOp,
        operands: &[ValueId],
        span: Span,
    ) -> CompileResult<ValueId> {
        let arity = match op {
            ExprOp::Unary(_) => 1,
            ExprOp::Binary(_) | ExprOp::Assign | ExprOp::Index | ExprOp::Field | ExprOp::Call => 2,
            ExprOp::TableValue => 3,
        };
        if operands.len() != arity {
            return Err(invalid(format!(
                "{op:?} takes {arity} operands, got {}",
                operands.len()
            )));
        }
        let mut slots = [None; 3];
        let mut covered = span;
        for (slot, &id) in slots.iter_mut().zip(operands) {
            covered = covered.merge(self.span(id)?);
            *slot = Some(id);
        }
        self.alloc(SemValue::ExpLink { op, operands: slots }, covered)
    }

    /// Borrow a live value.
    pub fn get(&self, id: ValueId) -> CompileResult<&SemValue> {
        match self.slots.get(id.0 as usize) {
            Some(Slot {
                value: SemValue::Free,
                ..
            })
            | None => Err(invalid(format!("value {} is not live", id.0))),
            Some(slot) => Ok(&slot.value),
        }
    }

    /// Source span of a live value.
    pub fn span(&self, id: ValueId) -> CompileResult<Span> {
        self.get(id)?;
        Ok(self.slots[id.0 as usize].span)
    }

    /// Take a value out of the pool, freeing its slot.
    pub fn take(&mut self, id: ValueId) -> CompileResult<(SemValue, Span)> {
        self.get(id)?;
        let slot = &mut self.slots[id.0 as usize];
        let value = std::mem::replace(&mut slot.value, SemValue::Free);
        self.free.push(id.0);
        Ok((value, slot.span))
    }

    /// Take an identifier.
    pub fn take_identifier(&mut self, id: ValueId) -> CompileResult<(Box<str>, Span)> {
        match self.take(id)? {
            (SemValue::Identifier(name), span) => Ok((name, span)),
            (other, _) => Err(invalid(format!(
                "expected identifier, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Take an identifier list.
    pub fn take_id_list(&mut self, id: ValueId) -> CompileResult<Vec<(Box<str>, Span)>> {
        match self.take(id)? {
            (SemValue::IdList(names), _) => Ok(names),
            (SemValue::Identifier(name), span) => Ok(vec![(name, span)]),
            (other, _) => Err(invalid(format!(
                "expected identifier list, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Take a type specification.
    pub fn take_type_spec(&mut self, id: ValueId) -> CompileResult<TypeSpec> {
        match self.take(id)? {
            (SemValue::TypeSpec(spec), _) => Ok(spec),
            (other, _) => Err(invalid(format!(
                "expected type specification, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Take a parameter list.
    pub fn take_param_list(&mut self, id: ValueId) -> CompileResult<Vec<ParamSpec>> {
        match self.take(id)? {
            (SemValue::ParamList(params), _) => Ok(params),
            (other, _) => Err(invalid(format!(
                "expected parameter list, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Free a value and, for expression nodes and argument lists, every
    /// value below it.
    pub fn release(&mut self, id: ValueId) -> CompileResult<()> {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            match self.take(id)?.0 {
                SemValue::ExpLink { operands, .. } => {
                    pending.extend(operands.into_iter().flatten());
                }
                SemValue::ArgList(args) => pending.extend(args),
                _ => {}
            }
        }
        Ok(())
    }

    /// Number of live values.
    #[must_use]
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots ever allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

fn invalid(message: impl Into<String>) -> CompileError {
    CompileError::internal_with(MessageCode::InvalidSemanticValue, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freed_slots_are_reused() {
        let mut pool = ValuePool::new();
        let a = pool.identifier("a", Span::new(0, 1)).unwrap();
        let b = pool.identifier("b", Span::new(2, 3)).unwrap();
        pool.take(a).unwrap();
        let c = pool.identifier("c", Span::new(4, 5)).unwrap();
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.live(), 2);
    }

    #[test]
    fn test_stale_id_is_internal_error() {
        let mut pool = ValuePool::new();
        let a = pool.literal(Literal::Bool(true), Span::dummy()).unwrap();
        pool.take(a).unwrap();
        let err = pool.get(a).unwrap_err();
        assert_eq!(err.code(), MessageCode::InvalidSemanticValue);
        assert!(pool.take(a).is_err());
        assert!(pool.get(ValueId(99)).is_err());
    }

    #[test]
    fn test_exp_link_arity_and_span() {
        let mut pool = ValuePool::new();
        let l = pool.identifier("x", Span::new(10, 11)).unwrap();
        let r = pool.literal(Literal::int(1), Span::new(14, 15)).unwrap();
        let node = pool
            .create_exp_link(ExprOp::Binary(BinaryOp::Add), &[l, r], Span::dummy())
            .unwrap();
        assert_eq!(pool.span(node).unwrap(), Span::new(10, 15));
        assert!(pool
            .create_exp_link(ExprOp::TableValue, &[l, r], Span::dummy())
            .is_err());
    }

    #[test]
    fn test_release_frees_subtree() {
        let mut pool = ValuePool::new();
        let callee = pool.identifier("p", Span::dummy()).unwrap();
        let a = pool.literal(Literal::int(1), Span::dummy()).unwrap();
        let b = pool.identifier("y", Span::dummy()).unwrap();
        let args = pool.arg_list(vec![a, b], Span::dummy()).unwrap();
        let call = pool
            .create_exp_link(ExprOp::Call, &[callee, args], Span::dummy())
            .unwrap();
        assert_eq!(pool.live(), 5);
        pool.release(call).unwrap();
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn test_take_checks_kind() {
        let mut pool = ValuePool::new();
        let lit = pool.literal(Literal::Null, Span::dummy()).unwrap();
        assert!(pool.take_identifier(lit).is_err());
        let id = pool.identifier("solo", Span::new(1, 5)).unwrap();
        assert_eq!(
            pool.take_id_list(id).unwrap(),
            vec![("solo".into(), Span::new(1, 5))]
        );
    }

    #[test]
    fn test_integer_literal_types() {
        let ty = |v: i64| Literal::int(v).type_code().base;
        assert_eq!(ty(0), Primitive::Int8);
        assert_eq!(ty(127), Primitive::Int8);
        assert_eq!(ty(-128), Primitive::Int8);
        assert_eq!(ty(128), Primitive::Int16);
        assert_eq!(ty(-129), Primitive::Int16);
        assert_eq!(ty(70_000), Primitive::Int32);
        assert_eq!(ty(i64::MIN), Primitive::Int64);
        let big = Literal::Int {
            magnitude: u64::MAX,
            negative: false,
        };
        assert_eq!(big.type_code().base, Primitive::UInt64);
        let below_min = Literal::Int {
            magnitude: i64::MIN.unsigned_abs() + 1,
            negative: true,
        };
        assert!(below_min.type_code().is_unknown());
    }

    #[test]
    fn test_other_literal_types() {
        assert_eq!(Literal::Null.type_code(), TypeCode::NULL);
        let real = Literal::Real {
            integer: 3,
            fraction: 14,
            precision: 100,
        };
        assert_eq!(real.type_code().base, Primitive::RichReal);
        assert_eq!(Literal::Text("x".into()).type_code().base, Primitive::Text);
    }

    #[test]
    fn test_packed_dates() {
        let d = DateValue {
            year: 2024,
            month: 2,
            day: 29,
        };
        assert_eq!(d.packed(), 2024 << 16 | 2 << 8 | 29);
        let t = TimeValue {
            hour: 13,
            minute: 5,
            second: 9,
            micros: 0,
        };
        assert_eq!(t.packed_with(d) >> 32, u64::from(d.packed()));
    }
}
