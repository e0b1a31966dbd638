//! Expression translation.
//!
//! Trees are walked post-order: operands are emitted first, then the
//! instruction combining them. Every node consumes its semantic values
//! from the pool.
//!
//! A failed node reports once and yields [`ExprResult::unknown`]; parents
//! receiving an unknown operand still translate their other operands (so
//! every error in the tree is reported) and then propagate the sentinel
//! silently.

use super::{ExprResult, ProcedureState, UnitContext};
use crate::bytecode::Opcode;
use crate::ops::{self, BinaryOp, StoreMismatch, UnaryOp};
use crate::scope::{self, ProcId, Resolved};
use crate::types::{FieldMismatch, Primitive, TypeCode, TypeRef, ValueKind};
use crate::values::{ExprOp, Literal, SemValue, ValueId};
use smallvec::SmallVec;
use tally_core::{CompileError, CompileResult, MessageCode, Span};

/// Translates expression trees of one procedure.
pub struct ExprTranslator<'a> {
    unit: &'a mut UnitContext,
    proc: &'a mut ProcedureState,
}

impl<'a> ExprTranslator<'a> {
    /// Create a translator emitting into `proc`.
    pub fn new(unit: &'a mut UnitContext, proc: &'a mut ProcedureState) -> Self {
        Self { unit, proc }
    }

    /// Translate the tree rooted at `id`.
    pub fn translate(&mut self, id: ValueId) -> CompileResult<ExprResult> {
        let (value, span) = self.unit.values.take(id)?;
        match value {
            SemValue::Identifier(name) => self.identifier(&name, span),
            SemValue::Literal(literal) => self.literal(&literal, span),
            SemValue::ExpLink { op, operands } => {
                let [a, b, c] = operands;
                match (op, a, b, c) {
                    (ExprOp::Binary(op), Some(l), Some(r), None) => self.binary(op, l, r, span),
                    (ExprOp::Unary(op), Some(x), None, None) => self.unary(op, x, span),
                    (ExprOp::Assign, Some(d), Some(s), None) => self.assign(d, s, span),
                    (ExprOp::Index, Some(base), Some(index), None) => self.index(base, index, span),
                    (ExprOp::Field, Some(table), Some(name), None) => {
                        self.field(table, name, span)
                    }
                    (ExprOp::TableValue, Some(table), Some(row), Some(name)) => {
                        self.table_value(table, row, name, span)
                    }
                    (ExprOp::Call, Some(callee), Some(args), None) => {
                        self.call(callee, args, span)
                    }
                    _ => Err(CompileError::internal_with(
                        MessageCode::InvalidSemanticValue,
                        format!("malformed {op:?} node"),
                    )),
                }
            }
            other => Err(CompileError::internal_with(
                MessageCode::InvalidSemanticValue,
                format!("{other:?} is not an expression"),
            )),
        }
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    fn identifier(&mut self, name: &str, span: Span) -> CompileResult<ExprResult> {
        let resolved = scope::lookup(Some(&self.proc.locals), &self.unit.globals, name, true);
        let (ty, address, global) = match resolved {
            Some(Resolved::Local { address, ty }) => (ty, address, false),
            Some(Resolved::Global(id)) => {
                let address = self.unit.globals.mark_referenced(id);
                (self.unit.globals.variable(id).ty, address, true)
            }
            Some(Resolved::Procedure(_)) | None => {
                self.unit.error(
                    MessageCode::UndeclaredIdentifier,
                    span,
                    format!("identifier `{name}` is not declared"),
                );
                return Ok(ExprResult::unknown(span));
            }
        };
        self.emit_load(global, address)?;
        Ok(ExprResult {
            ty,
            kind: ValueKind::LValue,
            literal: false,
            span,
        })
    }

    fn emit_load(&mut self, global: bool, address: u32) -> CompileResult<()> {
        let (op8, op16, op32) = if global {
            (Opcode::LdGb8, Opcode::LdGb16, Opcode::LdGb32)
        } else {
            (Opcode::LdLo8, Opcode::LdLo16, Opcode::LdLo32)
        };
        let code = &mut self.proc.code;
        if let Ok(a) = u8::try_from(address) {
            code.emit_u8(op8, a)?;
        } else if let Ok(a) = u16::try_from(address) {
            code.emit_u16(op16, a)?;
        } else {
            code.emit_u32(op32, address)?;
        }
        Ok(())
    }

    fn literal(&mut self, literal: &Literal, span: Span) -> CompileResult<ExprResult> {
        let ty = literal.type_code();
        if ty.is_unknown() {
            self.unit.error(
                MessageCode::LiteralOutOfRange,
                span,
                "integer literal is below the smallest INT64",
            );
            return Ok(ExprResult::unknown(span));
        }
        let code = &mut self.proc.code;
        match literal {
            Literal::Null => code.emit(Opcode::LdNull)?,
            Literal::Bool(true) => code.emit(Opcode::LdBt)?,
            Literal::Bool(false) => code.emit(Opcode::LdBf)?,
            Literal::Char(c) => code.emit_u32(Opcode::LdC, u32::from(*c))?,
            Literal::Int {
                magnitude,
                negative,
            } => {
                let value = if *negative {
                    0i64.wrapping_sub_unsigned(*magnitude)
                } else {
                    *magnitude as i64
                };
                match ty.base {
                    Primitive::Int8 => code.emit_with(Opcode::LdI8, &(value as i8).to_le_bytes())?,
                    Primitive::Int16 => {
                        code.emit_with(Opcode::LdI16, &(value as i16).to_le_bytes())?
                    }
                    Primitive::Int32 => {
                        code.emit_with(Opcode::LdI32, &(value as i32).to_le_bytes())?
                    }
                    _ => code.emit_with(Opcode::LdI64, &value.to_le_bytes())?,
                }
            }
            Literal::Real {
                integer,
                fraction,
                precision,
            } => {
                let mut operand = [0u8; 24];
                operand[..8].copy_from_slice(&integer.to_le_bytes());
                operand[8..16].copy_from_slice(&fraction.to_le_bytes());
                operand[16..].copy_from_slice(&precision.to_le_bytes());
                code.emit_with(Opcode::LdRR, &operand)?
            }
            Literal::Text(text) => {
                let offset = self.unit.constants.intern(text)?;
                code.emit_u32(Opcode::LdT, offset)?
            }
            Literal::Date(date) => code.emit_u32(Opcode::LdD, date.packed())?,
            Literal::DateTime(date, time) => code.emit_u64(Opcode::LdDT, time.packed_with(*date))?,
            Literal::HiresTime(date, time) => {
                let mut operand = [0u8; 12];
                operand[..8].copy_from_slice(&time.packed_with(*date).to_le_bytes());
                operand[8..].copy_from_slice(&time.micros.to_le_bytes());
                code.emit_with(Opcode::LdHT, &operand)?
            }
        };
        Ok(ExprResult {
            literal: true,
            ..ExprResult::rvalue(ty, span)
        })
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn binary(
        &mut self,
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
        span: Span,
    ) -> CompileResult<ExprResult> {
        let l = self.translate(left)?;

        let short_circuit = match op {
            BinaryOp::Or if l.basic() == Some(Primitive::Bool) => Some(Opcode::JtK),
            BinaryOp::And if l.basic() == Some(Primitive::Bool) => Some(Opcode::JfK),
            _ => None,
        };
        let skip = match short_circuit {
            Some(jump) => Some(self.proc.code.emit_jump(jump)?),
            None => None,
        };

        let r = self.translate(right)?;
        if l.is_unknown() || r.is_unknown() {
            return Ok(ExprResult::unknown(span));
        }

        let (Some(lb), Some(rb)) = (l.basic(), r.basic()) else {
            return Ok(self.not_applicable(op, &l, &r, span));
        };
        let (lb, rb) = adapt_literal_sign(lb, l.literal, rb, r.literal);
        let Some(resolution) = ops::resolve_binary(op, lb, rb) else {
            return Ok(self.not_applicable(op, &l, &r, span));
        };

        self.proc.code.emit(resolution.opcode)?;
        if let Some(at) = skip {
            if resolution.result.is_basic_of(Primitive::Bool) {
                let end = self.proc.code.current_offset();
                self.proc.code.patch_jump(at, end)?;
            }
        }
        if resolution.sign_mismatch && !l.literal && !r.literal {
            self.sign_mismatch(op.symbol(), &l, &r, span);
        }
        Ok(ExprResult::rvalue(resolution.result, span))
    }

    fn not_applicable(
        &mut self,
        op: BinaryOp,
        l: &ExprResult,
        r: &ExprResult,
        span: Span,
    ) -> ExprResult {
        self.unit.error(
            MessageCode::OperatorNotApplicable,
            span,
            format!("operator `{op}` not applicable to {} and {}", l.ty.ty, r.ty.ty),
        );
        ExprResult::unknown(span)
    }

    fn sign_mismatch(&mut self, symbol: &str, l: &ExprResult, r: &ExprResult, span: Span) {
        if self.unit.config.warn_sign_mismatch {
            self.unit.warning(
                MessageCode::SignMismatch,
                span,
                format!(
                    "operands of `{symbol}` differ in signedness ({} and {})",
                    l.ty.ty, r.ty.ty
                ),
            );
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: ValueId, span: Span) -> CompileResult<ExprResult> {
        let x = self.translate(operand)?;
        if x.is_unknown() {
            return Ok(ExprResult::unknown(span));
        }
        if op.needs_lvalue() && x.kind != ValueKind::LValue {
            self.unit.error(
                MessageCode::NotAnLValue,
                x.span,
                format!("operand of `{op}` is not assignable"),
            );
            return Ok(ExprResult::unknown(span));
        }
        let Some(resolution) = x.basic().and_then(|base| ops::resolve_unary(op, base)) else {
            self.unit.error(
                MessageCode::UnaryNotApplicable,
                span,
                format!("operator `{op}` not applicable to {}", x.ty.ty),
            );
            return Ok(ExprResult::unknown(span));
        };
        self.proc.code.emit(resolution.opcode)?;
        Ok(ExprResult::rvalue(resolution.result, span))
    }

    fn assign(&mut self, dst: ValueId, src: ValueId, span: Span) -> CompileResult<ExprResult> {
        let d = self.translate(dst)?;
        let s = self.translate(src)?;
        if d.is_unknown() || s.is_unknown() {
            return Ok(ExprResult::unknown(span));
        }
        if d.kind != ValueKind::LValue {
            self.unit.error(
                MessageCode::NotAnLValue,
                d.span,
                "left side of assignment is not assignable",
            );
            return Ok(ExprResult::unknown(span));
        }
        let resolution = match ops::resolve_assignment(&self.unit.fields, d.ty, s.ty, true) {
            Ok(resolution) => resolution,
            Err(mismatch) => {
                self.store_mismatch(mismatch, &d, &s, span);
                return Ok(ExprResult::unknown(span));
            }
        };
        self.proc.code.emit(resolution.opcode)?;
        if resolution.sign_mismatch && !s.literal {
            self.sign_mismatch("=", &d, &s, span);
        }
        Ok(ExprResult {
            ty: d.ty,
            ..ExprResult::rvalue(d.ty.ty, span)
        })
    }

    fn store_mismatch(
        &mut self,
        mismatch: StoreMismatch,
        d: &ExprResult,
        s: &ExprResult,
        span: Span,
    ) {
        match mismatch {
            StoreMismatch::NotApplicable => self.unit.error(
                MessageCode::OperatorNotApplicable,
                span,
                format!("operator `=` not applicable to {} and {}", d.ty.ty, s.ty.ty),
            ),
            StoreMismatch::Fields(mismatch) => self.field_mismatch(mismatch, span),
        }
    }

    fn field_mismatch(&mut self, mismatch: FieldMismatch, span: Span) {
        match mismatch {
            FieldMismatch::Missing(label) => self.unit.error(
                MessageCode::FieldNotFound,
                span,
                format!("field `{label}` not found in source table"),
            ),
            FieldMismatch::Type { label, src, dst } => self.unit.error(
                MessageCode::FieldTypeMismatch,
                span,
                format!("field `{label}`: cannot store {src} into {dst}"),
            ),
        }
    }

    // =========================================================================
    // Composites
    // =========================================================================

    fn index(&mut self, base: ValueId, index: ValueId, span: Span) -> CompileResult<ExprResult> {
        let b = self.translate(base)?;
        let i = self.translate(index)?;
        if b.is_unknown() || i.is_unknown() {
            return Ok(ExprResult::unknown(span));
        }
        let element = b.ty.ty.element();
        let integer_index = i.basic().is_some_and(Primitive::is_integer);
        let Some(element) = element.filter(|_| integer_index) else {
            self.unit.error(
                MessageCode::OperatorNotApplicable,
                span,
                format!("operator `[]` not applicable to {} and {}", b.ty.ty, i.ty.ty),
            );
            return Ok(ExprResult::unknown(span));
        };
        let opcode = if b.ty.ty.is_field() {
            Opcode::IndF
        } else if b.ty.ty.is_array() {
            Opcode::IndA
        } else {
            Opcode::IndT
        };
        self.proc.code.emit(opcode)?;
        Ok(ExprResult {
            kind: ValueKind::LValue,
            ..ExprResult::rvalue(element, span)
        })
    }

    /// Check that `table` is a table with a column `name` and intern the
    /// label. Returns the column type and the label's constant offset.
    fn column(
        &mut self,
        table: &ExprResult,
        name: &str,
        name_span: Span,
    ) -> CompileResult<Option<(TypeCode, u32)>> {
        if !table.ty.ty.is_table() {
            self.unit.error(
                MessageCode::NotATable,
                table.span,
                format!("field `{name}` requires a table, found {}", table.ty.ty),
            );
            return Ok(None);
        }
        let column = table
            .ty
            .fields
            .and_then(|id| self.unit.fields.find(id, name))
            .map(|column| column.ty);
        let Some(ty) = column else {
            self.unit.error(
                MessageCode::FieldNotDeclared,
                name_span,
                format!("field `{name}` is not declared on this table"),
            );
            return Ok(None);
        };
        let offset = self.unit.constants.intern(name)?;
        Ok(Some((ty, offset)))
    }

    fn field(&mut self, table: ValueId, name: ValueId, span: Span) -> CompileResult<ExprResult> {
        let t = self.translate(table)?;
        let (name, name_span) = self.unit.values.take_identifier(name)?;
        if t.is_unknown() {
            return Ok(ExprResult::unknown(span));
        }
        let Some((column, offset)) = self.column(&t, &name, name_span)? else {
            return Ok(ExprResult::unknown(span));
        };
        self.proc.code.emit_u32(Opcode::SelF, offset)?;
        Ok(ExprResult {
            kind: ValueKind::FieldRef,
            ..ExprResult::rvalue(column.as_field(), span)
        })
    }

    fn table_value(
        &mut self,
        table: ValueId,
        row: ValueId,
        name: ValueId,
        span: Span,
    ) -> CompileResult<ExprResult> {
        let t = self.translate(table)?;
        let r = self.translate(row)?;
        let (name, name_span) = self.unit.values.take_identifier(name)?;
        if t.is_unknown() || r.is_unknown() {
            return Ok(ExprResult::unknown(span));
        }
        if !r.basic().is_some_and(Primitive::is_integer) {
            self.unit.error(
                MessageCode::OperatorNotApplicable,
                r.span,
                format!("row index must be an integer, found {}", r.ty.ty),
            );
            return Ok(ExprResult::unknown(span));
        }
        let Some((column, offset)) = self.column(&t, &name, name_span)? else {
            return Ok(ExprResult::unknown(span));
        };
        self.proc.code.emit_u32(Opcode::IndTA, offset)?;
        Ok(ExprResult {
            kind: ValueKind::LValue,
            ..ExprResult::rvalue(column, span)
        })
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call(&mut self, callee: ValueId, args: ValueId, span: Span) -> CompileResult<ExprResult> {
        let (name, name_span) = self.unit.values.take_identifier(callee)?;
        let args = match self.unit.values.take(args)? {
            (SemValue::ArgList(args), _) => args,
            (other, _) => {
                return Err(CompileError::internal_with(
                    MessageCode::InvalidSemanticValue,
                    format!("expected argument list, found {other:?}"),
                ));
            }
        };

        let Some(proc) = self.callee(&name, name_span) else {
            for arg in args {
                self.translate(arg)?;
            }
            return Ok(ExprResult::unknown(span));
        };

        let signature = &self.unit.globals.procedure(proc).signature;
        let params: SmallVec<[TypeRef; 4]> = signature.params.iter().map(|p| p.ty).collect();
        let ret = signature.ret;

        let provided = args.len();
        let mut failed = false;
        let mut remaining = args.into_iter().enumerate();
        for (i, arg) in remaining.by_ref() {
            let Some(&param) = params.get(i) else {
                let arg_span = self.unit.values.span(arg)?;
                self.unit.error(
                    MessageCode::TooManyArguments,
                    arg_span,
                    format!(
                        "procedure `{name}` takes {} parameters, argument {} is one too many",
                        params.len(),
                        i + 1
                    ),
                );
                self.unit.values.release(arg)?;
                failed = true;
                break;
            };
            let a = self.translate(arg)?;
            if a.is_unknown() {
                self.unit.note(
                    MessageCode::WhileEvaluatingArgument,
                    a.span,
                    format!("while evaluating argument {} of procedure `{name}`", i + 1),
                );
                failed = true;
                continue;
            }
            if ops::resolve_assignment(&self.unit.fields, param, a.ty, false).is_err() {
                self.unit.error(
                    MessageCode::ArgumentTypeMismatch,
                    a.span,
                    format!(
                        "argument {} of `{name}`: expected {}, found {}",
                        i + 1,
                        param.ty,
                        a.ty.ty
                    ),
                );
                failed = true;
            }
        }
        for (_, arg) in remaining {
            self.unit.values.release(arg)?;
        }

        if provided < params.len() {
            self.unit.error(
                MessageCode::TooFewArguments,
                span,
                format!(
                    "procedure `{name}` needs {} parameters, only {provided} provided",
                    params.len()
                ),
            );
            failed = true;
        }
        if failed {
            return Ok(ExprResult::unknown(span));
        }

        let import = self.unit.globals.mark_called(proc);
        self.proc.code.emit_u32(Opcode::Call, import)?;
        Ok(ExprResult {
            ty: ret,
            ..ExprResult::rvalue(ret.ty, span)
        })
    }

    fn callee(&mut self, name: &str, span: Span) -> Option<ProcId> {
        match scope::lookup(Some(&self.proc.locals), &self.unit.globals, name, true) {
            Some(Resolved::Procedure(id)) => Some(id),
            Some(_) => {
                self.unit.error(
                    MessageCode::NotAProcedure,
                    span,
                    format!("`{name}` is not a procedure"),
                );
                None
            }
            None => {
                self.unit.error(
                    MessageCode::ProcedureNotDeclared,
                    span,
                    format!("procedure `{name}` is not declared"),
                );
                None
            }
        }
    }
}

/// An integer literal combined with a non-literal integer of the other
/// signedness takes the non-literal's type.
fn adapt_literal_sign(
    left: Primitive,
    left_literal: bool,
    right: Primitive,
    right_literal: bool,
) -> (Primitive, Primitive) {
    if !left.is_integer() || !right.is_integer() || left.is_signed() == right.is_signed() {
        return (left, right);
    }
    match (left_literal, right_literal) {
        (true, false) => (right, right),
        (false, true) => (left, left),
        _ => (left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_takes_operand_sign() {
        assert_eq!(
            adapt_literal_sign(Primitive::UInt16, false, Primitive::Int8, true),
            (Primitive::UInt16, Primitive::UInt16)
        );
        assert_eq!(
            adapt_literal_sign(Primitive::Int8, true, Primitive::UInt32, false),
            (Primitive::UInt32, Primitive::UInt32)
        );
    }

    #[test]
    fn test_non_literals_keep_their_types() {
        assert_eq!(
            adapt_literal_sign(Primitive::UInt16, false, Primitive::Int8, false),
            (Primitive::UInt16, Primitive::Int8)
        );
        assert_eq!(
            adapt_literal_sign(Primitive::Real, false, Primitive::Int8, true),
            (Primitive::Real, Primitive::Int8)
        );
    }
}
