//! Code builder for bytecode emission.
//!
//! The `CodeBuilder` appends encoded instructions to a byte buffer and
//! owns the single code path that rewrites jump operands. Forward jumps
//! are emitted with a zero placeholder and patched once the target is
//! known; backward jumps can be emitted already resolved.

use super::instruction::{InstrOffset, Opcode, Operand, OperandFormat};
use std::fmt::Write as _;
use tally_core::{CompileError, CompileResult, MessageCode};

/// Builder for one procedure's instruction stream.
///
/// # Example
/// ```
/// use tally_compiler::bytecode::{CodeBuilder, Opcode};
///
/// let mut code = CodeBuilder::new();
/// let exit = code.emit_jump(Opcode::Jf).unwrap();
/// code.emit(Opcode::LdBt).unwrap();
/// let end = code.current_offset();
/// code.patch_jump(exit, end).unwrap();
/// code.emit(Opcode::Ret).unwrap();
/// ```
#[derive(Debug, Default, Clone)]
pub struct CodeBuilder {
    code: Vec<u8>,
}

impl CodeBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction will be written at.
    #[inline]
    #[must_use]
    pub fn current_offset(&self) -> InstrOffset {
        // `reserve` keeps the buffer below u32::MAX bytes.
        InstrOffset(self.code.len() as u32)
    }

    /// Size of the emitted code in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether nothing has been emitted.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The emitted code.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Consume the builder, returning the code.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.code
    }

    fn reserve(&mut self, additional: usize) -> CompileResult<()> {
        if self.code.len() + additional > u32::MAX as usize {
            return Err(CompileError::out_of_memory("instruction buffer"));
        }
        self.code
            .try_reserve(additional)
            .map_err(|_| CompileError::out_of_memory("instruction buffer"))
    }

    // =========================================================================
    // Instruction Emission
    // =========================================================================

    /// Emit an instruction without operand.
    pub fn emit(&mut self, op: Opcode) -> CompileResult<InstrOffset> {
        self.emit_with(op, &[])
    }

    /// Emit an instruction with a one-byte operand.
    pub fn emit_u8(&mut self, op: Opcode, value: u8) -> CompileResult<InstrOffset> {
        self.emit_with(op, &[value])
    }

    /// Emit an instruction with a two-byte operand.
    pub fn emit_u16(&mut self, op: Opcode, value: u16) -> CompileResult<InstrOffset> {
        self.emit_with(op, &value.to_le_bytes())
    }

    /// Emit an instruction with a four-byte operand.
    pub fn emit_u32(&mut self, op: Opcode, value: u32) -> CompileResult<InstrOffset> {
        self.emit_with(op, &value.to_le_bytes())
    }

    /// Emit an instruction with an eight-byte operand.
    pub fn emit_u64(&mut self, op: Opcode, value: u64) -> CompileResult<InstrOffset> {
        self.emit_with(op, &value.to_le_bytes())
    }

    /// Emit an instruction with raw operand bytes.
    ///
    /// The operand length must match the opcode's format.
    pub fn emit_with(&mut self, op: Opcode, operand: &[u8]) -> CompileResult<InstrOffset> {
        if operand.len() != op.format().size() {
            return Err(CompileError::internal(format!(
                "{op} takes a {}-byte operand, got {}",
                op.format().size(),
                operand.len()
            )));
        }
        let at = self.current_offset();
        self.reserve(1 + operand.len())?;
        self.code.push(op as u8);
        self.code.extend_from_slice(operand);
        Ok(at)
    }

    /// Emit a jump with a zero placeholder offset.
    pub fn emit_jump(&mut self, op: Opcode) -> CompileResult<InstrOffset> {
        if !op.is_jump() {
            return Err(CompileError::internal_with(
                MessageCode::InvalidJumpPatch,
                format!("{op} is not a jump"),
            ));
        }
        self.emit_with(op, &0i32.to_le_bytes())
    }

    /// Emit a jump to an already known target.
    pub fn emit_jump_to(&mut self, op: Opcode, target: InstrOffset) -> CompileResult<InstrOffset> {
        let at = self.emit_jump(op)?;
        self.patch_jump(at, target)?;
        Ok(at)
    }

    // =========================================================================
    // Patching
    // =========================================================================

    /// Point the jump at `at` to `target`.
    pub fn patch_jump(&mut self, at: InstrOffset, target: InstrOffset) -> CompileResult<()> {
        let start = at.as_usize();
        let op = self.code.get(start).copied().and_then(Opcode::from_u8);
        match op {
            Some(op) if op.is_jump() && start + op.encoded_len() <= self.code.len() => {}
            _ => {
                return Err(CompileError::internal_with(
                    MessageCode::InvalidJumpPatch,
                    format!("no jump instruction at offset {at}"),
                ));
            }
        }

        let delta = i64::from(target.0) - i64::from(at.0);
        let delta = i32::try_from(delta).map_err(|_| {
            CompileError::internal_with(
                MessageCode::InvalidJumpPatch,
                format!("jump from {at} to {target} out of range"),
            )
        })?;
        self.code[start + 1..start + 5].copy_from_slice(&delta.to_le_bytes());
        tracing::trace!(target: "tally::codegen", from = at.0, to = target.0, "patched jump");
        Ok(())
    }

    /// Current operand of the jump at `at`.
    #[must_use]
    pub fn jump_offset(&self, at: InstrOffset) -> Option<i32> {
        let start = at.as_usize();
        let op = Opcode::from_u8(*self.code.get(start)?)?;
        if !op.is_jump() {
            return None;
        }
        let bytes = self.code.get(start + 1..start + 5)?;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Offset of the opcode byte.
    pub offset: InstrOffset,
    /// Opcode.
    pub opcode: Opcode,
    /// Operand.
    pub operand: Operand,
}

impl DecodedInstruction {
    /// Absolute target of a jump instruction.
    #[must_use]
    pub fn jump_target(&self) -> Option<InstrOffset> {
        match self.operand {
            Operand::Jump(delta) => {
                let target = i64::from(self.offset.0) + i64::from(delta);
                u32::try_from(target).ok().map(InstrOffset)
            }
            _ => None,
        }
    }
}

/// Iterator over the instructions of a code buffer.
pub struct Decoder<'a> {
    code: &'a [u8],
    pos: usize,
}

/// Decode a code buffer instruction by instruction.
#[must_use]
pub fn decode(code: &[u8]) -> Decoder<'_> {
    Decoder { code, pos: 0 }
}

impl Iterator for Decoder<'_> {
    type Item = CompileResult<DecodedInstruction>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let byte = *self.code.get(start)?;
        let Some(opcode) = Opcode::from_u8(byte) else {
            self.pos = self.code.len();
            return Some(Err(CompileError::internal(format!(
                "invalid opcode {byte:#04x} at offset {start}"
            ))));
        };
        let end = start + opcode.encoded_len();
        let Some(raw) = self.code.get(start + 1..end) else {
            self.pos = self.code.len();
            return Some(Err(CompileError::internal(format!(
                "truncated {opcode} at offset {start}"
            ))));
        };
        self.pos = end;
        Some(Ok(DecodedInstruction {
            offset: InstrOffset(start as u32),
            opcode,
            operand: read_operand(opcode.format(), raw),
        }))
    }
}

fn read_operand(format: OperandFormat, raw: &[u8]) -> Operand {
    fn le<const N: usize>(raw: &[u8]) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&raw[..N]);
        out
    }

    match format {
        OperandFormat::None => Operand::None,
        OperandFormat::U8 => Operand::Unsigned(u64::from(raw[0])),
        OperandFormat::U16 => Operand::Unsigned(u64::from(u16::from_le_bytes(le(raw)))),
        OperandFormat::U32 => Operand::Unsigned(u64::from(u32::from_le_bytes(le(raw)))),
        OperandFormat::U64 => Operand::Unsigned(u64::from_le_bytes(le(raw))),
        OperandFormat::I8 => Operand::Signed(i64::from(raw[0] as i8)),
        OperandFormat::I16 => Operand::Signed(i64::from(i16::from_le_bytes(le(raw)))),
        OperandFormat::I32 => Operand::Signed(i64::from(i32::from_le_bytes(le(raw)))),
        OperandFormat::I64 => Operand::Signed(i64::from_le_bytes(le(raw))),
        OperandFormat::Jump => Operand::Jump(i32::from_le_bytes(le(raw))),
        OperandFormat::Char => Operand::Char(u32::from_le_bytes(le(raw))),
        OperandFormat::HiresTime => Operand::HiresTime {
            datetime: u64::from_le_bytes(le(raw)),
            micros: u32::from_le_bytes(le(&raw[8..])),
        },
        OperandFormat::RichReal => Operand::RichReal {
            integer: i64::from_le_bytes(le(raw)),
            fraction: u64::from_le_bytes(le(&raw[8..])),
            precision: u64::from_le_bytes(le(&raw[16..])),
        },
    }
}

/// Render a code buffer as an assembly listing, one instruction per line.
///
/// Jumps show their absolute target.
pub fn disassemble(code: &[u8]) -> CompileResult<String> {
    let mut out = String::new();
    for instr in decode(code) {
        let instr = instr?;
        // Writing to a String cannot fail.
        let _ = match (instr.operand, instr.jump_target()) {
            (Operand::None, _) => writeln!(out, "{}  {}", instr.offset, instr.opcode),
            (_, Some(target)) => writeln!(out, "{}  {} -> {}", instr.offset, instr.opcode, target),
            (operand, None) => writeln!(out, "{}  {} {}", instr.offset, instr.opcode, operand),
        };
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_offsets() {
        let mut code = CodeBuilder::new();
        assert_eq!(code.emit(Opcode::LdBt).unwrap(), InstrOffset(0));
        assert_eq!(code.emit_u8(Opcode::LdLo8, 3).unwrap(), InstrOffset(1));
        assert_eq!(code.emit_u32(Opcode::Call, 9).unwrap(), InstrOffset(3));
        assert_eq!(code.current_offset(), InstrOffset(8));
        assert_eq!(code.as_bytes(), &[0x11, 0x20, 3, 0x07, 9, 0, 0, 0]);
    }

    #[test]
    fn test_operand_width_checked() {
        let mut code = CodeBuilder::new();
        assert!(code.emit(Opcode::LdLo8).is_err());
        assert!(code.emit_u8(Opcode::Ret, 1).is_err());
        assert!(code.is_empty());
    }

    #[test]
    fn test_forward_jump_patch() {
        let mut code = CodeBuilder::new();
        let j = code.emit_jump(Opcode::Jf).unwrap();
        assert_eq!(code.jump_offset(j), Some(0));
        code.emit(Opcode::LdBt).unwrap();
        let end = code.current_offset();
        code.patch_jump(j, end).unwrap();
        assert_eq!(code.jump_offset(j), Some(6));
    }

    #[test]
    fn test_backward_jump() {
        let mut code = CodeBuilder::new();
        let start = code.current_offset();
        code.emit(Opcode::LdBt).unwrap();
        let back = code.emit_jump_to(Opcode::Jmp, start).unwrap();
        assert_eq!(code.jump_offset(back), Some(-1));
    }

    #[test]
    fn test_patch_non_jump_is_internal_error() {
        let mut code = CodeBuilder::new();
        let at = code.emit(Opcode::Ret).unwrap();
        let err = code.patch_jump(at, InstrOffset(0)).unwrap_err();
        assert_eq!(err.code(), MessageCode::InvalidJumpPatch);
        assert!(code.patch_jump(InstrOffset(40), InstrOffset(0)).is_err());
    }

    #[test]
    fn test_emit_jump_requires_jump_opcode() {
        let mut code = CodeBuilder::new();
        assert!(code.emit_jump(Opcode::Call).is_err());
    }

    #[test]
    fn test_decode_roundtrip() {
        let mut code = CodeBuilder::new();
        code.emit_with(Opcode::LdI16, &(-300i16).to_le_bytes()).unwrap();
        code.emit_u32(Opcode::LdT, 12).unwrap();
        let j = code.emit_jump(Opcode::Jmp).unwrap();
        code.emit(Opcode::Ret).unwrap();
        code.patch_jump(j, InstrOffset(0)).unwrap();

        let decoded: Vec<_> = decode(code.as_bytes()).map(|i| i.unwrap()).collect();
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0].operand, Operand::Signed(-300));
        assert_eq!(decoded[1].operand, Operand::Unsigned(12));
        assert_eq!(decoded[2].jump_target(), Some(InstrOffset(0)));
        assert_eq!(decoded[3].opcode, Opcode::Ret);
    }

    #[test]
    fn test_decode_invalid_opcode() {
        let mut it = decode(&[0xFF]);
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    #[test]
    fn test_decode_truncated() {
        let mut it = decode(&[Opcode::LdI32 as u8, 1, 2]);
        assert!(it.next().unwrap().is_err());
    }

    #[test]
    fn test_disassemble() {
        let mut code = CodeBuilder::new();
        code.emit_u8(Opcode::LdGb8, 2).unwrap();
        let j = code.emit_jump(Opcode::Jf).unwrap();
        code.emit(Opcode::Ret).unwrap();
        let end = code.current_offset();
        code.patch_jump(j, end).unwrap();

        let text = disassemble(code.as_bytes()).unwrap();
        assert_eq!(text, "0000  LdGb8 2\n0002  Jf -> 0008\n0007  Ret\n");
    }
}
