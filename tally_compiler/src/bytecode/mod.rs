//! Bytecode module.
//!
//! Contains the opcode set, the per-procedure code builder with jump
//! patching, and the decoder/disassembler used by tests and tooling.

mod builder;
mod instruction;

pub use builder::{CodeBuilder, DecodedInstruction, Decoder, decode, disassemble};
pub use instruction::{InstrOffset, Opcode, Operand, OperandFormat};
