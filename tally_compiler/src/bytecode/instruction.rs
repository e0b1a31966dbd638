//! Stack bytecode instruction definitions.
//!
//! Instructions are variable length: one opcode byte followed by the
//! little-endian operand described by the opcode's [`OperandFormat`].
//!
//! # Instruction Format
//!
//! ```text
//! ┌─────────┬───────────────────────────────┐
//! │ opcode  │ operand (0..24 bytes, LE)     │
//! │ (8 bit) │ width fixed per opcode        │
//! └─────────┴───────────────────────────────┘
//! ```
//!
//! Jump operands are signed 32-bit offsets relative to the first byte of
//! the jump instruction itself.

use std::fmt;

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandFormat {
    /// No operand.
    None,
    /// Unsigned byte (pop counts, sync indices, 8-bit address ids).
    U8,
    /// Unsigned 16-bit address id.
    U16,
    /// Unsigned 32-bit value (address ids, constant offsets, import ids).
    U32,
    /// Signed 8-bit integer literal.
    I8,
    /// Signed 16-bit integer literal.
    I16,
    /// Signed 32-bit integer literal.
    I32,
    /// Signed 64-bit integer literal.
    I64,
    /// Unsigned 64-bit value (packed date-time).
    U64,
    /// Signed 32-bit relative jump offset.
    Jump,
    /// Unicode scalar value.
    Char,
    /// Packed date-time (u64) followed by microseconds (u32).
    HiresTime,
    /// Rich real literal: integer part (i64), fraction (u64), precision (u64).
    RichReal,
}

impl OperandFormat {
    /// Operand size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::Jump | Self::Char => 4,
            Self::I64 | Self::U64 => 8,
            Self::HiresTime => 12,
            Self::RichReal => 24,
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $value:literal => $format:ident, )*) => {
        /// Bytecode opcodes for the stack machine.
        ///
        /// Opcodes are organized by category:
        /// - 0x00-0x0F: Control flow
        /// - 0x10-0x2F: Loads
        /// - 0x30-0x3F: Indexing and table selection
        /// - 0x40-0x6F: Arithmetic, increment, decrement
        /// - 0x70-0xA7: Comparison
        /// - 0xA8-0xAF: Logical/bitwise
        /// - 0xB0-0xC2: Store
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $value, )*
        }

        impl Opcode {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Convert from u8, returning None if invalid.
            #[inline]
            #[must_use]
            pub const fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $( $value => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Get the operand layout for this opcode.
            #[inline]
            #[must_use]
            pub const fn format(self) -> OperandFormat {
                match self {
                    $( Opcode::$name => OperandFormat::$format, )*
                }
            }

            /// Assembly mnemonic.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => stringify!($name), )*
                }
            }
        }
    };
}

opcodes! {
    // =========================================================================
    // Control Flow (0x00-0x0F)
    // =========================================================================
    /// Return the value on top of the stack.
    Ret = 0x01 => None,
    /// Unconditional jump.
    Jmp = 0x02 => Jump,
    /// Pop the condition; jump if false.
    Jf = 0x03 => Jump,
    /// Short-circuit AND: test the top of the stack without popping it;
    /// jump if false. On fall-through the operand stays for `AndB`.
    JfK = 0x05 => Jump,
    /// Short-circuit OR: test the top of the stack without popping it;
    /// jump if true. On fall-through the operand stays for `OrB`.
    JtK = 0x06 => Jump,
    /// Call the procedure with the given import id.
    Call = 0x07 => U32,
    /// Discard the given number of stack entries.
    Cts = 0x08 => U8,
    /// Enter synchronized block N.
    BSync = 0x09 => U8,
    /// Leave synchronized block N.
    ESync = 0x0A => U8,

    // =========================================================================
    // Loads (0x10-0x2F)
    // =========================================================================
    /// Push NULL.
    LdNull = 0x10 => None,
    /// Push TRUE.
    LdBt = 0x11 => None,
    /// Push FALSE.
    LdBf = 0x12 => None,
    /// Push a character.
    LdC = 0x13 => Char,
    /// Push an 8-bit integer literal.
    LdI8 = 0x14 => I8,
    /// Push a 16-bit integer literal.
    LdI16 = 0x15 => I16,
    /// Push a 32-bit integer literal.
    LdI32 = 0x16 => I32,
    /// Push a 64-bit integer literal.
    LdI64 = 0x17 => I64,
    /// Push a rich real literal.
    LdRR = 0x18 => RichReal,
    /// Push a packed date.
    LdD = 0x19 => U32,
    /// Push a packed date-time.
    LdDT = 0x1A => U64,
    /// Push a packed high resolution time.
    LdHT = 0x1B => HiresTime,
    /// Push the text at a constants area offset.
    LdT = 0x1C => U32,
    /// Push a local by 8-bit address id.
    LdLo8 = 0x20 => U8,
    /// Push a local by 16-bit address id.
    LdLo16 = 0x21 => U16,
    /// Push a local by 32-bit address id.
    LdLo32 = 0x22 => U32,
    /// Push a global by 8-bit address id.
    LdGb8 = 0x23 => U8,
    /// Push a global by 16-bit address id.
    LdGb16 = 0x24 => U16,
    /// Push a global by 32-bit address id.
    LdGb32 = 0x25 => U32,

    // =========================================================================
    // Indexing and Table Selection (0x30-0x3F)
    // =========================================================================
    /// Array element: pop index and array.
    IndA = 0x30 => None,
    /// Field row value: pop row and field.
    IndF = 0x31 => None,
    /// Text character: pop index and text.
    IndT = 0x32 => None,
    /// Select a table column by name (constants area offset).
    SelF = 0x33 => U32,
    /// Table row value by column name: pop row and table.
    IndTA = 0x34 => U32,

    // =========================================================================
    // Arithmetic (0x40-0x6F)
    // =========================================================================
    /// Integer add.
    Add = 0x40 => None,
    /// Integer subtract.
    Sub = 0x41 => None,
    /// Integer multiply.
    Mul = 0x42 => None,
    /// Signed integer divide.
    Div = 0x43 => None,
    /// Unsigned integer divide.
    DivU = 0x44 => None,
    /// Signed remainder.
    Mod = 0x45 => None,
    /// Unsigned remainder.
    ModU = 0x46 => None,
    /// Real add.
    AddR = 0x48 => None,
    /// Real subtract.
    SubR = 0x49 => None,
    /// Real multiply.
    MulR = 0x4A => None,
    /// Real divide.
    DivR = 0x4B => None,
    /// Rich real add.
    AddRR = 0x4C => None,
    /// Rich real subtract.
    SubRR = 0x4D => None,
    /// Rich real multiply.
    MulRR = 0x4E => None,
    /// Rich real divide.
    DivRR = 0x4F => None,
    /// Text concatenation.
    AddT = 0x50 => None,
    /// Integer increment.
    Inc = 0x58 => None,
    /// Character increment.
    IncC = 0x59 => None,
    /// Real increment.
    IncR = 0x5A => None,
    /// Rich real increment.
    IncRR = 0x5B => None,
    /// Date increment (one day).
    IncD = 0x5C => None,
    /// Date-time increment (one second).
    IncDT = 0x5D => None,
    /// High resolution time increment (one microsecond).
    IncHT = 0x5E => None,
    /// Integer decrement.
    Dec = 0x60 => None,
    /// Character decrement.
    DecC = 0x61 => None,
    /// Real decrement.
    DecR = 0x62 => None,
    /// Rich real decrement.
    DecRR = 0x63 => None,
    /// Date decrement.
    DecD = 0x64 => None,
    /// Date-time decrement.
    DecDT = 0x65 => None,
    /// High resolution time decrement.
    DecHT = 0x66 => None,

    // =========================================================================
    // Comparison (0x70-0xA7)
    // =========================================================================
    /// Signed integer less-than.
    Lt = 0x70 => None,
    /// Unsigned integer less-than.
    LtU = 0x71 => None,
    /// Real less-than.
    LtR = 0x72 => None,
    /// Rich real less-than.
    LtRR = 0x73 => None,
    /// Character less-than.
    LtC = 0x74 => None,
    /// Date less-than.
    LtD = 0x75 => None,
    /// Date-time less-than.
    LtDT = 0x76 => None,
    /// High resolution time less-than.
    LtHT = 0x77 => None,
    /// Signed integer less-or-equal.
    Le = 0x78 => None,
    /// Unsigned integer less-or-equal.
    LeU = 0x79 => None,
    /// Real less-or-equal.
    LeR = 0x7A => None,
    /// Rich real less-or-equal.
    LeRR = 0x7B => None,
    /// Character less-or-equal.
    LeC = 0x7C => None,
    /// Date less-or-equal.
    LeD = 0x7D => None,
    /// Date-time less-or-equal.
    LeDT = 0x7E => None,
    /// High resolution time less-or-equal.
    LeHT = 0x7F => None,
    /// Signed integer greater-than.
    Gt = 0x80 => None,
    /// Unsigned integer greater-than.
    GtU = 0x81 => None,
    /// Real greater-than.
    GtR = 0x82 => None,
    /// Rich real greater-than.
    GtRR = 0x83 => None,
    /// Character greater-than.
    GtC = 0x84 => None,
    /// Date greater-than.
    GtD = 0x85 => None,
    /// Date-time greater-than.
    GtDT = 0x86 => None,
    /// High resolution time greater-than.
    GtHT = 0x87 => None,
    /// Signed integer greater-or-equal.
    Ge = 0x88 => None,
    /// Unsigned integer greater-or-equal.
    GeU = 0x89 => None,
    /// Real greater-or-equal.
    GeR = 0x8A => None,
    /// Rich real greater-or-equal.
    GeRR = 0x8B => None,
    /// Character greater-or-equal.
    GeC = 0x8C => None,
    /// Date greater-or-equal.
    GeD = 0x8D => None,
    /// Date-time greater-or-equal.
    GeDT = 0x8E => None,
    /// High resolution time greater-or-equal.
    GeHT = 0x8F => None,
    /// Integer equality.
    Eq = 0x90 => None,
    /// Real equality.
    EqR = 0x91 => None,
    /// Rich real equality.
    EqRR = 0x92 => None,
    /// Character equality.
    EqC = 0x93 => None,
    /// Date equality.
    EqD = 0x94 => None,
    /// Date-time equality.
    EqDT = 0x95 => None,
    /// High resolution time equality.
    EqHT = 0x96 => None,
    /// Boolean equality.
    EqB = 0x97 => None,
    /// Text equality.
    EqT = 0x98 => None,
    /// Integer inequality.
    Ne = 0x99 => None,
    /// Real inequality.
    NeR = 0x9A => None,
    /// Rich real inequality.
    NeRR = 0x9B => None,
    /// Character inequality.
    NeC = 0x9C => None,
    /// Date inequality.
    NeD = 0x9D => None,
    /// Date-time inequality.
    NeDT = 0x9E => None,
    /// High resolution time inequality.
    NeHT = 0x9F => None,
    /// Boolean inequality.
    NeB = 0xA0 => None,
    /// Text inequality.
    NeT = 0xA1 => None,

    // =========================================================================
    // Logical/Bitwise (0xA8-0xAF)
    // =========================================================================
    /// Bitwise complement.
    Not = 0xA8 => None,
    /// Logical negation.
    NotB = 0xA9 => None,
    /// Bitwise and.
    And = 0xAA => None,
    /// Logical and.
    AndB = 0xAB => None,
    /// Bitwise or.
    Or = 0xAC => None,
    /// Logical or.
    OrB = 0xAD => None,
    /// Bitwise exclusive or.
    Xor = 0xAE => None,
    /// Logical exclusive or.
    XorB = 0xAF => None,

    // =========================================================================
    // Store (0xB0-0xC2)
    // =========================================================================
    /// Store into a boolean.
    StoB = 0xB0 => None,
    /// Store into a character.
    StoC = 0xB1 => None,
    /// Store into a date.
    StoD = 0xB2 => None,
    /// Store into a date-time.
    StoDT = 0xB3 => None,
    /// Store into a high resolution time.
    StoHT = 0xB4 => None,
    /// Store into an INT8.
    StoI8 = 0xB5 => None,
    /// Store into an INT16.
    StoI16 = 0xB6 => None,
    /// Store into an INT32.
    StoI32 = 0xB7 => None,
    /// Store into an INT64.
    StoI64 = 0xB8 => None,
    /// Store into a UINT8.
    StoU8 = 0xB9 => None,
    /// Store into a UINT16.
    StoU16 = 0xBA => None,
    /// Store into a UINT32.
    StoU32 = 0xBB => None,
    /// Store into a UINT64.
    StoU64 = 0xBC => None,
    /// Store into a real.
    StoR = 0xBD => None,
    /// Store into a rich real.
    StoRR = 0xBE => None,
    /// Store into a text.
    StoT = 0xBF => None,
    /// Store a whole table.
    StoTA = 0xC0 => None,
    /// Store a whole field.
    StoF = 0xC1 => None,
    /// Store a whole array.
    StoA = 0xC2 => None,
}

impl Opcode {
    /// Whether the operand is a relative jump offset.
    #[inline]
    #[must_use]
    pub const fn is_jump(self) -> bool {
        matches!(self.format(), OperandFormat::Jump)
    }

    /// Encoded size of an instruction with this opcode.
    #[inline]
    #[must_use]
    pub const fn encoded_len(self) -> usize {
        1 + self.format().size()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Byte offset of an instruction inside a procedure's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct InstrOffset(pub u32);

impl InstrOffset {
    /// Offset as a buffer index.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// A decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// No operand.
    None,
    /// Unsigned value (ids, offsets, counts, packed dates).
    Unsigned(u64),
    /// Signed integer literal.
    Signed(i64),
    /// Relative jump offset.
    Jump(i32),
    /// Character literal (raw scalar value).
    Char(u32),
    /// High resolution time literal.
    HiresTime {
        /// Packed date-time.
        datetime: u64,
        /// Microseconds.
        micros: u32,
    },
    /// Rich real literal.
    RichReal {
        /// Integer part.
        integer: i64,
        /// Fraction digits as an integer.
        fraction: u64,
        /// Power of ten dividing `fraction`.
        precision: u64,
    },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::None => Ok(()),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Jump(off) => write!(f, "{off:+}"),
            Self::Char(c) => match char::from_u32(c) {
                Some(ch) => write!(f, "{ch:?}"),
                None => write!(f, "U+{c:04X}"),
            },
            Self::HiresTime { datetime, micros } => write!(f, "{datetime:#x}.{micros:06}"),
            Self::RichReal {
                integer,
                fraction,
                precision,
            } => write!(f, "{integer}+{fraction}/{precision}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_u8_roundtrip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_u8(op as u8), Some(op));
        }
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_values_unique() {
        let mut seen = [false; 256];
        for &op in Opcode::ALL {
            assert!(!seen[op as usize], "duplicate opcode {op}");
            seen[op as usize] = true;
        }
    }

    #[test]
    fn test_jump_opcodes() {
        for op in [Opcode::Jmp, Opcode::Jf, Opcode::JfK, Opcode::JtK] {
            assert!(op.is_jump());
            assert_eq!(op.encoded_len(), 5);
        }
        assert!(!Opcode::Call.is_jump());
        assert_eq!(Opcode::from_u8(0x04), None);
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(Opcode::Ret.encoded_len(), 1);
        assert_eq!(Opcode::LdI8.encoded_len(), 2);
        assert_eq!(Opcode::LdLo16.encoded_len(), 3);
        assert_eq!(Opcode::LdI64.encoded_len(), 9);
        assert_eq!(Opcode::LdHT.encoded_len(), 13);
        assert_eq!(Opcode::LdRR.encoded_len(), 25);
    }

    #[test]
    fn test_mnemonic_display() {
        assert_eq!(Opcode::StoTA.to_string(), "StoTA");
        assert_eq!(InstrOffset(7).to_string(), "0007");
    }

    #[test]
    fn test_operand_display() {
        assert_eq!(Operand::Jump(-12).to_string(), "-12");
        assert_eq!(Operand::Jump(5).to_string(), "+5");
        assert_eq!(Operand::Char('x' as u32).to_string(), "'x'");
        assert_eq!(Operand::None.to_string(), "");
    }
}
