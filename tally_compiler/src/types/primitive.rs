//! Primitive type kinds.

use std::fmt;

/// The scalar kinds of the language, plus the two bookkeeping kinds
/// `Unknown` (failure sentinel) and `Undetermined` (the type of `NULL`).
///
/// The discriminants index every operator table, so the order is part of
/// the table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Primitive {
    /// Failure sentinel; never applicable to any operator.
    #[default]
    Unknown = 0,
    /// Boolean.
    Bool = 1,
    /// Unicode character.
    Char = 2,
    /// Calendar date.
    Date = 3,
    /// Date and time with second precision.
    DateTime = 4,
    /// Date and time with microsecond precision.
    HiresTime = 5,
    /// Signed 8-bit integer.
    Int8 = 6,
    /// Signed 16-bit integer.
    Int16 = 7,
    /// Signed 32-bit integer.
    Int32 = 8,
    /// Signed 64-bit integer.
    Int64 = 9,
    /// Unsigned 8-bit integer.
    UInt8 = 10,
    /// Unsigned 16-bit integer.
    UInt16 = 11,
    /// Unsigned 32-bit integer.
    UInt32 = 12,
    /// Unsigned 64-bit integer.
    UInt64 = 13,
    /// Floating point real.
    Real = 14,
    /// Extended precision real.
    RichReal = 15,
    /// Text string.
    Text = 16,
    /// Type of the `NULL` literal and of generic composites.
    Undetermined = 17,
}

impl Primitive {
    /// Number of primitive kinds (rows and columns of each operator table).
    pub const COUNT: usize = 18;

    /// Every kind, in discriminant order.
    pub const ALL: [Primitive; Self::COUNT] = [
        Self::Unknown,
        Self::Bool,
        Self::Char,
        Self::Date,
        Self::DateTime,
        Self::HiresTime,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Real,
        Self::RichReal,
        Self::Text,
        Self::Undetermined,
    ];

    /// Convert from the raw discriminant.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        if (value as usize) < Self::COUNT {
            Some(Self::ALL[value as usize])
        } else {
            None
        }
    }

    /// Table index of this kind.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Signed or unsigned integer of any width.
    #[inline]
    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// Signed integer.
    #[inline]
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Unsigned integer.
    #[inline]
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    /// `Real` or `RichReal`.
    #[inline]
    #[must_use]
    pub const fn is_real(self) -> bool {
        matches!(self, Self::Real | Self::RichReal)
    }

    /// Integer or real.
    #[inline]
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_real()
    }

    /// One of the calendar kinds.
    #[inline]
    #[must_use]
    pub const fn is_time(self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::HiresTime)
    }

    /// Precision rank of the calendar kinds (`Date < DateTime < HiresTime`),
    /// zero for everything else.
    #[inline]
    #[must_use]
    pub const fn time_rank(self) -> u8 {
        match self {
            Self::Date => 1,
            Self::DateTime => 2,
            Self::HiresTime => 3,
            _ => 0,
        }
    }

    /// The unsigned integer of the same width, for signed integers.
    #[inline]
    #[must_use]
    pub const fn to_unsigned(self) -> Self {
        match self {
            Self::Int8 => Self::UInt8,
            Self::Int16 => Self::UInt16,
            Self::Int32 => Self::UInt32,
            Self::Int64 => Self::UInt64,
            other => other,
        }
    }

    /// Keyword spelling of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Bool => "BOOL",
            Self::Char => "CHAR",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::HiresTime => "HIRESTIME",
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::UInt8 => "UINT8",
            Self::UInt16 => "UINT16",
            Self::UInt32 => "UINT32",
            Self::UInt64 => "UINT64",
            Self::Real => "REAL",
            Self::RichReal => "RICHREAL",
            Self::Text => "TEXT",
            Self::Undetermined => "UNDETERMINED",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_matches_discriminants() {
        for (i, p) in Primitive::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
            assert_eq!(Primitive::from_u8(i as u8), Some(*p));
        }
        assert_eq!(Primitive::from_u8(18), None);
    }

    #[test]
    fn test_classification() {
        assert!(Primitive::Int16.is_signed());
        assert!(Primitive::UInt64.is_unsigned());
        assert!(!Primitive::Real.is_integer());
        assert!(Primitive::RichReal.is_numeric());
        assert!(Primitive::DateTime.is_time());
        assert!(!Primitive::Text.is_numeric());
        assert!(!Primitive::Undetermined.is_integer());
    }

    #[test]
    fn test_time_rank_order() {
        assert!(Primitive::Date.time_rank() < Primitive::DateTime.time_rank());
        assert!(Primitive::DateTime.time_rank() < Primitive::HiresTime.time_rank());
        assert_eq!(Primitive::Bool.time_rank(), 0);
    }

    #[test]
    fn test_to_unsigned() {
        assert_eq!(Primitive::Int32.to_unsigned(), Primitive::UInt32);
        assert_eq!(Primitive::UInt8.to_unsigned(), Primitive::UInt8);
        assert_eq!(Primitive::Text.to_unsigned(), Primitive::Text);
    }
}
