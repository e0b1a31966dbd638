//! Type model.
//!
//! A [`TypeCode`] is a primitive base plus orthogonal composite modifiers:
//!
//! ```text
//! INT8                      base=Int8
//! ARRAY OF INT8             base=Int8         flags=ARRAY
//! FIELD OF ARRAY OF TEXT    base=Text         flags=FIELD|ARRAY
//! TABLE (a AS INT8, ...)    base=Undetermined flags=TABLE   + field list
//! ARRAY                     base=Undetermined flags=ARRAY   (generic)
//! ```
//!
//! Tables describe their columns through a [`FieldListId`] into the unit's
//! [`FieldArena`]. Whether an expression result is assignable is carried
//! separately as a [`ValueKind`], not as a bit on the type code.

mod descriptor;
mod fields;
mod primitive;

pub use descriptor::{DESCRIPTOR_END, DESCRIPTOR_HEADER_LEN, DescriptorBlob, Entries as DescriptorEntries};
pub use fields::{
    FieldArena, FieldDescriptor, FieldListId, FieldMismatch, fields_compatible, tables_compatible,
};
pub use primitive::Primitive;

use bitflags::bitflags;
use std::fmt;
use tally_core::Span;

bitflags! {
    /// Composite modifier bits of a type code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        /// Array of the base kind.
        const ARRAY = 0x0100;
        /// Table column of the base kind (or of an array of it).
        const FIELD = 0x0200;
        /// Table; the base is always `Undetermined`.
        const TABLE = 0x0400;
    }
}

/// A primitive base combined with composite modifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeCode {
    /// Element kind.
    pub base: Primitive,
    /// Composite modifiers.
    pub flags: TypeFlags,
}

/// Result of [`TypeCode::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Array modifier present.
    pub is_array: bool,
    /// Field modifier present.
    pub is_field: bool,
    /// Table modifier present.
    pub is_table: bool,
    /// Base primitive.
    pub base: Primitive,
}

impl TypeCode {
    /// Failure sentinel returned by actions that reported an error.
    pub const UNKNOWN: TypeCode = TypeCode::basic(Primitive::Unknown);

    /// Type of the `NULL` literal.
    pub const NULL: TypeCode = TypeCode::basic(Primitive::Undetermined);

    /// Generic table type.
    pub const TABLE: TypeCode = TypeCode {
        base: Primitive::Undetermined,
        flags: TypeFlags::TABLE,
    };

    /// Bit marking an assignable value in the raw single-integer encoding.
    pub(crate) const L_VALUE_BIT: u16 = 0x0800;

    const BASE_MASK: u16 = 0x00FF;

    /// A scalar type.
    #[inline]
    #[must_use]
    pub const fn basic(base: Primitive) -> Self {
        Self {
            base,
            flags: TypeFlags::empty(),
        }
    }

    /// `ARRAY OF base`.
    #[inline]
    #[must_use]
    pub const fn array_of(base: Primitive) -> Self {
        Self {
            base,
            flags: TypeFlags::ARRAY,
        }
    }

    /// `FIELD OF base`.
    #[inline]
    #[must_use]
    pub const fn field_of(base: Primitive) -> Self {
        Self {
            base,
            flags: TypeFlags::FIELD,
        }
    }

    /// Wrap a scalar or array type as a table column.
    #[inline]
    #[must_use]
    pub const fn as_field(self) -> Self {
        Self {
            base: self.base,
            flags: self.flags.union(TypeFlags::FIELD),
        }
    }

    /// Pure bit extraction of the type's parts.
    #[inline]
    #[must_use]
    pub const fn classify(self) -> Classification {
        Classification {
            is_array: self.is_array(),
            is_field: self.is_field(),
            is_table: self.is_table(),
            base: self.base,
        }
    }

    /// Array modifier present.
    #[inline]
    #[must_use]
    pub const fn is_array(self) -> bool {
        self.flags.contains(TypeFlags::ARRAY)
    }

    /// Field modifier present.
    #[inline]
    #[must_use]
    pub const fn is_field(self) -> bool {
        self.flags.contains(TypeFlags::FIELD)
    }

    /// Table modifier present.
    #[inline]
    #[must_use]
    pub const fn is_table(self) -> bool {
        self.flags.contains(TypeFlags::TABLE)
    }

    /// No composite modifier.
    #[inline]
    #[must_use]
    pub const fn is_basic(self) -> bool {
        self.flags.is_empty()
    }

    /// The failure sentinel.
    #[inline]
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        self.is_basic() && matches!(self.base, Primitive::Unknown)
    }

    /// A basic value of the given kind.
    #[inline]
    #[must_use]
    pub const fn is_basic_of(self, base: Primitive) -> bool {
        self.is_basic() && self.base as u8 == base as u8
    }

    /// Type produced by indexing a value of this type, if indexable.
    ///
    /// A field indexed by row yields its column type, an array yields its
    /// element and text yields a character.
    #[must_use]
    pub const fn element(self) -> Option<Self> {
        if self.is_table() {
            None
        } else if self.is_field() {
            Some(Self {
                base: self.base,
                flags: self.flags.difference(TypeFlags::FIELD),
            })
        } else if self.is_array() {
            Some(Self::basic(self.base))
        } else if matches!(self.base, Primitive::Text) {
            Some(Self::basic(Primitive::Char))
        } else {
            None
        }
    }

    /// Raw single-integer encoding (`base | flags`).
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        self.base as u16 | self.flags.bits()
    }

    /// Decode the raw encoding; the l-value bit is ignored.
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        let base = Primitive::from_u8((raw & Self::BASE_MASK) as u8)?;
        let flags = TypeFlags::from_bits(raw & !Self::BASE_MASK & !Self::L_VALUE_BIT)?;
        Some(Self { base, flags })
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_table() {
            return f.write_str("TABLE");
        }
        let generic = matches!(self.base, Primitive::Undetermined);
        match (self.is_field(), self.is_array()) {
            (true, true) if generic => f.write_str("FIELD OF ARRAY"),
            (true, true) => write!(f, "FIELD OF ARRAY OF {}", self.base),
            (true, false) if generic => f.write_str("FIELD"),
            (true, false) => write!(f, "FIELD OF {}", self.base),
            (false, true) if generic => f.write_str("ARRAY"),
            (false, true) => write!(f, "ARRAY OF {}", self.base),
            (false, false) => write!(f, "{}", self.base),
        }
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCode({self})")
    }
}

/// Assignability of an expression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueKind {
    /// Computed value.
    #[default]
    RValue,
    /// Storage location: variables, indexed elements, `t[row, f]`.
    LValue,
    /// Column selected with `t.f`; readable and indexable, not assignable.
    FieldRef,
}

/// A column of a table type as written in a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column label.
    pub name: Box<str>,
    /// Column type: a basic or array type.
    pub ty: TypeCode,
    /// Position of the label.
    pub span: Span,
}

impl FieldSpec {
    /// Create a field spec.
    pub fn new(name: impl Into<Box<str>>, ty: TypeCode, span: Span) -> Self {
        Self {
            name: name.into(),
            ty,
            span,
        }
    }
}

/// A type as written in a declaration (`AS ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    /// Declared type code.
    pub ty: TypeCode,
    /// Columns for table types; empty for everything else and for the
    /// generic `TABLE`.
    pub fields: Vec<FieldSpec>,
}

impl TypeSpec {
    /// A non-table type.
    #[must_use]
    pub fn of(ty: TypeCode) -> Self {
        Self {
            ty,
            fields: Vec::new(),
        }
    }

    /// A scalar type.
    #[must_use]
    pub fn basic(base: Primitive) -> Self {
        Self::of(TypeCode::basic(base))
    }

    /// A table type with the given columns.
    #[must_use]
    pub fn table(fields: Vec<FieldSpec>) -> Self {
        Self {
            ty: TypeCode::TABLE,
            fields,
        }
    }
}

/// A resolved type: type code plus the field list of table types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef {
    /// Type code.
    pub ty: TypeCode,
    /// Columns when `ty` is a table with declared fields.
    pub fields: Option<FieldListId>,
}

impl TypeRef {
    /// A type without a field list.
    #[inline]
    #[must_use]
    pub const fn plain(ty: TypeCode) -> Self {
        Self { ty, fields: None }
    }
}
