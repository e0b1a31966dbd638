//! Field lists of table types.
//!
//! Every table declaration with columns gets one list in the unit's
//! [`FieldArena`]; all variables declared in the same statement share it.

use super::{Primitive, TypeCode};
use crate::ops;
use tally_core::{CompileError, CompileResult};

/// Index of a field list in the [`FieldArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FieldListId(pub u32);

/// A named, typed column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column label; compared case-sensitively.
    pub label: Box<str>,
    /// Column type: basic or `ARRAY OF` basic, never a field or table.
    pub ty: TypeCode,
}

/// Why two table types are not compatible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMismatch {
    /// The destination requires a column the source lacks.
    Missing(Box<str>),
    /// Same-named columns with incompatible types.
    Type {
        /// Column label.
        label: Box<str>,
        /// Source column type.
        src: TypeCode,
        /// Destination column type.
        dst: TypeCode,
    },
}

/// Arena of field lists for one compilation unit.
#[derive(Debug, Default)]
pub struct FieldArena {
    lists: Vec<Box<[FieldDescriptor]>>,
}

impl FieldArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a field list, returning its id.
    pub fn alloc(&mut self, fields: Vec<FieldDescriptor>) -> CompileResult<FieldListId> {
        let id = u32::try_from(self.lists.len())
            .map_err(|_| CompileError::out_of_memory("field arena"))?;
        self.lists.try_reserve(1)?;
        self.lists.push(fields.into_boxed_slice());
        Ok(FieldListId(id))
    }

    /// The columns of a list; empty for an id from another arena.
    #[must_use]
    pub fn get(&self, id: FieldListId) -> &[FieldDescriptor] {
        self.lists.get(id.0 as usize).map_or(&[][..], |list| &list[..])
    }

    /// Find a column by exact label.
    #[must_use]
    pub fn find(&self, id: FieldListId, label: &str) -> Option<&FieldDescriptor> {
        self.get(id).iter().find(|f| &*f.label == label)
    }

    /// Number of lists allocated.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether no list has been allocated.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// Whether a value of column type `src` can be stored into column type `dst`.
///
/// Array-ness must agree and the store table must have an entry for the
/// element kinds. A generic (`Undetermined`) element on either side
/// matches any element.
#[must_use]
pub fn fields_compatible(dst: TypeCode, src: TypeCode) -> bool {
    if dst.is_array() != src.is_array() {
        return false;
    }
    if dst.base == Primitive::Undetermined || src.base == Primitive::Undetermined {
        return true;
    }
    ops::resolve_store(dst.base, src.base).is_some()
}

/// Check that every column of `dst` has a compatible same-named column in
/// `src`. With `ignore_missing`, columns absent from `src` are skipped.
pub fn tables_compatible(
    arena: &FieldArena,
    src: FieldListId,
    dst: FieldListId,
    ignore_missing: bool,
) -> Result<(), FieldMismatch> {
    for wanted in arena.get(dst) {
        match arena.find(src, &wanted.label) {
            None if ignore_missing => {}
            None => return Err(FieldMismatch::Missing(wanted.label.clone())),
            Some(found) if !fields_compatible(wanted.ty, found.ty) => {
                return Err(FieldMismatch::Type {
                    label: wanted.label.clone(),
                    src: found.ty,
                    dst: wanted.ty,
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(label: &str, ty: TypeCode) -> FieldDescriptor {
        FieldDescriptor {
            label: label.into(),
            ty,
        }
    }

    fn int(p: Primitive) -> TypeCode {
        TypeCode::basic(p)
    }

    #[test]
    fn test_fields_compatible_requires_same_arrayness() {
        assert!(fields_compatible(int(Primitive::Int32), int(Primitive::Int8)));
        assert!(!fields_compatible(
            TypeCode::array_of(Primitive::Int32),
            int(Primitive::Int32)
        ));
        assert!(fields_compatible(
            TypeCode::array_of(Primitive::Int32),
            TypeCode::array_of(Primitive::Undetermined)
        ));
    }

    #[test]
    fn test_fields_compatible_uses_store_table() {
        assert!(fields_compatible(int(Primitive::Text), int(Primitive::Char)));
        assert!(!fields_compatible(int(Primitive::Char), int(Primitive::Text)));
        assert!(!fields_compatible(int(Primitive::Bool), int(Primitive::Int8)));
    }

    #[test]
    fn test_tables_compatible_missing_field() {
        let mut arena = FieldArena::new();
        let src = arena
            .alloc(vec![field("id", int(Primitive::Int32))])
            .unwrap();
        let dst = arena
            .alloc(vec![
                field("id", int(Primitive::Int64)),
                field("name", int(Primitive::Text)),
            ])
            .unwrap();

        assert_eq!(
            tables_compatible(&arena, src, dst, false),
            Err(FieldMismatch::Missing("name".into()))
        );
        assert_eq!(tables_compatible(&arena, src, dst, true), Ok(()));
    }

    #[test]
    fn test_tables_compatible_type_mismatch() {
        let mut arena = FieldArena::new();
        let src = arena.alloc(vec![field("flag", int(Primitive::Int8))]).unwrap();
        let dst = arena.alloc(vec![field("flag", int(Primitive::Bool))]).unwrap();

        assert!(matches!(
            tables_compatible(&arena, src, dst, true),
            Err(FieldMismatch::Type { .. })
        ));
    }

    #[test]
    fn test_field_lookup_is_exact() {
        let mut arena = FieldArena::new();
        let id = arena
            .alloc(vec![field("Amount", int(Primitive::Real))])
            .unwrap();
        assert!(arena.find(id, "Amount").is_some());
        assert!(arena.find(id, "amount").is_none());
        assert!(arena.find(id, "Amoun").is_none());
        assert!(arena.find(id, "Amounts").is_none());
    }

    #[test]
    fn test_unknown_list_is_empty() {
        let arena = FieldArena::new();
        assert!(arena.get(FieldListId(7)).is_empty());
        assert!(arena.is_empty());
    }
}
