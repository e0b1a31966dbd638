//! Binary type descriptors and the per-unit descriptor blob.
//!
//! # Encoding
//!
//! ```text
//! ┌──────────────┬───────────────┬───────────────────────────┬────────┐
//! │ type (u16 LE)│ length(u16 LE)│ table records (optional)  │  ";\0" │
//! └──────────────┴───────────────┴───────────────────────────┴────────┘
//!
//! table record: label bytes, 0x00, column type (u16 LE)
//! ```
//!
//! `length` covers the whole descriptor including header and end marker, so
//! basic, array and field descriptors are exactly six bytes. Table records
//! are written in label order, making the encoding independent of the order
//! columns were declared in.
//!
//! The blob is append-only and deduplicated: interning a descriptor that is
//! already present returns the existing offset.

use super::{FieldDescriptor, TypeCode};
use tally_core::{CompileError, CompileResult, MessageCode};

/// Size of the descriptor header.
pub const DESCRIPTOR_HEADER_LEN: usize = 4;

/// End-of-descriptor marker.
pub const DESCRIPTOR_END: [u8; 2] = *b";\0";

const MIN_DESCRIPTOR_LEN: usize = DESCRIPTOR_HEADER_LEN + DESCRIPTOR_END.len();

/// Append-only, deduplicated store of type descriptors.
#[derive(Debug, Default, Clone)]
pub struct DescriptorBlob {
    bytes: Vec<u8>,
}

impl DescriptorBlob {
    /// Create an empty blob.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blob over raw bytes, validated lazily on the next scan.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encode a type into a standalone descriptor.
    pub fn encode(ty: TypeCode, fields: &[FieldDescriptor]) -> CompileResult<Vec<u8>> {
        let mut sorted: Vec<&FieldDescriptor> = fields.iter().collect();
        sorted.sort_by(|a, b| a.label.cmp(&b.label));

        let body: usize = sorted.iter().map(|f| f.label.len() + 3).sum();
        let total = MIN_DESCRIPTOR_LEN + body;
        let total_u16 = u16::try_from(total).map_err(|_| {
            CompileError::internal_with(
                MessageCode::MalformedDescriptor,
                format!("type descriptor of {total} bytes exceeds the 16-bit length field"),
            )
        })?;

        let mut out = Vec::new();
        out.try_reserve_exact(total)?;
        out.extend_from_slice(&ty.to_raw().to_le_bytes());
        out.extend_from_slice(&total_u16.to_le_bytes());
        for field in sorted {
            out.extend_from_slice(field.label.as_bytes());
            out.push(0);
            out.extend_from_slice(&field.ty.to_raw().to_le_bytes());
        }
        out.extend_from_slice(&DESCRIPTOR_END);
        Ok(out)
    }

    /// Intern a type, returning the offset of its descriptor.
    pub fn intern(&mut self, ty: TypeCode, fields: &[FieldDescriptor]) -> CompileResult<u32> {
        let encoded = Self::encode(ty, fields)?;
        if let Some(offset) = self.find(&encoded)? {
            tracing::trace!(target: "tally::types", %ty, offset, "descriptor reused");
            return Ok(offset);
        }

        let offset = u32::try_from(self.bytes.len())
            .map_err(|_| CompileError::out_of_memory("type descriptor blob"))?;
        self.bytes
            .try_reserve(encoded.len())
            .map_err(|_| CompileError::out_of_memory("type descriptor blob"))?;
        self.bytes.extend_from_slice(&encoded);
        tracing::trace!(
            target: "tally::types",
            %ty,
            offset,
            len = encoded.len(),
            "descriptor appended"
        );
        Ok(offset)
    }

    /// Offset of an identical descriptor already in the blob.
    ///
    /// Fails if the scan meets a malformed descriptor.
    pub fn find(&self, encoded: &[u8]) -> CompileResult<Option<u32>> {
        for entry in self.entries() {
            let (offset, bytes) = entry?;
            if bytes == encoded {
                return Ok(Some(offset));
            }
        }
        Ok(None)
    }

    /// Walk the blob descriptor by descriptor.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            bytes: &self.bytes,
            pos: 0,
        }
    }

    /// Type code stored in the descriptor at `offset`.
    #[must_use]
    pub fn type_at(&self, offset: u32) -> Option<TypeCode> {
        let start = offset as usize;
        let raw = self.bytes.get(start..start + 2)?;
        TypeCode::from_raw(u16::from_le_bytes([raw[0], raw[1]]))
    }

    /// The raw blob.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Blob size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been interned.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Iterator over `(offset, descriptor bytes)` pairs of a blob.
pub struct Entries<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = CompileResult<(u32, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.bytes[start..];

        let malformed = |what: &str| {
            CompileError::internal_with(
                MessageCode::MalformedDescriptor,
                format!("malformed type descriptor at offset {start}: {what}"),
            )
        };

        if rest.len() < DESCRIPTOR_HEADER_LEN {
            self.pos = self.bytes.len();
            return Some(Err(malformed("truncated header")));
        }
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        if len < MIN_DESCRIPTOR_LEN {
            self.pos = self.bytes.len();
            return Some(Err(malformed("length below minimum")));
        }
        if len > rest.len() {
            self.pos = self.bytes.len();
            return Some(Err(malformed("runs past end of blob")));
        }
        if rest[len - 2..len] != DESCRIPTOR_END {
            self.pos = self.bytes.len();
            return Some(Err(malformed("missing end marker")));
        }

        self.pos = start + len;
        // Blob offsets are bounded by `intern`, which refuses to grow past u32.
        Some(Ok((start as u32, &rest[..len])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    fn field(label: &str, ty: TypeCode) -> FieldDescriptor {
        FieldDescriptor {
            label: label.into(),
            ty,
        }
    }

    #[test]
    fn test_basic_descriptor_layout() {
        let bytes = DescriptorBlob::encode(TypeCode::basic(Primitive::Int8), &[]).unwrap();
        assert_eq!(bytes, vec![Primitive::Int8 as u8, 0x00, 6, 0, b';', 0]);
    }

    #[test]
    fn test_array_and_field_descriptors_are_six_bytes() {
        let array = DescriptorBlob::encode(TypeCode::array_of(Primitive::Text), &[]).unwrap();
        let field = DescriptorBlob::encode(TypeCode::field_of(Primitive::Date), &[]).unwrap();
        assert_eq!(array.len(), 6);
        assert_eq!(field.len(), 6);
        assert_eq!(&array[..2], &0x0110u16.to_le_bytes());
    }

    #[test]
    fn test_table_descriptor_sorted_records() {
        let fields = [
            field("zeta", TypeCode::basic(Primitive::Bool)),
            field("alpha", TypeCode::array_of(Primitive::Int16)),
        ];
        let bytes = DescriptorBlob::encode(TypeCode::TABLE, &fields).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&TypeCode::TABLE.to_raw().to_le_bytes());
        expected.extend_from_slice(&(6u16 + 8 + 7).to_le_bytes());
        expected.extend_from_slice(b"alpha\0");
        expected.extend_from_slice(&TypeCode::array_of(Primitive::Int16).to_raw().to_le_bytes());
        expected.extend_from_slice(b"zeta\0");
        expected.extend_from_slice(&TypeCode::basic(Primitive::Bool).to_raw().to_le_bytes());
        expected.extend_from_slice(b";\0");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_interning_idempotent() {
        let mut blob = DescriptorBlob::new();
        let a = blob.intern(TypeCode::basic(Primitive::Int32), &[]).unwrap();
        let b = blob.intern(TypeCode::basic(Primitive::Int64), &[]).unwrap();
        let c = blob.intern(TypeCode::basic(Primitive::Int32), &[]).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(blob.len(), 12);
    }

    #[test]
    fn test_table_interning_ignores_declaration_order() {
        let mut blob = DescriptorBlob::new();
        let first = blob
            .intern(
                TypeCode::TABLE,
                &[
                    field("id", TypeCode::basic(Primitive::UInt32)),
                    field("name", TypeCode::basic(Primitive::Text)),
                ],
            )
            .unwrap();
        let second = blob
            .intern(
                TypeCode::TABLE,
                &[
                    field("name", TypeCode::basic(Primitive::Text)),
                    field("id", TypeCode::basic(Primitive::UInt32)),
                ],
            )
            .unwrap();
        let different = blob
            .intern(
                TypeCode::TABLE,
                &[field("id", TypeCode::basic(Primitive::UInt32))],
            )
            .unwrap();
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn test_type_at() {
        let mut blob = DescriptorBlob::new();
        blob.intern(TypeCode::basic(Primitive::Bool), &[]).unwrap();
        let off = blob.intern(TypeCode::array_of(Primitive::Char), &[]).unwrap();
        assert_eq!(blob.type_at(off), Some(TypeCode::array_of(Primitive::Char)));
        assert_eq!(blob.type_at(1000), None);
    }

    #[test]
    fn test_malformed_length_is_internal_error() {
        let mut blob = DescriptorBlob::from_bytes(vec![1, 0, 3, 0, b';', 0]);
        let err = blob
            .intern(TypeCode::basic(Primitive::Bool), &[])
            .unwrap_err();
        assert_eq!(err.code(), MessageCode::MalformedDescriptor);
        assert!(err.is_internal());
    }

    #[test]
    fn test_descriptor_running_past_end_is_internal_error() {
        let blob = DescriptorBlob::from_bytes(vec![1, 0, 40, 0, b';', 0]);
        assert!(blob.find(&[1, 0, 6, 0, b';', 0]).is_err());
    }

    #[test]
    fn test_missing_end_marker_is_internal_error() {
        let blob = DescriptorBlob::from_bytes(vec![1, 0, 6, 0, b'x', b'y']);
        assert!(blob.entries().next().unwrap().is_err());
    }

    #[test]
    fn test_truncated_header_is_internal_error() {
        let blob = DescriptorBlob::from_bytes(vec![1, 0, 6]);
        assert!(blob.find(&[1, 0, 6, 0, b';', 0]).is_err());
    }

    #[test]
    fn test_entries_walk() {
        let mut blob = DescriptorBlob::new();
        blob.intern(TypeCode::basic(Primitive::Bool), &[]).unwrap();
        blob.intern(
            TypeCode::TABLE,
            &[field("x", TypeCode::basic(Primitive::Int8))],
        )
        .unwrap();
        let offsets: Vec<u32> = blob.entries().map(|e| e.unwrap().0).collect();
        assert_eq!(offsets, vec![0, 6]);
    }
}
