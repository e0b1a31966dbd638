//! Deduplicating constants area.
//!
//! Text literals and field names referenced by select instructions are
//! stored once per compilation unit as NUL-terminated byte strings. The
//! bytecode refers to them by byte offset into the area, so the offset of
//! a string never changes once it has been handed out.

use crate::error::CompileResult;
use rustc_hash::FxHashMap;
use std::fmt;

/// Per-unit pool of NUL-terminated constant strings.
///
/// Interning the same string multiple times returns the same offset.
#[derive(Default)]
pub struct StringPool {
    /// Raw constants area, each entry followed by a NUL byte.
    bytes: Vec<u8>,
    /// String content to byte offset.
    offsets: FxHashMap<Box<str>, u32>,
}

impl StringPool {
    /// Create a new, empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool with preallocated byte capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            offsets: FxHashMap::with_capacity_and_hasher(capacity / 8, Default::default()),
        }
    }

    /// Intern a string, returning its offset in the constants area.
    ///
    /// Strings containing an interior NUL are stored verbatim; readers of
    /// the area will see them truncated, same as any C-string consumer.
    pub fn intern(&mut self, s: &str) -> CompileResult<u32> {
        if let Some(&offset) = self.offsets.get(s) {
            return Ok(offset);
        }

        let offset = u32::try_from(self.bytes.len())
            .map_err(|_| crate::CompileError::out_of_memory("constants area"))?;
        self.bytes
            .try_reserve(s.len() + 1)
            .map_err(|_| crate::CompileError::out_of_memory("constants area"))?;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.into(), offset);

        tracing::trace!(target: "tally::constants", offset, text = s, "interned constant");
        Ok(offset)
    }

    /// Offset of an already-interned string.
    #[must_use]
    pub fn lookup(&self, s: &str) -> Option<u32> {
        self.offsets.get(s).copied()
    }

    /// Read the string stored at `offset`, up to its terminator.
    #[must_use]
    pub fn get(&self, offset: u32) -> Option<&str> {
        let start = offset as usize;
        let tail = self.bytes.get(start..)?;
        let end = tail.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&tail[..end]).ok()
    }

    /// The raw constants area.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the pool, returning the raw constants area.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size of the constants area in bytes.
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

    /// Number of distinct strings interned.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.offsets.len()
    }
}

impl fmt::Debug for StringPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringPool")
            .field("count", &self.offsets.len())
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
