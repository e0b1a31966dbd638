//! Source positions.
//!
//! The scanner hands every token to the semantic actions together with the
//! byte range it covers. Spans travel with semantic values so that a
//! diagnostic raised deep inside expression translation still points at
//! the offending source text.

use std::fmt;

/// Byte range `[start, end)` of a token or reduced phrase.
///
/// `0..0` marks values the compiler synthesized itself; an expression
/// link built with that span takes the cover of its operands instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// First byte.
    pub start: u32,
    /// One past the last byte.
    pub end: u32,
}

impl Span {
    /// Span of the bytes `start..end`.
    #[inline]
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// The synthesized-value span.
    #[inline]
    #[must_use]
    pub const fn dummy() -> Self {
        Self::new(0, 0)
    }

    /// Whether this is the synthesized-value span.
    #[inline]
    #[must_use]
    pub const fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    /// Smallest span covering both `self` and `other`.
    ///
    /// A dummy operand contributes nothing.
    #[must_use]
    pub fn merge(self, other: Span) -> Span {
        if self.is_dummy() {
            return other;
        }
        if other.is_dummy() {
            return self;
        }
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
