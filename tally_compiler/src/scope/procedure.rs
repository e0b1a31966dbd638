//! Procedure symbols.

use crate::types::TypeRef;
use tally_core::Span;

/// Index of a procedure in the [`GlobalScope`](super::GlobalScope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ProcId(pub u32);

/// A declared procedure parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name.
    pub name: Box<str>,
    /// Declared type.
    pub ty: TypeRef,
    /// Offset of the type in the descriptor blob.
    pub descriptor: u32,
    /// Position of the name.
    pub span: Span,
}

/// Return type and parameters of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Return type.
    pub ret: TypeRef,
    /// Descriptor offset of the return type.
    pub ret_descriptor: u32,
    /// Parameters in declaration order.
    pub params: Vec<Param>,
}

impl Signature {
    /// Whether two signatures describe the same types.
    ///
    /// Descriptors are interned, so structurally equal types share an
    /// offset and parameter names do not take part.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.ret_descriptor == other.ret_descriptor
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.descriptor == b.descriptor)
    }
}

/// A procedure symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    /// Procedure name.
    pub name: Box<str>,
    /// Declared signature.
    pub signature: Signature,
    /// Only an external declaration has been seen.
    pub external: bool,
    /// A body has been compiled.
    pub compiled: bool,
    /// Position of the declaring name.
    pub span: Span,
    pub(super) import: Option<u32>,
}

impl Procedure {
    /// Import id, assigned on first call.
    #[inline]
    #[must_use]
    pub const fn import_id(&self) -> Option<u32> {
        self.import
    }

    /// Number of parameters.
    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        self.signature.params.len()
    }
}
