//! Variable symbols and the procedure-local scope.

use super::DeclareError;
use crate::types::TypeRef;
use rustc_hash::FxHashMap;
use tally_core::Span;

/// Index of a global variable in the [`GlobalScope`](super::GlobalScope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct VarId(pub u32);

/// A global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVar {
    /// Variable name.
    pub name: Box<str>,
    /// Declared type.
    pub ty: TypeRef,
    /// Offset of the type in the descriptor blob.
    pub descriptor: u32,
    /// Declared external and not yet defined.
    pub external: bool,
    /// Position of the declaring name.
    pub span: Span,
    pub(super) address: Option<u32>,
}

impl GlobalVar {
    /// Address id, assigned on first reference.
    #[inline]
    #[must_use]
    pub const fn address(&self) -> Option<u32> {
        self.address
    }

    /// Whether the variable has been referenced.
    #[inline]
    #[must_use]
    pub const fn is_referenced(&self) -> bool {
        self.address.is_some()
    }
}

/// A parameter or local variable of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    /// Variable name.
    pub name: Box<str>,
    /// Declared type.
    pub ty: TypeRef,
    /// Offset of the type in the descriptor blob.
    pub descriptor: u32,
    /// Stack slot; parameters come first.
    pub address: u32,
    /// Declared in the parameter list.
    pub is_param: bool,
    /// Position of the declaring name.
    pub span: Span,
}

/// Parameters and locals of the procedure being compiled.
///
/// Addresses are assigned at declaration: parameters take `0..n` in order
/// and locals continue from `n`. A local may not reuse a parameter's name.
#[derive(Debug, Default)]
pub struct LocalScope {
    vars: Vec<LocalVar>,
    index: FxHashMap<Box<str>, u32>,
    params: u32,
}

impl LocalScope {
    /// Create a scope holding the given parameters.
    ///
    /// Parameter names are expected to be unique; a repeated name keeps
    /// the first slot.
    pub fn with_params<I>(params: I) -> Self
    where
        I: IntoIterator<Item = (Box<str>, TypeRef, u32, Span)>,
    {
        let mut scope = Self::default();
        for (name, ty, descriptor, span) in params {
            // Duplicates were already reported against the declaration.
            let _ = scope.insert(name, ty, descriptor, span, true);
        }
        scope.params = scope.vars.len() as u32;
        scope
    }

    /// Declare a local variable, returning its address.
    pub fn declare(
        &mut self,
        name: &str,
        ty: TypeRef,
        descriptor: u32,
        span: Span,
    ) -> Result<u32, DeclareError> {
        self.insert(name.into(), ty, descriptor, span, false)
    }

    fn insert(
        &mut self,
        name: Box<str>,
        ty: TypeRef,
        descriptor: u32,
        span: Span,
        is_param: bool,
    ) -> Result<u32, DeclareError> {
        if self.index.contains_key(&name) {
            return Err(DeclareError::AlreadyDeclared);
        }
        let address = self.vars.len() as u32;
        self.index.insert(name.clone(), address);
        self.vars.push(LocalVar {
            name,
            ty,
            descriptor,
            address,
            is_param,
            span,
        });
        Ok(address)
    }

    /// Find a local or parameter by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&LocalVar> {
        self.index.get(name).map(|&i| &self.vars[i as usize])
    }

    /// Number of parameters.
    #[inline]
    #[must_use]
    pub const fn param_count(&self) -> u32 {
        self.params
    }

    /// Parameters in slot order.
    pub fn params(&self) -> &[LocalVar] {
        &self.vars[..self.params as usize]
    }

    /// Locals in slot order.
    pub fn locals(&self) -> &[LocalVar] {
        &self.vars[self.params as usize..]
    }

    /// Parameters followed by locals.
    pub fn all(&self) -> &[LocalVar] {
        &self.vars
    }

    /// Total number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the procedure has neither parameters nor locals.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
