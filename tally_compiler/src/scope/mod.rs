//! Symbol tables.
//!
//! A unit has one [`GlobalScope`] holding global variables and procedures
//! in a shared namespace, and each procedure being compiled has a
//! [`LocalScope`] for its parameters and locals.
//!
//! # Deferred addressing
//!
//! Globals and procedures get no runtime slot when declared. Lookup is a
//! read-only query; the first [`GlobalScope::mark_referenced`] (or
//! [`GlobalScope::mark_called`]) assigns the next id and later calls
//! return the same one. Unused globals therefore never cost a slot.

mod procedure;
mod symbol;

pub use procedure::{Param, ProcId, Procedure, Signature};
pub use symbol::{GlobalVar, LocalScope, LocalVar, VarId};

use crate::types::TypeRef;
use rustc_hash::FxHashMap;
use tally_core::{MessageCode, Span};

/// Why a declaration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareError {
    /// The name is already in use in the same scope.
    AlreadyDeclared,
    /// A second external declaration of a name not yet defined.
    ExternalRedeclared,
    /// The definition does not match the external declaration.
    Mismatch,
    /// A procedure defined twice.
    Redefined,
}

impl DeclareError {
    /// Diagnostic code for the rejection.
    #[must_use]
    pub const fn code(self) -> MessageCode {
        match self {
            Self::AlreadyDeclared => MessageCode::AlreadyDeclared,
            Self::ExternalRedeclared => MessageCode::ExternalRedeclared,
            Self::Mismatch => MessageCode::DeclarationMismatch,
            Self::Redefined => MessageCode::ProcedureRedefined,
        }
    }
}

/// An entry of the global namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalSymbol {
    /// Global variable.
    Variable(VarId),
    /// Procedure.
    Procedure(ProcId),
}

/// What a name resolves to from inside the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Parameter or local with its slot and type.
    Local {
        /// Stack slot.
        address: u32,
        /// Declared type.
        ty: TypeRef,
    },
    /// Global variable.
    Global(VarId),
    /// Procedure.
    Procedure(ProcId),
}

/// Globals and procedures of a compilation unit.
#[derive(Debug, Default)]
pub struct GlobalScope {
    names: FxHashMap<Box<str>, GlobalSymbol>,
    variables: Vec<GlobalVar>,
    procedures: Vec<Procedure>,
    next_address: u32,
    next_import: u32,
}

impl GlobalScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a global variable.
    ///
    /// An external declaration may be followed by one definition of the
    /// same type, which completes it.
    pub fn declare_variable(
        &mut self,
        name: &str,
        ty: TypeRef,
        descriptor: u32,
        span: Span,
        external: bool,
    ) -> Result<VarId, DeclareError> {
        match self.names.get(name) {
            Some(GlobalSymbol::Procedure(_)) => Err(DeclareError::AlreadyDeclared),
            Some(&GlobalSymbol::Variable(id)) => {
                let var = &mut self.variables[id.0 as usize];
                match (var.external, external) {
                    (false, _) => Err(DeclareError::AlreadyDeclared),
                    (true, true) => Err(DeclareError::ExternalRedeclared),
                    (true, false) if var.descriptor != descriptor => Err(DeclareError::Mismatch),
                    (true, false) => {
                        var.external = false;
                        var.ty = ty;
                        var.span = span;
                        Ok(id)
                    }
                }
            }
            None => {
                let id = VarId(self.variables.len() as u32);
                self.variables.push(GlobalVar {
                    name: name.into(),
                    ty,
                    descriptor,
                    external,
                    span,
                    address: None,
                });
                self.names.insert(name.into(), GlobalSymbol::Variable(id));
                Ok(id)
            }
        }
    }

    /// Declare a procedure.
    ///
    /// An external declaration may be followed by exactly one definition
    /// with a matching signature; the definition's parameter names win.
    pub fn declare_procedure(
        &mut self,
        name: &str,
        signature: Signature,
        span: Span,
        external: bool,
    ) -> Result<ProcId, DeclareError> {
        match self.names.get(name) {
            Some(GlobalSymbol::Variable(_)) => Err(DeclareError::AlreadyDeclared),
            Some(&GlobalSymbol::Procedure(id)) => {
                let proc = &mut self.procedures[id.0 as usize];
                match (proc.external, external) {
                    (false, true) => Err(DeclareError::AlreadyDeclared),
                    (false, false) => Err(DeclareError::Redefined),
                    (true, true) => Err(DeclareError::ExternalRedeclared),
                    (true, false) if !proc.signature.matches(&signature) => {
                        Err(DeclareError::Mismatch)
                    }
                    (true, false) => {
                        proc.external = false;
                        proc.signature = signature;
                        proc.span = span;
                        Ok(id)
                    }
                }
            }
            None => {
                let id = ProcId(self.procedures.len() as u32);
                self.procedures.push(Procedure {
                    name: name.into(),
                    signature,
                    external,
                    compiled: false,
                    span,
                    import: None,
                });
                self.names.insert(name.into(), GlobalSymbol::Procedure(id));
                Ok(id)
            }
        }
    }

    /// Look up a global name without marking it referenced.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<GlobalSymbol> {
        self.names.get(name).copied()
    }

    /// Look up a global variable by name.
    #[must_use]
    pub fn lookup_variable(&self, name: &str) -> Option<VarId> {
        match self.lookup(name)? {
            GlobalSymbol::Variable(id) => Some(id),
            GlobalSymbol::Procedure(_) => None,
        }
    }

    /// Look up a procedure by name.
    #[must_use]
    pub fn lookup_procedure(&self, name: &str) -> Option<ProcId> {
        match self.lookup(name)? {
            GlobalSymbol::Procedure(id) => Some(id),
            GlobalSymbol::Variable(_) => None,
        }
    }

    /// A global variable.
    #[must_use]
    pub fn variable(&self, id: VarId) -> &GlobalVar {
        &self.variables[id.0 as usize]
    }

    /// A procedure.
    #[must_use]
    pub fn procedure(&self, id: ProcId) -> &Procedure {
        &self.procedures[id.0 as usize]
    }

    pub(crate) fn procedure_mut(&mut self, id: ProcId) -> &mut Procedure {
        &mut self.procedures[id.0 as usize]
    }

    /// Assign the variable its address id if it has none yet.
    pub fn mark_referenced(&mut self, id: VarId) -> u32 {
        let var = &mut self.variables[id.0 as usize];
        if let Some(address) = var.address {
            return address;
        }
        let address = self.next_address;
        self.next_address += 1;
        var.address = Some(address);
        tracing::trace!(
            target: "tally::scope",
            name = %var.name,
            address,
            "assigned global address"
        );
        address
    }

    /// Assign the procedure its import id if it has none yet.
    pub fn mark_called(&mut self, id: ProcId) -> u32 {
        let proc = &mut self.procedures[id.0 as usize];
        if let Some(import) = proc.import {
            return import;
        }
        let import = self.next_import;
        self.next_import += 1;
        proc.import = Some(import);
        tracing::trace!(target: "tally::scope", name = %proc.name, import, "assigned import id");
        import
    }

    /// Global variables in declaration order.
    pub fn variables(&self) -> &[GlobalVar] {
        &self.variables
    }

    /// Procedures in declaration order.
    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    /// Number of address ids handed out.
    #[inline]
    #[must_use]
    pub const fn address_count(&self) -> u32 {
        self.next_address
    }
}

/// Resolve a name from inside an optional procedure scope.
///
/// Locals and parameters are searched first, then (when `recursive`) the
/// global namespace. The lookup does not assign addresses.
#[must_use]
pub fn lookup(
    locals: Option<&LocalScope>,
    globals: &GlobalScope,
    name: &str,
    recursive: bool,
) -> Option<Resolved> {
    if let Some(var) = locals.and_then(|scope| scope.lookup(name)) {
        return Some(Resolved::Local {
            address: var.address,
            ty: var.ty,
        });
    }
    if locals.is_some() && !recursive {
        return None;
    }
    Some(match globals.lookup(name)? {
        GlobalSymbol::Variable(id) => Resolved::Global(id),
        GlobalSymbol::Procedure(id) => Resolved::Procedure(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Primitive, TypeCode};

    fn ty(p: Primitive) -> TypeRef {
        TypeRef::plain(TypeCode::basic(p))
    }

    fn sig(ret_descriptor: u32) -> Signature {
        Signature {
            ret: ty(Primitive::Int32),
            ret_descriptor,
            params: Vec::new(),
        }
    }

    #[test]
    fn test_redeclared_global() {
        let mut globals = GlobalScope::new();
        globals
            .declare_variable("g", ty(Primitive::Int8), 0, Span::dummy(), false)
            .unwrap();
        assert_eq!(
            globals.declare_variable("g", ty(Primitive::Int8), 0, Span::dummy(), false),
            Err(DeclareError::AlreadyDeclared)
        );
    }

    #[test]
    fn test_external_then_definition() {
        let mut globals = GlobalScope::new();
        let id = globals
            .declare_variable("g", ty(Primitive::Int8), 6, Span::dummy(), true)
            .unwrap();
        assert_eq!(
            globals.declare_variable("g", ty(Primitive::Int8), 6, Span::dummy(), true),
            Err(DeclareError::ExternalRedeclared)
        );
        assert_eq!(
            globals.declare_variable("g", ty(Primitive::Int8), 6, Span::dummy(), false),
            Ok(id)
        );
        assert!(!globals.variable(id).external);
    }

    #[test]
    fn test_external_definition_must_match() {
        let mut globals = GlobalScope::new();
        globals
            .declare_variable("g", ty(Primitive::Int8), 6, Span::dummy(), true)
            .unwrap();
        assert_eq!(
            globals.declare_variable("g", ty(Primitive::Text), 12, Span::dummy(), false),
            Err(DeclareError::Mismatch)
        );
    }

    #[test]
    fn test_procedures_share_namespace() {
        let mut globals = GlobalScope::new();
        globals
            .declare_procedure("p", sig(0), Span::dummy(), false)
            .unwrap();
        assert_eq!(
            globals.declare_variable("p", ty(Primitive::Bool), 0, Span::dummy(), false),
            Err(DeclareError::AlreadyDeclared)
        );
        assert_eq!(
            globals.declare_procedure("p", sig(0), Span::dummy(), false),
            Err(DeclareError::Redefined)
        );
        assert!(globals.lookup_variable("p").is_none());
        assert!(globals.lookup_procedure("p").is_some());
    }

    #[test]
    fn test_procedure_forward_declaration() {
        let mut globals = GlobalScope::new();
        let id = globals.declare_procedure("p", sig(0), Span::dummy(), true).unwrap();
        assert!(globals.procedure(id).external);
        assert_eq!(
            globals.declare_procedure("p", sig(6), Span::dummy(), false),
            Err(DeclareError::Mismatch)
        );
        assert_eq!(globals.declare_procedure("p", sig(0), Span::dummy(), false), Ok(id));
        assert!(!globals.procedure(id).external);
    }

    #[test]
    fn test_mark_referenced_is_idempotent() {
        let mut globals = GlobalScope::new();
        let a = globals
            .declare_variable("a", ty(Primitive::Int8), 0, Span::dummy(), false)
            .unwrap();
        let b = globals
            .declare_variable("b", ty(Primitive::Int8), 0, Span::dummy(), false)
            .unwrap();
        assert_eq!(globals.variable(a).address(), None);
        assert_eq!(globals.mark_referenced(b), 0);
        assert_eq!(globals.mark_referenced(a), 1);
        assert_eq!(globals.mark_referenced(b), 0);
        assert_eq!(globals.address_count(), 2);
    }

    #[test]
    fn test_import_ids_are_deferred() {
        let mut globals = GlobalScope::new();
        let p = globals.declare_procedure("p", sig(0), Span::dummy(), false).unwrap();
        let q = globals.declare_procedure("q", sig(0), Span::dummy(), false).unwrap();
        assert_eq!(globals.procedure(p).import_id(), None);
        assert_eq!(globals.mark_called(q), 0);
        assert_eq!(globals.mark_called(p), 1);
        assert_eq!(globals.mark_called(q), 0);
    }

    #[test]
    fn test_local_shadows_global() {
        let mut globals = GlobalScope::new();
        let g = globals
            .declare_variable("x", ty(Primitive::Int8), 0, Span::dummy(), false)
            .unwrap();
        let mut locals = LocalScope::default();
        assert_eq!(lookup(Some(&locals), &globals, "x", true), Some(Resolved::Global(g)));
        locals
            .declare("x", ty(Primitive::Text), 0, Span::dummy())
            .unwrap();
        assert_eq!(
            lookup(Some(&locals), &globals, "x", true),
            Some(Resolved::Local {
                address: 0,
                ty: ty(Primitive::Text)
            })
        );
        assert_eq!(lookup(None, &globals, "x", true), Some(Resolved::Global(g)));
    }

    #[test]
    fn test_non_recursive_lookup_stays_local() {
        let mut globals = GlobalScope::new();
        globals
            .declare_variable("g", ty(Primitive::Int8), 0, Span::dummy(), false)
            .unwrap();
        let locals = LocalScope::default();
        assert_eq!(lookup(Some(&locals), &globals, "g", false), None);
    }
}
