//! Compilation units.
//!
//! A [`CompilationUnit`] receives the semantic actions of one source unit
//! in parse order: declarations at global scope, then procedure bodies
//! bracketed by [`begin_procedure`](CompilationUnit::begin_procedure) and
//! [`end_procedure`](CompilationUnit::end_procedure). [`finish`](CompilationUnit::finish)
//! turns it into a [`CompiledUnit`].
//!
//! User errors are reported through the diagnostics channel and
//! compilation continues; a fatal [`CompileError`] is also reported (at
//! the ignore position) before it is returned.

use crate::bytecode;
use crate::compiler::{ProcedureState, StatementCompiler, UnitContext};
use crate::config::CompilerConfig;
use crate::scope::{LocalScope, Param, ProcId, Signature};
use crate::types::{DescriptorBlob, TypeCode, TypeRef};
use crate::values::{ValueId, ValuePool};
use rustc_hash::{FxHashMap, FxHashSet};
use tally_core::{
    CompileError, CompileResult, Diagnostic, DiagnosticHandler, DiagnosticLog, MessageCode,
    Severity, Span,
};

// =============================================================================
// Compiled Image
// =============================================================================

/// A slot of a compiled procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotImage {
    /// Variable name.
    pub name: Box<str>,
    /// Declared type.
    pub ty: TypeRef,
    /// Offset of the type in the descriptor blob.
    pub descriptor: u32,
}

/// Bytecode and frame layout of a compiled procedure body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureCode {
    /// Instruction stream.
    pub code: Vec<u8>,
    /// Parameters then locals, indexed by address.
    pub slots: Vec<SlotImage>,
    /// Number of leading parameter slots.
    pub params: u32,
    /// Number of `SYNC` blocks used.
    pub sync_blocks: u32,
}

impl ProcedureCode {
    /// Render the instruction stream.
    pub fn disassemble(&self) -> CompileResult<String> {
        bytecode::disassemble(&self.code)
    }
}

/// A global variable in the compiled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalImage {
    /// Name.
    pub name: Box<str>,
    /// Declared type.
    pub ty: TypeRef,
    /// Offset of the type in the descriptor blob.
    pub descriptor: u32,
    /// Address id; `None` when the global was never referenced.
    pub address: Option<u32>,
    /// Declared external and never defined in this unit.
    pub external: bool,
}

/// A procedure in the compiled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureImage {
    /// Name.
    pub name: Box<str>,
    /// Import id; `None` when the procedure is never called in this unit.
    pub import: Option<u32>,
    /// Declared external and never defined in this unit.
    pub external: bool,
    /// Return type descriptor offset.
    pub ret_descriptor: u32,
    /// Parameter descriptor offsets.
    pub param_descriptors: Vec<u32>,
    /// Compiled body, if the unit defines one.
    pub body: Option<ProcedureCode>,
}

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Global variables in declaration order.
    pub globals: Vec<GlobalImage>,
    /// Procedures in declaration order.
    pub procedures: Vec<ProcedureImage>,
    /// Constants area: NUL-terminated, deduplicated strings.
    pub constants: Vec<u8>,
    /// Type descriptor blob.
    pub descriptors: DescriptorBlob,
    /// Warnings and notes reported while compiling.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledUnit {
    /// Find a global by name.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&GlobalImage> {
        self.globals.iter().find(|g| &*g.name == name)
    }

    /// Find a procedure by name.
    #[must_use]
    pub fn procedure(&self, name: &str) -> Option<&ProcedureImage> {
        self.procedures.iter().find(|p| &*p.name == name)
    }

    /// Code of a defined procedure.
    #[must_use]
    pub fn code(&self, name: &str) -> Option<&[u8]> {
        self.procedure(name)?.body.as_ref().map(|b| &b.code[..])
    }

    /// Type recorded in the descriptor at `offset`.
    ///
    /// Offsets come from [`GlobalImage::descriptor`], [`SlotImage::descriptor`]
    /// and the procedure descriptor lists.
    #[must_use]
    pub fn descriptor_type(&self, offset: u32) -> Option<TypeCode> {
        self.descriptors.type_at(offset)
    }
}

// =============================================================================
// Compilation Unit
// =============================================================================

/// The compiler state of one source unit.
#[derive(Debug)]
pub struct CompilationUnit {
    ctx: UnitContext,
    current: Option<ProcedureState>,
    bodies: FxHashMap<ProcId, ProcedureCode>,
    /// Statements rejected outside any procedure whose closing statement
    /// has not been seen yet.
    orphans: u32,
}

impl Default for CompilationUnit {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl CompilationUnit {
    /// Create a unit that only records diagnostics.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self::with_log(config, DiagnosticLog::new())
    }

    /// Create a unit forwarding every diagnostic to `handler`.
    #[must_use]
    pub fn with_handler(config: CompilerConfig, handler: DiagnosticHandler) -> Self {
        Self::with_log(config, DiagnosticLog::with_handler(handler))
    }

    fn with_log(config: CompilerConfig, log: DiagnosticLog) -> Self {
        Self {
            ctx: UnitContext::new(config, log),
            current: None,
            bodies: FxHashMap::default(),
            orphans: 0,
        }
    }

    /// The semantic value pool the parser driver fills.
    pub fn values(&mut self) -> &mut ValuePool {
        &mut self.ctx.values
    }

    /// Diagnostics reported so far.
    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.ctx.diagnostics
    }

    /// Whether an error has been reported.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.ctx.aborted
    }

    /// Options of this unit.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.ctx.config
    }

    /// The procedure being compiled, if any.
    #[must_use]
    pub fn current_procedure(&self) -> Option<&ProcedureState> {
        self.current.as_ref()
    }

    /// Report a fatal error before handing it back.
    fn fatal<T>(&mut self, result: CompileResult<T>) -> CompileResult<T> {
        if let Err(err) = &result {
            let severity = if err.is_internal() {
                Severity::Internal
            } else {
                Severity::Error
            };
            self.ctx.aborted = true;
            self.ctx.diagnostics.report(
                Diagnostic::unpositioned(err.code(), err.to_string()).with_severity(severity),
            );
        }
        result
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Declare the variables of an identifier list with a shared type.
    ///
    /// Inside a procedure the variables are locals; `external` only applies
    /// at global scope.
    pub fn declare_variables(
        &mut self,
        names: ValueId,
        spec: ValueId,
        external: bool,
    ) -> CompileResult<()> {
        let result = self.declare_variables_inner(names, spec, external);
        self.fatal(result)
    }

    fn declare_variables_inner(
        &mut self,
        names: ValueId,
        spec: ValueId,
        external: bool,
    ) -> CompileResult<()> {
        let names = self.ctx.values.take_id_list(names)?;
        let spec = self.ctx.values.take_type_spec(spec)?;
        let ty = self.ctx.resolve_type_spec(spec)?;
        let descriptor = self.ctx.descriptor_of(ty)?;
        for (name, span) in names {
            let declared = match self.current.as_mut() {
                Some(proc) => proc.locals.declare(&name, ty, descriptor, span).map(drop),
                None => self
                    .ctx
                    .globals
                    .declare_variable(&name, ty, descriptor, span, external)
                    .map(drop),
            };
            if let Err(err) = declared {
                self.ctx.error(err.code(), span, declare_message(err.code(), &name));
            }
        }
        Ok(())
    }

    /// Declare a procedure. `params` is `None` for a procedure without
    /// parameters.
    pub fn declare_procedure(
        &mut self,
        name: ValueId,
        ret: ValueId,
        params: Option<ValueId>,
        external: bool,
    ) -> CompileResult<()> {
        let result = self.declare_procedure_inner(name, ret, params, external);
        self.fatal(result)
    }

    fn declare_procedure_inner(
        &mut self,
        name: ValueId,
        ret: ValueId,
        params: Option<ValueId>,
        external: bool,
    ) -> CompileResult<()> {
        let (name, span) = self.ctx.values.take_identifier(name)?;
        let ret_spec = self.ctx.values.take_type_spec(ret)?;
        let param_specs = match params {
            Some(id) => self.ctx.values.take_param_list(id)?,
            None => Vec::new(),
        };
        if self.current.is_some() {
            self.ctx.error(
                MessageCode::StatementOutsideProcedure,
                span,
                format!("procedure `{name}` must be declared at global scope"),
            );
            return Ok(());
        }

        let ret = self.ctx.resolve_type_spec(ret_spec)?;
        let ret_descriptor = self.ctx.descriptor_of(ret)?;
        let mut seen = FxHashSet::default();
        let mut params = Vec::with_capacity(param_specs.len());
        for spec in param_specs {
            if !seen.insert(spec.name.clone()) {
                self.ctx.error(
                    MessageCode::AlreadyDeclared,
                    spec.span,
                    format!("parameter `{}` is already declared", spec.name),
                );
                continue;
            }
            let ty = self.ctx.resolve_type_spec(spec.spec)?;
            let descriptor = self.ctx.descriptor_of(ty)?;
            params.push(Param {
                name: spec.name,
                ty,
                descriptor,
                span: spec.span,
            });
        }

        let signature = Signature {
            ret,
            ret_descriptor,
            params,
        };
        if let Err(err) = self
            .ctx
            .globals
            .declare_procedure(&name, signature, span, external)
        {
            self.ctx.error(err.code(), span, declare_message(err.code(), &name));
        }
        Ok(())
    }

    // =========================================================================
    // Procedures
    // =========================================================================

    /// Start compiling the body of a declared procedure.
    ///
    /// A body whose header is rejected is still compiled for diagnostics
    /// but produces no code.
    pub fn begin_procedure(&mut self, name: ValueId) -> CompileResult<()> {
        let result = self.begin_procedure_inner(name);
        self.fatal(result)
    }

    fn begin_procedure_inner(&mut self, name: ValueId) -> CompileResult<()> {
        let (name, span) = self.ctx.values.take_identifier(name)?;
        if let Some(open) = &self.current {
            return Err(CompileError::internal(format!(
                "procedure `{name}` started while `{}` is still open",
                open.name
            )));
        }

        let globals = &self.ctx.globals;
        let target = match globals.lookup_procedure(&name) {
            None => Err((
                MessageCode::ProcedureNotDeclared,
                format!("procedure `{name}` is not declared"),
            )),
            Some(id) if globals.procedure(id).external => Err((
                MessageCode::ProcedureNotDeclared,
                format!("procedure `{name}` is only declared external"),
            )),
            Some(id) if globals.procedure(id).compiled => Err((
                MessageCode::ProcedureRedefined,
                format!("procedure `{name}` already has a body"),
            )),
            Some(id) => Ok(id),
        };

        let state = match target {
            Ok(id) => {
                let proc = self.ctx.globals.procedure_mut(id);
                proc.compiled = true;
                let locals = LocalScope::with_params(
                    proc.signature
                        .params
                        .iter()
                        .map(|p| (p.name.clone(), p.ty, p.descriptor, p.span)),
                );
                ProcedureState::new(Some(id), &name, proc.signature.ret, locals)
            }
            Err((code, message)) => {
                self.ctx.error(code, span, message);
                ProcedureState::new(
                    None,
                    &name,
                    TypeRef::plain(TypeCode::UNKNOWN),
                    LocalScope::default(),
                )
            }
        };
        tracing::debug!(
            target: "tally::unit",
            procedure = %name,
            params = state.locals.param_count(),
            "procedure started"
        );
        self.current = Some(state);
        Ok(())
    }

    /// Finish the current procedure body.
    pub fn end_procedure(&mut self) -> CompileResult<()> {
        let result = self.end_procedure_inner();
        self.fatal(result)
    }

    fn end_procedure_inner(&mut self) -> CompileResult<()> {
        let state = self
            .current
            .take()
            .ok_or_else(|| CompileError::internal("END PROCEDURE without an open procedure"))?;
        if !state.branches.is_empty() || !state.loops.is_empty() {
            return Err(CompileError::internal_with(
                MessageCode::UnbalancedBackpatch,
                format!(
                    "procedure `{}` ended with {} open branch and {} open loop entries",
                    state.name,
                    state.branches.len(),
                    state.loops.len()
                ),
            ));
        }
        if state.in_sync() {
            return Err(CompileError::internal_with(
                MessageCode::SyncNotOpen,
                format!("procedure `{}` ended inside a sync block", state.name),
            ));
        }

        let sync_blocks = state.sync_blocks();
        let slots: Vec<SlotImage> = state
            .locals
            .all()
            .iter()
            .map(|v| SlotImage {
                name: v.name.clone(),
                ty: v.ty,
                descriptor: v.descriptor,
            })
            .collect();
        let params = state.locals.param_count();
        let code = state.code.finish();
        tracing::debug!(
            target: "tally::unit",
            procedure = %state.name,
            code_len = code.len(),
            slots = slots.len(),
            sync_blocks,
            "procedure finished"
        );
        if let Some(id) = state.proc {
            self.bodies.insert(
                id,
                ProcedureCode {
                    code,
                    slots,
                    params,
                    sync_blocks,
                },
            );
        }
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Run a statement action inside the current procedure.
    ///
    /// Outside a procedure the statement is reported with `outside` and
    /// `opens` tells whether a closing statement will follow.
    fn statement<F>(
        &mut self,
        span: Span,
        outside: MessageCode,
        opens: bool,
        f: F,
    ) -> CompileResult<()>
    where
        F: FnOnce(&mut StatementCompiler<'_>) -> CompileResult<()>,
    {
        let result = match self.current.as_mut() {
            Some(proc) => f(&mut StatementCompiler::new(&mut self.ctx, proc)),
            None => {
                let message = match outside {
                    MessageCode::BreakOutsideLoop => "break used outside a loop",
                    MessageCode::ContinueOutsideLoop => "continue used outside a loop",
                    _ => "statement is only allowed inside a procedure",
                };
                self.ctx.error(outside, span, message);
                if opens {
                    self.orphans += 1;
                }
                Ok(())
            }
        };
        self.fatal(result)
    }

    /// Run a closing statement; one left over from a rejected opener is
    /// dropped quietly.
    fn closing<F>(&mut self, span: Span, f: F) -> CompileResult<()>
    where
        F: FnOnce(&mut StatementCompiler<'_>) -> CompileResult<()>,
    {
        if self.current.is_none() && self.orphans > 0 {
            self.orphans -= 1;
            return Ok(());
        }
        self.statement(span, MessageCode::StatementOutsideProcedure, false, f)
    }

    /// Release a value tree that a rejected statement will not translate.
    fn discard(&mut self, id: ValueId) -> CompileResult<()> {
        if self.current.is_none() {
            let result = self.ctx.values.release(id);
            return self.fatal(result);
        }
        Ok(())
    }

    /// Expression statement.
    pub fn expression(&mut self, expr: ValueId) -> CompileResult<()> {
        let span = self.ctx.values.span(expr).unwrap_or_default();
        self.discard(expr)?;
        self.statement(span, MessageCode::StatementOutsideProcedure, false, |s| {
            s.expression(expr)
        })
    }

    /// `RETURN expr`.
    pub fn return_statement(&mut self, expr: ValueId) -> CompileResult<()> {
        let span = self.ctx.values.span(expr).unwrap_or_default();
        self.discard(expr)?;
        self.statement(span, MessageCode::StatementOutsideProcedure, false, |s| {
            s.return_value(expr)
        })
    }

    /// `IF cond`.
    pub fn begin_if(&mut self, cond: ValueId) -> CompileResult<()> {
        let span = self.ctx.values.span(cond).unwrap_or_default();
        self.discard(cond)?;
        self.statement(span, MessageCode::StatementOutsideProcedure, true, |s| {
            s.begin_if(cond)
        })
    }

    /// `ELSEIF cond`.
    pub fn begin_elseif(&mut self, cond: ValueId, span: Span) -> CompileResult<()> {
        self.discard(cond)?;
        self.statement(span, MessageCode::StatementOutsideProcedure, false, |s| {
            s.begin_elseif(cond, span)
        })
    }

    /// `ELSE`.
    pub fn begin_else(&mut self, span: Span) -> CompileResult<()> {
        self.statement(span, MessageCode::StatementOutsideProcedure, false, |s| {
            s.begin_else(span)
        })
    }

    /// `END` of an `IF` chain.
    pub fn end_if(&mut self, span: Span) -> CompileResult<()> {
        self.closing(span, |s| s.end_if())
    }

    /// `WHILE cond`.
    pub fn begin_while(&mut self, cond: ValueId) -> CompileResult<()> {
        let span = self.ctx.values.span(cond).unwrap_or_default();
        self.discard(cond)?;
        self.statement(span, MessageCode::StatementOutsideProcedure, true, |s| {
            s.begin_while(cond)
        })
    }

    /// `END` of a `WHILE` loop.
    pub fn end_while(&mut self, span: Span) -> CompileResult<()> {
        self.closing(span, |s| s.end_while())
    }

    /// `DO` opening an `UNTIL` loop.
    pub fn begin_until(&mut self, span: Span) -> CompileResult<()> {
        self.statement(span, MessageCode::StatementOutsideProcedure, true, |s| {
            s.begin_until()
        })
    }

    /// `UNTIL cond` closing the loop.
    pub fn end_until(&mut self, cond: ValueId) -> CompileResult<()> {
        let span = self.ctx.values.span(cond).unwrap_or_default();
        self.discard(cond)?;
        self.closing(span, |s| s.end_until(cond))
    }

    /// `BREAK`.
    pub fn break_statement(&mut self, span: Span) -> CompileResult<()> {
        self.statement(span, MessageCode::BreakOutsideLoop, false, |s| {
            s.break_loop(span)
        })
    }

    /// `CONTINUE`.
    pub fn continue_statement(&mut self, span: Span) -> CompileResult<()> {
        self.statement(span, MessageCode::ContinueOutsideLoop, false, |s| {
            s.continue_loop(span)
        })
    }

    /// `SYNC`.
    pub fn begin_sync(&mut self, span: Span) -> CompileResult<()> {
        self.statement(span, MessageCode::StatementOutsideProcedure, true, |s| {
            s.begin_sync(span)
        })
    }

    /// `END` of a `SYNC` block.
    pub fn end_sync(&mut self, span: Span) -> CompileResult<()> {
        self.closing(span, |s| s.end_sync())
    }

    // =========================================================================
    // Finishing
    // =========================================================================

    /// Finish the unit and produce its image.
    ///
    /// Returns [`CompileError::Aborted`] when any error was reported.
    pub fn finish(mut self) -> CompileResult<CompiledUnit> {
        if let Some(open) = &self.current {
            let err = CompileError::internal(format!(
                "unit finished while procedure `{}` is open",
                open.name
            ));
            return self.fatal(Err(err));
        }

        if self.ctx.config.warn_unused_globals {
            let unused: Vec<(Box<str>, Span)> = self
                .ctx
                .globals
                .variables()
                .iter()
                .filter(|v| !v.is_referenced() && !v.external)
                .map(|v| (v.name.clone(), v.span))
                .collect();
            for (name, span) in unused {
                self.ctx.warning(
                    MessageCode::UnusedGlobal,
                    span,
                    format!("global `{name}` is never used"),
                );
            }
        }

        if self.ctx.aborted || self.ctx.diagnostics.has_errors() {
            let errors = self.ctx.diagnostics.error_count().max(1);
            tracing::debug!(target: "tally::unit", errors, "unit aborted");
            return Err(CompileError::Aborted { errors });
        }

        let UnitContext {
            globals,
            descriptors,
            constants,
            mut diagnostics,
            ..
        } = self.ctx;
        let mut bodies = self.bodies;

        let globals_image: Vec<GlobalImage> = globals
            .variables()
            .iter()
            .map(|v| GlobalImage {
                name: v.name.clone(),
                ty: v.ty,
                descriptor: v.descriptor,
                address: v.address(),
                external: v.external,
            })
            .collect();
        let procedures: Vec<ProcedureImage> = globals
            .procedures()
            .iter()
            .enumerate()
            .map(|(i, p)| ProcedureImage {
                name: p.name.clone(),
                import: p.import_id(),
                external: p.external,
                ret_descriptor: p.signature.ret_descriptor,
                param_descriptors: p.signature.params.iter().map(|q| q.descriptor).collect(),
                body: bodies.remove(&ProcId(i as u32)),
            })
            .collect();

        tracing::debug!(
            target: "tally::unit",
            globals = globals_image.len(),
            referenced = globals.address_count(),
            procedures = procedures.len(),
            constants = constants.len(),
            descriptors = descriptors.len(),
            "unit finished"
        );
        Ok(CompiledUnit {
            globals: globals_image,
            procedures,
            constants: constants.into_bytes(),
            descriptors,
            diagnostics: diagnostics.take_entries(),
        })
    }
}

fn declare_message(code: MessageCode, name: &str) -> String {
    match code {
        MessageCode::ExternalRedeclared => format!("`{name}` is already declared external"),
        MessageCode::DeclarationMismatch => {
            format!("definition of `{name}` does not match its external declaration")
        }
        MessageCode::ProcedureRedefined => format!("procedure `{name}` is already defined"),
        _ => format!("`{name}` is already declared"),
    }
}
