//! Diagnostics channel.
//!
//! Every fallible semantic action reports through a [`DiagnosticLog`]:
//! a position (or the "ignore position" sentinel), a numeric
//! [`MessageCode`], a [`Severity`] and a rendered message. The log keeps
//! the full history of a unit and forwards each entry to an optional
//! callback injected by the embedder.
//!
//! # Numbering
//!
//! ```text
//! 1xxx  user errors        (undeclared names, type mismatches, ...)
//! 2xxx  warnings           (sign mismatch, unused globals)
//! 3xxx  extra notes        (context attached to the previous diagnostic)
//! 9xxx  internal / fatal   (invariant violations, resource exhaustion)
//! ```

use crate::span::Span;
use std::fmt;

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational message not tied to a problem.
    General,
    /// A user error; the unit will not produce an image.
    Error,
    /// A suspicious construct that still compiles.
    Warning,
    /// A compiler bug.
    Internal,
    /// Context for the diagnostic reported just before it.
    Extra,
}

impl Severity {
    /// Short lowercase name used in rendered diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "note",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Internal => "internal error",
            Self::Extra => "  info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageCode {
    // =========================================================================
    // Declarations (1000-1009)
    // =========================================================================
    /// An identifier was used but never declared.
    UndeclaredIdentifier = 1001,
    /// A name was declared twice in the same scope.
    AlreadyDeclared = 1002,
    /// A second external declaration appeared before the definition.
    ExternalRedeclared = 1003,
    /// A definition does not match its earlier external declaration.
    DeclarationMismatch = 1004,
    /// A field label appears twice in one table type.
    DuplicateField = 1005,
    /// A table column declared with a table or field type.
    InvalidColumnType = 1006,

    // =========================================================================
    // Operators and types (1010-1019)
    // =========================================================================
    /// A binary operator has no entry for the operand types.
    OperatorNotApplicable = 1010,
    /// A unary operator has no entry for the operand type.
    UnaryNotApplicable = 1011,
    /// The target of an assignment, `++` or `--` is not assignable.
    NotAnLValue = 1012,
    /// A field name does not exist on the table being accessed.
    FieldNotDeclared = 1013,
    /// A field required by the destination table is missing from the source.
    FieldNotFound = 1014,
    /// Same-named fields have incompatible types.
    FieldTypeMismatch = 1015,
    /// Field access on an expression that is not a table.
    NotATable = 1016,
    /// An integer literal does not fit any integer type.
    LiteralOutOfRange = 1017,

    // =========================================================================
    // Procedures (1020-1029)
    // =========================================================================
    /// A call names a procedure that does not exist.
    ProcedureNotDeclared = 1020,
    /// A call names something that is not a procedure.
    NotAProcedure = 1021,
    /// A call provides fewer arguments than parameters.
    TooFewArguments = 1022,
    /// A call provides more arguments than parameters.
    TooManyArguments = 1023,
    /// An argument cannot be passed as its parameter's type.
    ArgumentTypeMismatch = 1024,
    /// A returned expression does not match the return type.
    ReturnTypeMismatch = 1025,
    /// A procedure was defined twice.
    ProcedureRedefined = 1026,

    // =========================================================================
    // Statements (1030-1039)
    // =========================================================================
    /// A condition does not have boolean type.
    ConditionNotBool = 1030,
    /// `BREAK` outside of any loop.
    BreakOutsideLoop = 1031,
    /// `CONTINUE` outside of any loop.
    ContinueOutsideLoop = 1032,
    /// `ELSE`/`ELSEIF` without an open `IF`, or after an `ELSE`.
    MisplacedElse = 1033,
    /// A sync block opened inside another one.
    NestedSync = 1034,
    /// The per-procedure sync block budget is exhausted.
    TooManySyncBlocks = 1035,
    /// A statement appeared outside of any procedure.
    StatementOutsideProcedure = 1036,

    // =========================================================================
    // Warnings (2000-2999)
    // =========================================================================
    /// Signed and unsigned integers mixed in one operation.
    SignMismatch = 2001,
    /// A global is declared but never referenced.
    UnusedGlobal = 2002,

    // =========================================================================
    // Extra notes (3000-3999)
    // =========================================================================
    /// Context for a failure while translating a call argument.
    WhileEvaluatingArgument = 3001,

    // =========================================================================
    // Internal (9000-9999)
    // =========================================================================
    /// A malformed descriptor was found in the type descriptor blob.
    MalformedDescriptor = 9001,
    /// A branch or loop backpatch entry was left on its stack.
    UnbalancedBackpatch = 9002,
    /// `END SYNC` without an open sync block.
    SyncNotOpen = 9003,
    /// A jump patch targeted an instruction that is not a jump.
    InvalidJumpPatch = 9004,
    /// A semantic value was used after being freed or with the wrong kind.
    InvalidSemanticValue = 9005,
    /// Generic invariant violation.
    InternalInvariant = 9006,
    /// The unit finished with errors.
    CompilationAborted = 9050,
    /// A compiler buffer could not grow.
    OutOfMemory = 9100,
}

impl MessageCode {
    /// The stable numeric code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// The severity this code is reported with.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self.code() {
            1000..=1999 => Severity::Error,
            2000..=2999 => Severity::Warning,
            3000..=3999 => Severity::Extra,
            9050 | 9100 => Severity::Error,
            _ => Severity::Internal,
        }
    }

    /// Short title describing the whole class of message.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::UndeclaredIdentifier => "undeclared identifier",
            Self::AlreadyDeclared => "already declared",
            Self::ExternalRedeclared => "external declaration repeated",
            Self::DeclarationMismatch => "definition does not match declaration",
            Self::DuplicateField => "duplicate field",
            Self::InvalidColumnType => "invalid column type",
            Self::OperatorNotApplicable => "operator not applicable",
            Self::UnaryNotApplicable => "operator not applicable to type",
            Self::NotAnLValue => "not assignable",
            Self::FieldNotDeclared => "field not declared on this table",
            Self::FieldNotFound => "field not found",
            Self::FieldTypeMismatch => "field type mismatch",
            Self::NotATable => "not a table",
            Self::LiteralOutOfRange => "integer literal out of range",
            Self::ProcedureNotDeclared => "procedure not declared",
            Self::NotAProcedure => "not a procedure",
            Self::TooFewArguments => "needs more parameters",
            Self::TooManyArguments => "too many parameters",
            Self::ArgumentTypeMismatch => "argument type mismatch",
            Self::ReturnTypeMismatch => "return type mismatch",
            Self::ProcedureRedefined => "procedure already defined",
            Self::ConditionNotBool => "condition is not boolean",
            Self::BreakOutsideLoop => "break used outside a loop",
            Self::ContinueOutsideLoop => "continue used outside a loop",
            Self::MisplacedElse => "misplaced else",
            Self::NestedSync => "nested sync block",
            Self::TooManySyncBlocks => "too many sync blocks",
            Self::StatementOutsideProcedure => "statement outside procedure",
            Self::SignMismatch => "sign mismatch",
            Self::UnusedGlobal => "unused global",
            Self::WhileEvaluatingArgument => "while evaluating argument",
            Self::MalformedDescriptor => "malformed type descriptor",
            Self::UnbalancedBackpatch => "unbalanced backpatch stack",
            Self::SyncNotOpen => "sync block not open",
            Self::InvalidJumpPatch => "invalid jump patch",
            Self::InvalidSemanticValue => "invalid semantic value",
            Self::InternalInvariant => "internal invariant violated",
            Self::CompilationAborted => "compilation aborted",
            Self::OutOfMemory => "out of memory",
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.code())
    }
}

/// A single reported diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source position, or `None` for the ignore-position sentinel.
    pub position: Option<Span>,
    /// Message code.
    pub code: MessageCode,
    /// Severity (normally the code's default).
    pub severity: Severity,
    /// Rendered message text.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    #[must_use]
    pub fn new(code: MessageCode, position: Option<Span>, message: impl Into<String>) -> Self {
        Self {
            position,
            code,
            severity: code.severity(),
            message: message.into(),
        }
    }

    /// Create a diagnostic at a source position.
    #[must_use]
    pub fn at(code: MessageCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(code, Some(span), message)
    }

    /// Create a diagnostic at the ignore position.
    #[must_use]
    pub fn unpositioned(code: MessageCode, message: impl Into<String>) -> Self {
        Self::new(code, None, message)
    }

    /// Override the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.code, self.message)?;
        if let Some(span) = self.position {
            write!(f, " at {span}")?;
        }
        Ok(())
    }
}

/// Callback receiving every diagnostic as it is reported.
pub type DiagnosticHandler = Box<dyn FnMut(&Diagnostic)>;

/// Per-unit diagnostic log.
#[derive(Default)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
    handler: Option<DiagnosticHandler>,
    errors: usize,
    warnings: usize,
    warnings_as_errors: bool,
}

impl DiagnosticLog {
    /// Create an empty log without a callback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log forwarding every entry to `handler`.
    #[must_use]
    pub fn with_handler(handler: DiagnosticHandler) -> Self {
        Self {
            handler: Some(handler),
            ..Self::default()
        }
    }

    /// Count warnings as errors.
    pub fn set_warnings_as_errors(&mut self, enabled: bool) {
        self.warnings_as_errors = enabled;
    }

    /// Record a diagnostic and forward it to the callback.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error | Severity::Internal => self.errors += 1,
            Severity::Warning if self.warnings_as_errors => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::General | Severity::Extra => {}
        }
        tracing::trace!(
            target: "tally::diagnostics",
            code = diagnostic.code.code(),
            severity = %diagnostic.severity,
            "{}",
            diagnostic.message
        );
        if let Some(handler) = self.handler.as_mut() {
            handler(&diagnostic);
        }
        self.entries.push(diagnostic);
    }

    /// Number of diagnostics that prevent an image from being produced.
    #[inline]
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// Number of warnings recorded (excluding those promoted to errors).
    #[inline]
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Whether any error was recorded.
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// All diagnostics in report order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Whether a diagnostic with `code` was reported.
    #[must_use]
    pub fn contains(&self, code: MessageCode) -> bool {
        self.entries.iter().any(|d| d.code == code)
    }

    /// Iterate over diagnostics with a given code.
    pub fn with_code(&self, code: MessageCode) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.code == code)
    }

    /// Take the recorded diagnostics, leaving the counters untouched.
    pub fn take_entries(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("entries", &self.entries)
            .field("errors", &self.errors)
            .field("warnings", &self.warnings)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
