//! Fatal error types for the tally compiler.
//!
//! User mistakes (undeclared names, type mismatches, misplaced `BREAK`)
//! are not errors in this sense: they travel through the diagnostics
//! channel and compilation keeps going in best-effort mode. The variants
//! here are the conditions that end the compilation of a unit:
//! - Resource exhaustion while growing a compiler buffer
//! - Internal invariant violations (compiler bugs)
//! - A unit finished with user errors recorded

use crate::diagnostic::MessageCode;
use thiserror::Error;

/// The result type used by fallible compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Conditions that abort the compilation of a whole unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A compiler buffer could not grow.
    #[error("out of memory while growing {what}")]
    OutOfMemory {
        /// The buffer that failed to grow.
        what: &'static str,
    },

    /// An internal invariant was violated.
    #[error("internal compiler error: {message}")]
    Internal {
        /// The diagnostic code that classifies the violation.
        code: MessageCode,
        /// Error description.
        message: String,
    },

    /// The unit recorded user errors and produced no image.
    #[error("compilation aborted after {errors} error(s)")]
    Aborted {
        /// Number of error diagnostics recorded.
        errors: usize,
    },
}

impl CompileError {
    /// Create an internal error with the generic invariant code.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: MessageCode::InternalInvariant,
            message: message.into(),
        }
    }

    /// Create an internal error with a specific code.
    #[must_use]
    pub fn internal_with(code: MessageCode, message: impl Into<String>) -> Self {
        Self::Internal {
            code,
            message: message.into(),
        }
    }

    /// Create a resource exhaustion error.
    #[must_use]
    pub const fn out_of_memory(what: &'static str) -> Self {
        Self::OutOfMemory { what }
    }

    /// The diagnostic code reported for this error.
    #[must_use]
    pub const fn code(&self) -> MessageCode {
        match self {
            Self::OutOfMemory { .. } => MessageCode::OutOfMemory,
            Self::Internal { code, .. } => *code,
            Self::Aborted { .. } => MessageCode::CompilationAborted,
        }
    }

    /// Whether this error signals a compiler bug rather than a user or
    /// environment problem.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl From<std::collections::TryReserveError> for CompileError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::out_of_memory("compiler buffer")
    }
}
