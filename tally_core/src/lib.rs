//! # Tally Core
//!
//! Core types shared by every stage of the tally compiler.
//!
//! - **Spans**: byte ranges into the source buffer, used to position diagnostics
//! - **Errors**: the fatal error type (resource exhaustion, internal invariants)
//! - **Diagnostics**: numbered, severity-tagged messages and the reporting channel
//! - **Interning**: the deduplicating, NUL-terminated constants area of a unit

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod diagnostic;
pub mod error;
pub mod intern;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticHandler, DiagnosticLog, MessageCode, Severity};
pub use error::{CompileError, CompileResult};
pub use intern::StringPool;
pub use span::Span;

/// Tally compiler version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
