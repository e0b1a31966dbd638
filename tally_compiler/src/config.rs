//! Compiler configuration.

use std::env;

/// Upper bound on sync blocks per procedure; the block index is one byte.
pub const SYNC_BLOCK_LIMIT: u16 = 256;

/// Options controlling diagnostics and limits of a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Warn when integer operands of different signedness are combined.
    pub warn_sign_mismatch: bool,
    /// Warn at the end of the unit for every global never referenced.
    pub warn_unused_globals: bool,
    /// Treat warnings as errors.
    pub warnings_as_errors: bool,
    /// Maximum number of sync blocks in one procedure.
    pub max_sync_blocks: u16,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            warn_sign_mismatch: true,
            warn_unused_globals: false,
            warnings_as_errors: false,
            max_sync_blocks: SYNC_BLOCK_LIMIT,
        }
    }
}

impl CompilerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `TALLY_*` environment variables.
    ///
    /// Unset or unparsable variables keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let flag = |key: &str| lookup(key).and_then(|v| parse_flag(&v));
        if let Some(v) = flag("TALLY_WARN_SIGN_MISMATCH") {
            config.warn_sign_mismatch = v;
        }
        if let Some(v) = flag("TALLY_WARN_UNUSED") {
            config.warn_unused_globals = v;
        }
        if let Some(v) = flag("TALLY_WARNINGS_AS_ERRORS") {
            config.warnings_as_errors = v;
        }
        if let Some(v) = lookup("TALLY_MAX_SYNC_BLOCKS").and_then(|v| v.trim().parse().ok()) {
            config = config.with_max_sync_blocks(v);
        }
        config
    }

    /// Enable or disable sign-mismatch warnings.
    #[must_use]
    pub const fn with_sign_mismatch_warnings(mut self, enabled: bool) -> Self {
        self.warn_sign_mismatch = enabled;
        self
    }

    /// Enable or disable unused-global warnings.
    #[must_use]
    pub const fn with_unused_global_warnings(mut self, enabled: bool) -> Self {
        self.warn_unused_globals = enabled;
        self
    }

    /// Treat warnings as errors.
    #[must_use]
    pub const fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    /// Set the sync block limit, clamped to `1..=256`.
    #[must_use]
    pub const fn with_max_sync_blocks(mut self, limit: u16) -> Self {
        self.max_sync_blocks = if limit == 0 {
            1
        } else if limit > SYNC_BLOCK_LIMIT {
            SYNC_BLOCK_LIMIT
        } else {
            limit
        };
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
