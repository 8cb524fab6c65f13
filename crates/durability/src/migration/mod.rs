//! Version migration.
//!
//! Migrations are directed edges between versions held by an explicit
//! [`MigrationRegistry`]. A path between two versions is found by
//! breadth-first search and applied step by step; the first failing step
//! aborts the chain and no partial output is returned.
//!
//! # Module Structure
//!
//! - `registry`: migration registry and path search
//! - `standard`: object-stream rewriting and the built-in format changes
//! - `compat`: per-version format handlers and the migrating reader

pub mod compat;
pub mod registry;
pub mod standard;

pub use compat::{read_current, CurrentFormatHandler, FormatHandler};
pub use registry::{MigrationFn, MigrationRegistry};
pub use standard::{format_changes, migration_notes, register_standard_migrations, rewrite_objects};

use serde::{Deserialize, Serialize};
use vellum_core::Version;

/// Prefix marking error entries in [`MigrationResult::messages`]
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Outcome of a migration step or chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Whether every step succeeded
    pub success: bool,
    /// Source version
    pub from: Version,
    /// Target version
    pub to: Version,
    /// Progress and error messages, errors prefixed with `ERROR: `
    pub messages: Vec<String>,
    /// Non-fatal notes such as precision changes
    pub warnings: Vec<String>,
    /// Step that failed, if any
    pub failed_step: Option<(Version, Version)>,
}

impl MigrationResult {
    /// A successful result with no messages.
    pub fn success(from: Version, to: Version) -> Self {
        MigrationResult {
            success: true,
            from,
            to,
            messages: Vec::new(),
            warnings: Vec::new(),
            failed_step: None,
        }
    }

    /// A failed result carrying one error message.
    pub fn failure(from: Version, to: Version, error: impl AsRef<str>) -> Self {
        let mut result = Self::success(from, to);
        result.add_error(error);
        result
    }

    /// Append a progress message.
    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Append a warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Append an `ERROR: ` message and mark the result failed.
    pub fn add_error(&mut self, error: impl AsRef<str>) {
        self.success = false;
        self.messages
            .push(format!("{}{}", ERROR_PREFIX, error.as_ref()));
    }

    /// Append a warning (builder pattern).
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.add_warning(warning);
        self
    }

    /// Most recent error message without its prefix.
    pub fn last_error(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.strip_prefix(ERROR_PREFIX))
    }
}
