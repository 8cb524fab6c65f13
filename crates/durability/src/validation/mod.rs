//! Validation and integrity checks.
//!
//! Validation never fails with `Err`: every problem becomes an entry in a
//! [`ValidationResult`] so a caller can decide to proceed on warnings alone.
//! The checksum check and the structural check are independent; a corrupted
//! payload byte trips the former but not the latter.
//!
//! # Module Structure
//!
//! - `checksum`: CRC32 of the data section
//! - `validator`: header, object and structural checks
//! - `recovery`: best-effort and validated file reads

pub mod checksum;
pub mod recovery;
pub mod validator;

pub use checksum::{checksum, data_section_checksum};
pub use recovery::{read_validated, read_with_recovery, IntegrityCheck, RecoveredFile};
pub use validator::FormatValidator;

use serde::{Deserialize, Serialize};
use std::fmt;
use vellum_core::{Error, ErrorKind};

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Classification of the problem
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Problems that make the data untrustworthy
    pub errors: Vec<ValidationIssue>,
    /// Anomalies that do not prevent reading
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Create an empty (valid) result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid iff there are no errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error.
    pub fn add_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            kind,
            message: message.into(),
        });
    }

    /// Record an error from an [`Error`] value.
    pub fn add_failure(&mut self, error: &Error) {
        self.add_error(error.kind(), error.to_string());
    }

    /// Record a warning.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Append all entries of `other`.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Kind of the first error, if any.
    pub fn first_error_kind(&self) -> Option<ErrorKind> {
        self.errors.first().map(|issue| issue.kind)
    }

    /// Whether any error has `kind`.
    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|issue| issue.kind == kind)
    }

    /// Convert into `Err(Error::Validation)` when invalid.
    pub fn into_result(self) -> vellum_core::Result<ValidationResult> {
        match self.first_error_kind() {
            None => Ok(self),
            Some(kind) => Err(Error::Validation {
                kind,
                report: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "valid")?;
        } else {
            write!(f, "{} error(s)", self.errors.len())?;
        }
        if !self.warnings.is_empty() {
            write!(f, ", {} warning(s)", self.warnings.len())?;
        }
        for issue in &self.errors {
            write!(f, "; ERROR {:?}: {}", issue.kind, issue.message)?;
        }
        for warning in &self.warnings {
            write!(f, "; WARNING: {}", warning)?;
        }
        Ok(())
    }
}
