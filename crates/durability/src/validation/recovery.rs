//! Best-effort and validated file reads.

use super::validator::{read_header, FormatValidator};
use super::ValidationResult;
use crate::format::{FileHeader, FILE_HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{info, warn};
use vellum_core::{Error, Result};

/// Integrity check that can fail independently of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegrityCheck {
    /// Data-section CRC32
    Checksum,
    /// Object framing walk
    Structure,
}

/// Data salvaged from a file regardless of check outcomes.
#[derive(Debug, Clone)]
pub struct RecoveredFile {
    /// Parsed (and magic/version-checked) header
    pub header: FileHeader,
    /// Bytes of the data region that were present on disk
    pub data: Vec<u8>,
    /// Checks that reported errors
    pub failed_checks: Vec<IntegrityCheck>,
    /// Full checksum report
    pub checksum: ValidationResult,
    /// Full structure report
    pub structure: ValidationResult,
}

impl RecoveredFile {
    /// Whether both checks passed.
    pub fn is_intact(&self) -> bool {
        self.failed_checks.is_empty()
    }
}

/// Read a file's data region even when integrity checks fail.
///
/// Only an unreadable header, an unrecognised magic or an unsupported
/// version is fatal. Otherwise the data region is returned as far as it
/// exists on disk, together with the checks that failed.
pub fn read_with_recovery(path: impl AsRef<Path>) -> Result<RecoveredFile> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader)?;
    header.validate()?;

    let validator = FormatValidator::new();
    let checksum = validator.validate_checksum_from(&mut reader);
    let structure = validator.validate_structure_from(&mut reader);

    let mut failed_checks = Vec::new();
    if !checksum.is_valid() {
        failed_checks.push(IntegrityCheck::Checksum);
    }
    if !structure.is_valid() {
        failed_checks.push(IntegrityCheck::Structure);
    }

    let file_len = reader.seek(SeekFrom::End(0))?;
    let start = header.data_offset.max(FILE_HEADER_SIZE as u64).min(file_len);
    let end = if header.total_size >= start && header.total_size <= file_len {
        header.total_size
    } else {
        file_len
    };
    reader.seek(SeekFrom::Start(start))?;
    let mut data = Vec::with_capacity((end - start) as usize);
    reader.take(end - start).read_to_end(&mut data)?;

    if failed_checks.is_empty() {
        info!(path = %path.display(), bytes = data.len(), "File read without recovery");
    } else {
        warn!(
            path = %path.display(),
            failed = ?failed_checks,
            bytes = data.len(),
            "Recovered data region despite failed checks"
        );
    }

    Ok(RecoveredFile {
        header,
        data,
        failed_checks,
        checksum,
        structure,
    })
}

/// Read a whole file after validating it.
///
/// Returns [`Error::Validation`] carrying the report when any requested
/// check finds an error. The header is always checked.
pub fn read_validated(
    path: impl AsRef<Path>,
    check_checksum: bool,
    check_structure: bool,
) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let validator = FormatValidator::new();
    let mut report = ValidationResult::new();
    if check_checksum {
        report.merge(validator.validate_file_checksum(path));
    }
    if check_structure {
        report.merge(validator.validate_structure(path));
    }
    report.into_result()?;

    let bytes = std::fs::read(path)?;
    let header = FileHeader::from_bytes(&bytes)?;
    header.validate()?;
    Ok(bytes)
}
