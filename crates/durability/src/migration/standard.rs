//! Object-stream rewriting and the built-in format changes.
//!
//! | Step      | Change                                                     |
//! |-----------|------------------------------------------------------------|
//! | 1.0 → 1.1 | Point2D payload gains a trailing `high_precision` flag byte |
//! | 1.1 → 2.0 | Color channels widen from `u8` to `f32` (host order)       |
//! | 1.1 → 1.0 | Downgrade: the Point2D flag byte is dropped                |
//!
//! Objects a step does not understand are copied through unchanged.

use super::compat::CurrentFormatHandler;
use super::registry::MigrationRegistry;
use super::MigrationResult;
use crate::encoding::{BinaryReader, BinaryWriter};
use crate::format::{FileHeader, ObjectHeader, FILE_HEADER_SIZE, MAGIC, OBJECT_HEADER_SIZE};
use crate::validation::checksum;
use byteorder::{BigEndian, ByteOrder};
use std::fmt::Write as _;
use vellum_core::{Error, FormatFlags, Result, TypeId, Version};

const V1_0: Version = Version::new(1, 0);
const V1_1: Version = Version::new(1, 1);
const V2_0: Version = Version::new(2, 0);

/// Point2D payload: x f32, y f32
const POINT2D_V1_0_SIZE: usize = 8;
/// Point2D payload: x f32, y f32, high_precision u8
const POINT2D_V1_1_SIZE: usize = 9;
/// Color payload: r, g, b, a as u8
const COLOR_U8_SIZE: usize = 4;

/// Rewrite every object of a flat, uncompressed stream.
///
/// `input` may start with a [`FileHeader`] or be a bare object stream.
/// `transform` returns a replacement payload for objects it changes and
/// `None` for objects that are copied through. When a header is present its
/// version becomes `target`, and `total_size` and the checksum (if one was
/// stored) are recomputed.
pub fn rewrite_objects<F>(input: &[u8], target: Version, mut transform: F) -> Result<Vec<u8>>
where
    F: FnMut(&ObjectHeader, &[u8]) -> Option<Vec<u8>>,
{
    let header = if input.len() >= FILE_HEADER_SIZE && BigEndian::read_u32(input) == MAGIC {
        let header = FileHeader::from_bytes(input)?;
        if header.is_streaming() || header.is_compressed() || header.is_aligned() {
            return Err(Error::InvalidData(
                "object rewriting requires a flat uncompressed stream".into(),
            ));
        }
        Some(header)
    } else {
        None
    };

    let (start, end) = match &header {
        Some(h) => {
            let start = (h.data_offset.max(FILE_HEADER_SIZE as u64) as usize).min(input.len());
            let end = if h.total_size >= start as u64 && h.total_size <= input.len() as u64 {
                h.total_size as usize
            } else {
                input.len()
            };
            (start, end)
        }
        None => (0, input.len()),
    };

    let mut out = BinaryWriter::with_capacity(input.len() + input.len() / 4);
    out.write_bytes(&input[..start]);

    let mut reader = BinaryReader::new(&input[start..end]);
    while reader.remaining() >= OBJECT_HEADER_SIZE {
        let offset = start + reader.position();
        let (object, payload) = reader.read_object().map_err(|e| {
            Error::structure(format!("object at offset {} is truncated: {}", offset, e))
        })?;
        match transform(&object, payload) {
            Some(replacement) => {
                let data_size = u32::try_from(replacement.len()).map_err(|_| {
                    Error::InvalidData(format!(
                        "rewritten payload of {} bytes too large",
                        replacement.len()
                    ))
                })?;
                out.write_object_header(&ObjectHeader {
                    data_size,
                    ..object
                });
                out.write_bytes(&replacement);
            }
            None => {
                out.write_object_header(&object);
                out.write_bytes(payload);
            }
        }
    }
    // Trailing padding is carried over as-is
    out.write_bytes(&input[start + reader.position()..]);

    let mut bytes = out.into_inner();
    if let Some(mut h) = header {
        h.version = target;
        h.total_size = bytes.len() as u64;
        if h.has_checksum() || h.flags.contains(FormatFlags::CHECKSUM_PRESENT) {
            h.checksum = checksum(&bytes[start..]);
        }
        bytes[..FILE_HEADER_SIZE].copy_from_slice(&h.to_bytes());
    }
    Ok(bytes)
}

fn finish_step(
    from: Version,
    to: Version,
    rewritten: Result<Vec<u8>>,
    warning: Option<&str>,
) -> (Vec<u8>, MigrationResult) {
    match rewritten {
        Ok(bytes) => {
            let mut result = MigrationResult::success(from, to);
            if let Some(warning) = warning {
                result.add_warning(warning);
            }
            (bytes, result)
        }
        Err(e) => (Vec::new(), MigrationResult::failure(from, to, e.to_string())),
    }
}

/// 1.0 → 1.1: append `high_precision = false` to every Point2D.
pub fn migrate_1_0_to_1_1(data: &[u8]) -> (Vec<u8>, MigrationResult) {
    let rewritten = rewrite_objects(data, V1_1, |object, payload| {
        (object.type_id == TypeId::POINT2D && payload.len() == POINT2D_V1_0_SIZE).then(|| {
            let mut widened = payload.to_vec();
            widened.push(0);
            widened
        })
    });
    finish_step(V1_0, V1_1, rewritten, None)
}

/// 1.1 → 2.0: widen Color channels from `u8` to `f32` in `[0, 1]`.
pub fn migrate_1_1_to_2_0(data: &[u8]) -> (Vec<u8>, MigrationResult) {
    let rewritten = rewrite_objects(data, V2_0, |object, payload| {
        (object.type_id == TypeId::COLOR && payload.len() == COLOR_U8_SIZE).then(|| {
            payload
                .iter()
                .flat_map(|&channel| (channel as f32 / 255.0).to_ne_bytes())
                .collect()
        })
    });
    finish_step(
        V1_1,
        V2_0,
        rewritten,
        Some("Color precision changed from 8-bit integer to 32-bit float channels"),
    )
}

/// 1.1 → 1.0: drop the Point2D `high_precision` flag.
pub fn migrate_1_1_to_1_0(data: &[u8]) -> (Vec<u8>, MigrationResult) {
    let rewritten = rewrite_objects(data, V1_0, |object, payload| {
        (object.type_id == TypeId::POINT2D && payload.len() == POINT2D_V1_1_SIZE)
            .then(|| payload[..POINT2D_V1_0_SIZE].to_vec())
    });
    finish_step(
        V1_1,
        V1_0,
        rewritten,
        Some("Downgrade drops the Point2D high-precision flag"),
    )
}

/// Register the built-in migrations and the current-version handler.
pub fn register_standard_migrations(registry: &mut MigrationRegistry) {
    registry.register(V1_0, V1_1, migrate_1_0_to_1_1);
    registry.register(V1_1, V2_0, migrate_1_1_to_2_0);
    registry.register(V1_1, V1_0, migrate_1_1_to_1_0);
    registry.register_handler(Box::new(CurrentFormatHandler));
}

/// Changes introduced by `version`.
pub fn format_changes(version: Version) -> &'static [&'static str] {
    match (version.major, version.minor) {
        (1, 0) => &[
            "Initial binary format",
            "Fixed-size big-endian headers with explicit padding",
            "Optional chunked streaming with per-chunk compression",
            "CRC32 checksum over the data section",
        ],
        (1, 1) => &["Point2D gains a high-precision flag byte"],
        (2, 0) => &["Color channels stored as 32-bit floats"],
        _ => &[],
    }
}

const KNOWN_VERSIONS: [Version; 3] = [V1_0, V1_1, V2_0];

/// Human-readable summary of what changes between two versions.
pub fn migration_notes(from: Version, to: Version) -> String {
    let mut notes = String::new();
    if from == to {
        notes.push_str("No migration needed - same version");
        return notes;
    }

    if from < to {
        let _ = writeln!(notes, "Upgrading from {} to {}:", from, to);
        for version in KNOWN_VERSIONS.iter().filter(|v| **v > from && **v <= to) {
            for change in format_changes(*version) {
                let _ = writeln!(notes, "  {}: {}", version, change);
            }
        }
    } else {
        let _ = writeln!(
            notes,
            "Downgrading from {} to {}: features introduced after {} are dropped",
            from, to, to
        );
        for version in KNOWN_VERSIONS.iter().filter(|v| **v > to && **v <= from) {
            for change in format_changes(*version) {
                let _ = writeln!(notes, "  {}: {} (removed)", version, change);
            }
        }
    }
    notes
}
