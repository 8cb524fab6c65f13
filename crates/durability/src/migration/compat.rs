//! Per-version format handlers and the migrating reader.

use super::registry::MigrationRegistry;
use super::MigrationResult;
use crate::encoding::{BinaryReader, BinaryWriter};
use crate::format::{FileHeader, ObjectHeader, CURRENT_VERSION, MAGIC};
use std::path::Path;
use tracing::info;
use vellum_core::{Error, Result, TypeId, Version};

/// Reads and writes objects in the layout of one format version.
pub trait FormatHandler: Send + Sync {
    /// Version this handler implements.
    fn version(&self) -> Version;

    /// Whether files of `version` can be read without migration.
    ///
    /// Defaults to the same major and an equal or older minor.
    fn can_read_from(&self, version: Version) -> bool {
        let own = self.version();
        version.major == own.major && version.minor <= own.minor
    }

    /// Read the next object.
    fn read_object<'a>(&self, reader: &mut BinaryReader<'a>) -> Result<(ObjectHeader, &'a [u8])>;

    /// Write one object.
    fn write_object(
        &self,
        writer: &mut BinaryWriter,
        type_id: TypeId,
        object_id: u32,
        payload: &[u8],
    ) -> Result<()>;
}

/// Handler for [`CURRENT_VERSION`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentFormatHandler;

impl FormatHandler for CurrentFormatHandler {
    fn version(&self) -> Version {
        CURRENT_VERSION
    }

    fn read_object<'a>(&self, reader: &mut BinaryReader<'a>) -> Result<(ObjectHeader, &'a [u8])> {
        reader.read_object()
    }

    fn write_object(
        &self,
        writer: &mut BinaryWriter,
        type_id: TypeId,
        object_id: u32,
        payload: &[u8],
    ) -> Result<()> {
        writer.write_object(type_id, object_id, payload)
    }
}

/// Read a file and migrate it to [`CURRENT_VERSION`] when needed.
///
/// Files the current handler can read directly are returned unchanged. A
/// newer major with no registered path fails with `UnsupportedVersion`.
pub fn read_current(
    path: impl AsRef<Path>,
    registry: &MigrationRegistry,
) -> Result<(Vec<u8>, MigrationResult)> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let header = FileHeader::from_bytes(&bytes)?;
    if header.magic != MAGIC {
        return Err(Error::InvalidMagic {
            found: header.magic,
        });
    }

    let version = header.version;
    let readable = version == CURRENT_VERSION
        || registry
            .handler(CURRENT_VERSION)
            .map_or(false, |h| h.can_read_from(version));
    if readable {
        let mut result = MigrationResult::success(version, CURRENT_VERSION);
        result.add_message("No migration needed");
        return Ok((bytes, result));
    }

    match registry.migrate_or_err(version, CURRENT_VERSION, &bytes) {
        Err(Error::NoMigrationPath { .. }) if version.major > CURRENT_VERSION.major => {
            Err(Error::UnsupportedVersion {
                found: version,
                current: CURRENT_VERSION,
            })
        }
        Ok((data, result)) => {
            info!(
                path = %path.display(),
                from = %version,
                to = %CURRENT_VERSION,
                "File migrated on read"
            );
            Ok((data, result))
        }
        Err(e) => Err(e),
    }
}
