//! Memory-mapped files.

use super::region::RegionStorage;
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;
use vellum_core::{Error, Result};

/// Read-only memory map of a whole file.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    // Zero-length files cannot be mapped.
    mmap: Option<Mmap>,
}

impl MappedFile {
    /// Map `path` read-only.
    pub fn open_for_read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and the mapping is only
            // exposed as `&[u8]`. Callers must not truncate the file while
            // it is mapped.
            Some(unsafe { Mmap::map(&file) }?)
        };
        Ok(MappedFile {
            path: path.to_path_buf(),
            mmap,
        })
    }

    /// Mapped bytes.
    pub fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Mapped length.
    pub fn size(&self) -> usize {
        self.data().len()
    }

    /// Path the map was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writable memory map of a file created at a fixed size.
#[derive(Debug)]
pub struct MappedFileMut {
    file: File,
    mmap: MmapMut,
}

impl MappedFileMut {
    /// Create (or truncate) `path`, size it to `size` bytes and map it.
    pub fn create_for_write(path: impl AsRef<Path>, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig("mapped file size must be non-zero".into()));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(size as u64)?;
        // SAFETY: The file was just created by us with the mapped length and
        // is owned by this value for the lifetime of the mapping.
        let mmap = unsafe { MmapMut::map_mut(&file) }?;
        debug!(path = %path.as_ref().display(), size, "Mapped file for write");
        Ok(MappedFileMut { file, mmap })
    }

    /// Mapped bytes.
    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    /// Mapped bytes, mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Mapped length.
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// Flush dirty pages to the file.
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Flush, unmap and truncate the file to `len` bytes.
    pub fn finish(self, len: usize) -> Result<()> {
        let MappedFileMut { file, mmap } = self;
        mmap.flush()?;
        drop(mmap);
        file.set_len(len as u64)?;
        file.sync_all()?;
        Ok(())
    }
}

impl RegionStorage for MappedFileMut {
    fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}
