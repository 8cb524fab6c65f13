//! Zero-copy writer.

use super::mapped::MappedFileMut;
use super::region::{AlignedBuffer, MemoryRegion, RegionStorage};
use crate::format::{FileHeader, ObjectHeader, FILE_HEADER_SIZE, OBJECT_HEADER_SIZE};
use crate::validation::checksum;
use bytemuck::Pod;
use std::mem::{align_of, size_of};
use std::path::Path;
use tracing::debug;
use vellum_core::{Error, FormatFlags, Result, TypeId};

/// Header alignment for objects in a zero-copy file.
const OBJECT_ALIGN: usize = 4;

/// Lays values out in a [`MemoryRegion`] so they can be read back in place.
///
/// Values are aligned relative to the start of the file, so the output must
/// be read from an aligned base (a memory map or an [`AlignedBuffer`]) with
/// [`ZeroCopyReader`](super::ZeroCopyReader). Alignment padding means the
/// data section is not a plain object stream, so finalized headers carry
/// [`FormatFlags::ALIGNED`] and object-stream readers refuse the file.
#[derive(Debug)]
pub struct ZeroCopyWriter<S: RegionStorage = AlignedBuffer> {
    region: MemoryRegion<S>,
    object_count: u32,
}

impl ZeroCopyWriter<AlignedBuffer> {
    /// Writer over a heap region of `capacity` bytes (header included).
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_storage(AlignedBuffer::zeroed(capacity))
    }
}

impl ZeroCopyWriter<MappedFileMut> {
    /// Writer over a new memory-mapped file of `capacity` bytes.
    pub fn create(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        Self::with_storage(MappedFileMut::create_for_write(path, capacity)?)
    }

    /// Finalize, then flush and truncate the file to the bytes written.
    pub fn finish(mut self) -> Result<FileHeader> {
        let header = self.finalize()?;
        let used = self.region.used_bytes();
        self.region.into_storage().finish(used)?;
        Ok(header)
    }
}

impl<S: RegionStorage> ZeroCopyWriter<S> {
    /// Writer over existing storage; reserves the file header at offset 0.
    pub fn with_storage(storage: S) -> Result<Self> {
        let mut region = MemoryRegion::with_storage(storage);
        region
            .allocate_bytes(FILE_HEADER_SIZE)?
            .copy_from_slice(&FileHeader::new().to_bytes());
        Ok(ZeroCopyWriter {
            region,
            object_count: 0,
        })
    }

    /// Objects written with [`write_object`](Self::write_object).
    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// Bytes used so far, header included.
    pub fn len(&self) -> usize {
        self.region.used_bytes()
    }

    /// Whether nothing beyond the header has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == FILE_HEADER_SIZE
    }

    /// Bytes left in the region.
    pub fn remaining(&self) -> usize {
        self.region.remaining()
    }

    /// Append `value` at its natural alignment; returns its offset.
    pub fn write<T: Pod>(&mut self, value: &T) -> Result<usize> {
        self.write_aligned(bytemuck::bytes_of(value), align_of::<T>())
    }

    /// Append a contiguous slice; returns the offset of the first element.
    pub fn write_array<T: Pod>(&mut self, values: &[T]) -> Result<usize> {
        self.write_aligned(bytemuck::cast_slice(values), align_of::<T>())
    }

    /// Append raw bytes at the next multiple of `align`; returns the offset.
    pub fn write_aligned(&mut self, bytes: &[u8], align: usize) -> Result<usize> {
        if !align.is_power_of_two() {
            return Err(Error::InvalidData(format!(
                "alignment {} is not a power of two",
                align
            )));
        }
        let offset = self.region.allocate_offset(bytes.len(), align)?;
        self.region
            .span_mut(offset, bytes.len())?
            .copy_from_slice(bytes);
        Ok(offset)
    }

    /// Append an object header and a `Pod` payload; returns the payload offset.
    ///
    /// Padding goes before the header so the payload directly follows it
    /// at the alignment of `T`.
    pub fn write_object<T: Pod>(
        &mut self,
        type_id: TypeId,
        object_id: u32,
        value: &T,
    ) -> Result<usize> {
        let object_count = self
            .object_count
            .checked_add(1)
            .ok_or_else(|| Error::InvalidState("object count overflow".into()))?;
        let payload_align = align_of::<T>().max(OBJECT_ALIGN);
        let payload_at = payload_offset(self.region.used_bytes(), payload_align);
        let header_at = payload_at - OBJECT_HEADER_SIZE;
        let pad = header_at - self.region.used_bytes();

        let total = pad + OBJECT_HEADER_SIZE + size_of::<T>();
        let start = self.region.allocate_offset(total, 1)?;
        debug_assert_eq!(start + pad, header_at);

        let header = ObjectHeader::new(type_id, object_id, size_of::<T>() as u32);
        self.region
            .span_mut(header_at, OBJECT_HEADER_SIZE)?
            .copy_from_slice(&header.to_bytes());
        self.region
            .span_mut(payload_at, size_of::<T>())?
            .copy_from_slice(bytemuck::bytes_of(value));
        self.object_count = object_count;
        Ok(payload_at)
    }

    /// Typed view of a value written earlier.
    pub fn get<T: Pod>(&self, offset: usize) -> Result<&T> {
        self.region.get_at(offset)
    }

    /// Patch the header with counts, size and checksum.
    pub fn finalize(&mut self) -> Result<FileHeader> {
        let mut header = FileHeader::new();
        header.object_count = self.object_count;
        header.total_size = self.region.used_bytes() as u64;
        header.checksum = checksum(&self.region.as_slice()[FILE_HEADER_SIZE..]);
        header.flags.insert(FormatFlags::CHECKSUM_PRESENT | FormatFlags::ALIGNED);
        self.region
            .span_mut(0, FILE_HEADER_SIZE)?
            .copy_from_slice(&header.to_bytes());
        debug!(
            objects = header.object_count,
            bytes = header.total_size,
            "Zero-copy region finalized"
        );
        Ok(header)
    }

    /// Bytes written so far (header as last finalized).
    pub fn data(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Finalize and write the bytes to `path`.
    pub fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<FileHeader> {
        let header = self.finalize()?;
        std::fs::write(path.as_ref(), self.data())?;
        Ok(header)
    }

    /// Give back the region.
    pub fn into_region(self) -> MemoryRegion<S> {
        self.region
    }
}

/// First offset at or after `used + OBJECT_HEADER_SIZE` that is a multiple of `align`.
pub(crate) fn payload_offset(used: usize, align: usize) -> usize {
    let min = used + OBJECT_HEADER_SIZE;
    (min + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Circle {
        cx: f64,
        cy: f64,
        r: f64,
    }

    #[test]
    fn test_header_reserved() {
        let writer = ZeroCopyWriter::new(256).unwrap();
        assert_eq!(writer.len(), FILE_HEADER_SIZE);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_write_aligns_values() {
        let mut writer = ZeroCopyWriter::new(256).unwrap();
        let a = writer.write(&1u8).unwrap();
        let b = writer.write(&2u64).unwrap();
        assert_eq!(a, FILE_HEADER_SIZE);
        assert_eq!(b % 8, 0);
        assert_eq!(*writer.get::<u64>(b).unwrap(), 2);
    }

    #[test]
    fn test_write_object_payload_aligned() {
        let mut writer = ZeroCopyWriter::new(512).unwrap();
        writer.write(&0u8).unwrap();
        let circle = Circle { cx: 1.0, cy: 2.0, r: 3.0 };
        let at = writer.write_object(TypeId::CIRCLE, 5, &circle).unwrap();
        assert_eq!(at % 8, 0);
        assert_eq!(*writer.get::<Circle>(at).unwrap(), circle);

        let header = ObjectHeader::from_bytes(&writer.data()[at - OBJECT_HEADER_SIZE..]).unwrap();
        assert_eq!(header.type_id, TypeId::CIRCLE);
        assert_eq!(header.data_size as usize, size_of::<Circle>());
    }

    #[test]
    fn test_finalize_patches_header() {
        let mut writer = ZeroCopyWriter::new(512).unwrap();
        writer.write_object(TypeId::POINT2D, 1, &[1.0f32, 2.0f32]).unwrap();
        writer.write_array(&[1u32, 2, 3]).unwrap();
        let header = writer.finalize().unwrap();
        assert_eq!(header.object_count, 1);
        assert_eq!(header.total_size as usize, writer.len());
        assert_eq!(FileHeader::from_bytes(writer.data()).unwrap(), header);
        assert_eq!(header.checksum, checksum(&writer.data()[FILE_HEADER_SIZE..]));
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut writer = ZeroCopyWriter::new(FILE_HEADER_SIZE + 4).unwrap();
        writer.write(&1u32).unwrap();
        assert!(matches!(
            writer.write(&1u32),
            Err(Error::MemoryRegionExhausted { .. })
        ));
    }

    #[test]
    fn test_header_does_not_fit() {
        assert!(matches!(
            ZeroCopyWriter::new(10),
            Err(Error::MemoryRegionExhausted { .. })
        ));
    }

    #[test]
    fn test_bad_alignment_rejected() {
        let mut writer = ZeroCopyWriter::new(256).unwrap();
        assert!(matches!(
            writer.write_aligned(&[1, 2, 3], 3),
            Err(Error::InvalidData(_))
        ));
    }
}
