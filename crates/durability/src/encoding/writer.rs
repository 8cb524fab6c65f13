//! Append-only binary writer.

use crate::format::{
    align_size, ArrayHeader, ChunkHeader, CompressedDataHeader, FileHeader, ObjectHeader,
    ObjectReference, OBJECT_HEADER_SIZE,
};
use bytemuck::Pod;
use rustc_hash::FxHashMap;
use std::path::Path;
use vellum_core::{Error, Result, TypeId};

/// Identity used by the object registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Identity {
    Address(usize),
    Handle(u64),
}

/// Position of an open object started with [`BinaryWriter::begin_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "pass the mark to end_object to patch the payload length"]
pub struct ObjectMark {
    header_offset: usize,
}

impl ObjectMark {
    /// Offset of the object header in the buffer.
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }
}

/// Growable buffer with big-endian integer writes and an object registry.
///
/// Writes to a `Vec<u8>` cannot fail, so primitive writers return nothing.
/// Back-patching validates offsets and returns `Result`.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
    ids: FxHashMap<Identity, u32>,
    next_id: u32,
}

impl BinaryWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        BinaryWriter {
            buf: Vec::with_capacity(capacity),
            ids: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current write position (same as `len`).
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer and return its buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Write a byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a big-endian u16.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian u64.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian i32.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian i64.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write an f32 in host byte order.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    /// Write an f64 in host byte order.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    /// Write a u32 length prefix followed by UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| Error::InvalidData(format!("string of {} bytes too long", value.len())))?;
        self.write_u32(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write the in-memory bytes of a plain-old-data value.
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(value));
    }

    /// Pad with zero bytes up to the next multiple of `alignment`.
    pub fn align_to(&mut self, alignment: usize) {
        let target = align_size(self.buf.len(), alignment);
        self.buf.resize(target, 0);
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Write a file header.
    pub fn write_file_header(&mut self, header: &FileHeader) {
        self.buf.extend_from_slice(&header.to_bytes());
    }

    /// Write an object header.
    pub fn write_object_header(&mut self, header: &ObjectHeader) {
        self.buf.extend_from_slice(&header.to_bytes());
    }

    /// Write an array header.
    pub fn write_array_header(&mut self, header: &ArrayHeader) {
        self.buf.extend_from_slice(&header.to_bytes());
    }

    /// Write a chunk header.
    pub fn write_chunk_header(&mut self, header: &ChunkHeader) {
        self.buf.extend_from_slice(&header.to_bytes());
    }

    /// Write a compressed-data header.
    pub fn write_compressed_header(&mut self, header: &CompressedDataHeader) {
        self.buf.extend_from_slice(&header.to_bytes());
    }

    /// Write an object reference.
    pub fn write_reference(&mut self, reference: &ObjectReference) {
        self.buf.extend_from_slice(&reference.to_bytes());
    }

    /// Write a complete object: header followed by `payload`.
    pub fn write_object(&mut self, type_id: TypeId, object_id: u32, payload: &[u8]) -> Result<()> {
        let data_size = u32::try_from(payload.len()).map_err(|_| {
            Error::InvalidData(format!("object payload of {} bytes too large", payload.len()))
        })?;
        self.write_object_header(&ObjectHeader::new(type_id, object_id, data_size));
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    /// Start an object whose payload length is not yet known.
    ///
    /// Writes a header with `data_size = 0`; [`end_object`](Self::end_object)
    /// back-patches the real length.
    pub fn begin_object(&mut self, type_id: TypeId, object_id: u32) -> ObjectMark {
        let header_offset = self.buf.len();
        self.write_object_header(&ObjectHeader::new(type_id, object_id, 0));
        ObjectMark { header_offset }
    }

    /// Finish an object started with `begin_object`; returns the payload length.
    pub fn end_object(&mut self, mark: ObjectMark) -> Result<u32> {
        let payload_start = mark.header_offset + OBJECT_HEADER_SIZE;
        if payload_start > self.buf.len() {
            return Err(Error::InvalidState(format!(
                "object mark at {} is past the end of the buffer",
                mark.header_offset
            )));
        }
        let len = self.buf.len() - payload_start;
        let data_size = u32::try_from(len)
            .map_err(|_| Error::InvalidData(format!("object payload of {} bytes too large", len)))?;
        self.patch_u32_at(mark.header_offset + 8, data_size)?;
        Ok(data_size)
    }

    // ------------------------------------------------------------------
    // Back-patching
    // ------------------------------------------------------------------

    /// Overwrite a big-endian u32 at `offset`.
    pub fn patch_u32_at(&mut self, offset: usize, value: u32) -> Result<()> {
        self.patch_bytes_at(offset, &value.to_be_bytes())
    }

    /// Overwrite bytes at `offset`; the range must already be written.
    pub fn patch_bytes_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::underflow(bytes.len(), self.buf.len().saturating_sub(offset)))?;
        self.buf[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Object registry
    // ------------------------------------------------------------------

    fn assign(&mut self, identity: Identity) -> u32 {
        if let Some(&id) = self.ids.get(&identity) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(identity, id);
        id
    }

    /// Id for an object identified by its address; assigned on first call.
    ///
    /// Two distinct live objects never share an address, but an object
    /// dropped and reallocated at the same address gets the old id.
    pub fn register_object<T>(&mut self, object: &T) -> u32 {
        self.assign(Identity::Address(object as *const T as usize))
    }

    /// Id for an object identified by a stable caller-provided handle.
    pub fn register_handle(&mut self, handle: u64) -> u32 {
        self.assign(Identity::Handle(handle))
    }

    /// Whether `object` has an id.
    pub fn is_registered<T>(&self, object: &T) -> bool {
        self.object_id(object).is_some()
    }

    /// Id of `object`, if registered.
    pub fn object_id<T>(&self, object: &T) -> Option<u32> {
        self.ids
            .get(&Identity::Address(object as *const T as usize))
            .copied()
    }

    /// Id of `handle`, if registered.
    pub fn handle_id(&self, handle: u64) -> Option<u32> {
        self.ids.get(&Identity::Handle(handle)).copied()
    }

    /// Drop all bytes and registry entries; ids restart at 1.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.ids.clear();
        self.next_id = 1;
    }

    /// Write the buffer to `path`, replacing any existing file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut w = BinaryWriter::new();
        w.write_u16(0x0102);
        w.write_u32(0x0304_0506);
        w.write_i32(-1);
        assert_eq!(w.as_slice(), &[1, 2, 3, 4, 5, 6, 0xFF, 0xFF, 0xFF, 0xFF]);

        let mut w = BinaryWriter::new();
        w.write_u64(0x0102_0304_0506_0708);
        w.write_i64(-2);
        assert_eq!(&w.as_slice()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&w.as_slice()[8..], &(-2i64).to_be_bytes());
        let mut r = crate::encoding::BinaryReader::new(w.as_slice());
        assert_eq!(r.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(r.read_i64().unwrap(), -2);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let mut w = BinaryWriter::new();
        w.write_string("abc").unwrap();
        assert_eq!(w.as_slice(), &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_begin_end_object_patches_size() {
        let mut w = BinaryWriter::new();
        let mark = w.begin_object(TypeId::GROUP, 3);
        w.write_f32(1.0);
        w.write_f32(2.0);
        w.write_u8(9);
        assert_eq!(w.end_object(mark).unwrap(), 9);

        let header = ObjectHeader::from_bytes(w.as_slice()).unwrap();
        assert_eq!(header.type_id, TypeId::GROUP);
        assert_eq!(header.object_id, 3);
        assert_eq!(header.data_size, 9);
    }

    #[test]
    fn test_patch_out_of_range() {
        let mut w = BinaryWriter::new();
        w.write_u16(0);
        assert!(w.patch_u32_at(0, 1).is_err());
        assert!(w.patch_bytes_at(usize::MAX, &[1]).is_err());
        assert!(w.patch_bytes_at(1, &[7]).is_ok());
        assert_eq!(w.as_slice(), &[0, 7]);
    }

    #[test]
    fn test_registry_reuses_ids() {
        let a = 10u32;
        let b = 20u32;
        let mut w = BinaryWriter::new();
        assert!(!w.is_registered(&a));
        assert_eq!(w.register_object(&a), 1);
        assert_eq!(w.register_object(&b), 2);
        assert_eq!(w.register_object(&a), 1);
        assert_eq!(w.object_id(&b), Some(2));
        assert_eq!(w.register_handle(500), 3);
        assert_eq!(w.register_handle(500), 3);
        assert_eq!(w.handle_id(500), Some(3));

        w.clear();
        assert!(w.is_empty());
        assert!(!w.is_registered(&a));
        assert_eq!(w.register_handle(9), 1);
    }

    #[test]
    fn test_align_to_pads_with_zeros() {
        let mut w = BinaryWriter::new();
        w.write_bytes(&[0xAA; 5]);
        w.align_to(4);
        assert_eq!(w.as_slice(), &[0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0, 0, 0]);
        w.align_to(4);
        assert_eq!(w.len(), 8);
    }
}
