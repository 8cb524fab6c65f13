//! Encode/decode engine.
//!
//! [`BinaryWriter`] is an append-only growable buffer; [`BinaryReader`] walks
//! a borrowed buffer with a bounds-checked cursor. Integers are big-endian,
//! floats are stored in host byte order (payloads written on one endianness
//! must be read on the same one).
//!
//! Alignment is only applied at documented boundaries. The flat and chunked
//! object streams produced here are never padded.

pub mod reader;
pub mod writer;

pub use reader::BinaryReader;
pub use writer::{BinaryWriter, ObjectMark};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ArrayHeader, ChunkHeader, CompressedDataHeader, FileHeader, ObjectHeader};
    use proptest::prelude::*;
    use vellum_core::TypeId;

    #[test]
    fn test_record_writers_match_readers() {
        let mut w = BinaryWriter::new();
        let file = FileHeader::new();
        let object = ObjectHeader::new(TypeId::LINE, 5, 16);
        let array = ArrayHeader::new(TypeId::COLOR, 4);
        let chunk = ChunkHeader {
            chunk_size: 10,
            object_count: 1,
            flags: 0,
            checksum: 99,
        };
        let compressed = CompressedDataHeader {
            uncompressed_size: 10,
            compressed_size: 4,
            kind: 1,
        };
        w.write_file_header(&file);
        w.write_object_header(&object);
        w.write_array_header(&array);
        w.write_chunk_header(&chunk);
        w.write_compressed_header(&compressed);

        let mut r = BinaryReader::new(w.as_slice());
        assert_eq!(r.read_file_header().unwrap(), file);
        assert_eq!(r.read_object_header().unwrap(), object);
        assert_eq!(r.read_array_header().unwrap(), array);
        assert_eq!(r.read_chunk_header().unwrap(), chunk);
        assert_eq!(r.read_compressed_header().unwrap(), compressed);
        assert!(r.is_eof());
    }

    #[test]
    fn test_padding_agrees() {
        let mut w = BinaryWriter::new();
        w.write_u8(1);
        w.align_to(8);
        w.write_u64(42);
        assert_eq!(w.len(), 16);

        let mut r = BinaryReader::new(w.as_slice());
        assert_eq!(r.read_u8().unwrap(), 1);
        r.skip_padding(8).unwrap();
        assert_eq!(r.read_u64().unwrap(), 42);
    }

    proptest! {
        #[test]
        fn prop_primitives_roundtrip(
            a in any::<u8>(),
            b in any::<u16>(),
            c in any::<u32>(),
            d in any::<u64>(),
            e in any::<i32>(),
            f in any::<i64>(),
            g in any::<f32>().prop_filter("nan", |v| !v.is_nan()),
            h in any::<f64>().prop_filter("nan", |v| !v.is_nan()),
            s in ".{0,40}",
        ) {
            let mut w = BinaryWriter::new();
            w.write_u8(a);
            w.write_u16(b);
            w.write_u32(c);
            w.write_u64(d);
            w.write_i32(e);
            w.write_i64(f);
            w.write_f32(g);
            w.write_f64(h);
            w.write_string(&s).unwrap();

            let mut r = BinaryReader::new(w.as_slice());
            prop_assert_eq!(r.read_u8().unwrap(), a);
            prop_assert_eq!(r.read_u16().unwrap(), b);
            prop_assert_eq!(r.read_u32().unwrap(), c);
            prop_assert_eq!(r.read_u64().unwrap(), d);
            prop_assert_eq!(r.read_i32().unwrap(), e);
            prop_assert_eq!(r.read_i64().unwrap(), f);
            prop_assert_eq!(r.read_f32().unwrap(), g);
            prop_assert_eq!(r.read_f64().unwrap(), h);
            prop_assert_eq!(r.read_string().unwrap(), s);
            prop_assert!(r.is_eof());
        }
    }
}
