//! Codec properties

use proptest::prelude::*;
use vellum_core::{CompressionKind, CompressionLevel, Error};
use vellum_durability::codec::{decode_block, encode_block, Codec, Compressor, RunLengthCodec};

proptest! {
    #[test]
    fn prop_block_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4096),
                             kind in prop_oneof![
                                 Just(CompressionKind::None),
                                 Just(CompressionKind::Fast),
                                 Just(CompressionKind::HighRatio),
                             ]) {
        let block = encode_block(kind, CompressionLevel::Default, &data).unwrap();
        let decoded = decode_block(&block, data.len()).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn prop_rle_within_bound(data in proptest::collection::vec(0u8..4, 0..2048)) {
        let codec = RunLengthCodec;
        let (compressed, stats) = codec.compress(&data, CompressionLevel::Fast).unwrap();
        prop_assert!(compressed.len() <= codec.max_compressed_size(data.len()));
        prop_assert_eq!(stats.original_size, data.len());
    }
}

#[test]
fn test_runs_compress() {
    let data = vec![7u8; 10_000];
    let (compressed, stats) = RunLengthCodec.compress(&data, CompressionLevel::Best).unwrap();
    assert!(compressed.len() < data.len() / 50);
    assert!(stats.ratio > 50.0);
}

#[test]
fn test_wrong_recorded_size_detected() {
    let mut block =
        encode_block(CompressionKind::Fast, CompressionLevel::Fast, &[1, 1, 2, 3]).unwrap();
    // Recorded uncompressed size is big-endian in the first four bytes
    block[3] = 5;
    assert!(matches!(
        decode_block(&block, 1024),
        Err(Error::DecompressionSizeMismatch {
            expected: 5,
            actual: 4
        })
    ));
}

#[test]
fn test_unknown_kind_rejected() {
    let mut block = encode_block(CompressionKind::None, CompressionLevel::None, &[9u8; 8]).unwrap();
    block[8] = 7;
    assert!(matches!(decode_block(&block, 1024), Err(Error::UnknownCompression(7))));
    assert!(matches!(Codec::for_wire(7), Err(Error::UnknownCompression(7))));
}

#[test]
fn test_decode_limit_enforced() {
    let block = encode_block(CompressionKind::Fast, CompressionLevel::Fast, &[0u8; 100]).unwrap();
    assert!(matches!(decode_block(&block, 99), Err(Error::InvalidData(_))));
}
