//! Run-length codec.
//!
//! Output is a sequence of `(count, value)` byte pairs, one per maximal run
//! of identical bytes, with runs capped at 255. Decoding ignores a trailing
//! count byte that has no value paired with it.

use super::traits::{CompressionStats, Compressor};
use std::time::Instant;
use vellum_core::{CompressionLevel, Result};

/// Longest run encoded by a single pair
const MAX_RUN: usize = u8::MAX as usize;

/// Byte-oriented run-length codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLengthCodec;

impl RunLengthCodec {
    fn encode(input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len().min(4096));
        let mut i = 0;
        while i < input.len() {
            let value = input[i];
            let mut run = 1;
            while i + run < input.len() && input[i + run] == value && run < MAX_RUN {
                run += 1;
            }
            out.push(run as u8);
            out.push(value);
            i += run;
        }
        out
    }

    fn decode(input: &[u8], expected_size: usize) -> Vec<u8> {
        // Never trust the hint beyond what the pairs can actually produce.
        let bound = (input.len() / 2).saturating_mul(MAX_RUN);
        let mut out = Vec::with_capacity(expected_size.min(bound));
        for pair in input.chunks_exact(2) {
            let (count, value) = (pair[0] as usize, pair[1]);
            out.resize(out.len() + count, value);
        }
        out
    }
}

impl Compressor for RunLengthCodec {
    fn compress(
        &self,
        input: &[u8],
        _level: CompressionLevel,
    ) -> Result<(Vec<u8>, CompressionStats)> {
        let start = Instant::now();
        let output = Self::encode(input);
        let stats = CompressionStats::new(input.len(), output.len(), start.elapsed());
        Ok((output, stats))
    }

    fn decompress(&self, input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        Ok(Self::decode(input, expected_size))
    }

    fn max_compressed_size(&self, input_size: usize) -> usize {
        input_size.saturating_mul(2)
    }

    fn name(&self) -> &'static str {
        "run-length"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        RunLengthCodec
            .compress(data, CompressionLevel::Default)
            .unwrap()
            .0
    }

    #[test]
    fn test_run_of_100_is_two_bytes() {
        let data = vec![0x41u8; 100];
        let out = compress(&data);
        assert_eq!(out, vec![100, 0x41]);
        let (_, stats) = RunLengthCodec
            .compress(&data, CompressionLevel::Default)
            .unwrap();
        assert_eq!(stats.ratio, 50.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(compress(&[]).is_empty());
        assert!(RunLengthCodec.decompress(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_runs_capped_at_255() {
        let data = vec![7u8; 600];
        let out = compress(&data);
        assert_eq!(out, vec![255, 7, 255, 7, 90, 7]);
        assert_eq!(RunLengthCodec.decompress(&out, 600).unwrap(), data);
    }

    #[test]
    fn test_trailing_count_byte_ignored() {
        let out = RunLengthCodec.decompress(&[3, 9, 5], 100).unwrap();
        assert_eq!(out, vec![9, 9, 9]);
    }

    #[test]
    fn test_alternating_bytes_hit_max_size() {
        let data: Vec<u8> = (0..64).map(|i| (i % 2) as u8).collect();
        let out = compress(&data);
        assert_eq!(out.len(), RunLengthCodec.max_compressed_size(data.len()));
    }

    #[test]
    fn test_oversized_hint_is_bounded() {
        let out = RunLengthCodec.decompress(&[2, 1], usize::MAX).unwrap();
        assert_eq!(out, vec![1, 1]);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let out = compress(&data);
            prop_assert_eq!(RunLengthCodec.decompress(&out, data.len()).unwrap(), data);
        }

        #[test]
        fn prop_max_size_bounds_output(data in proptest::collection::vec(0u8..4, 0..2048)) {
            let out = compress(&data);
            prop_assert!(out.len() <= RunLengthCodec.max_compressed_size(data.len()));
        }
    }
}
