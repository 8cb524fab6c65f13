//! Identity codec (no compression).

use super::traits::{CompressionStats, Compressor};
use std::time::Instant;
use vellum_core::{CompressionLevel, Result};

/// Codec that copies bytes unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityCodec;

impl Compressor for IdentityCodec {
    fn compress(
        &self,
        input: &[u8],
        _level: CompressionLevel,
    ) -> Result<(Vec<u8>, CompressionStats)> {
        let start = Instant::now();
        let output = input.to_vec();
        let stats = CompressionStats::new(input.len(), output.len(), start.elapsed());
        Ok((output, stats))
    }

    fn decompress(&self, input: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn max_compressed_size(&self, input_size: usize) -> usize {
        input_size
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_copies() {
        let data = b"hello, vector world";
        let (out, stats) = IdentityCodec.compress(data, CompressionLevel::Best).unwrap();
        assert_eq!(out, data);
        assert_eq!(stats.ratio, 1.0);
        assert_eq!(IdentityCodec.decompress(&out, 0).unwrap(), data);
        assert_eq!(IdentityCodec.max_compressed_size(19), 19);
    }
}
