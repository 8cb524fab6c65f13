//! Compression codec trait definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vellum_core::{CompressionLevel, Result};

/// Compression codec trait.
///
/// Every compressed block in a file passes through a codec. The set of codecs
/// is closed (see [`Codec`](super::Codec)), but the trait keeps the call
/// shape stable so a real speed- or ratio-priority codec can replace the
/// current fallback without touching callers.
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync`; they hold no state between calls.
pub trait Compressor: Send + Sync {
    /// Compress `input` and report statistics for the call.
    fn compress(&self, input: &[u8], level: CompressionLevel)
        -> Result<(Vec<u8>, CompressionStats)>;

    /// Decompress `input`.
    ///
    /// `expected_size` is a capacity hint; callers that need an exact length
    /// check it themselves (see [`decode_block`](super::decode_block)).
    fn decompress(&self, input: &[u8], expected_size: usize) -> Result<Vec<u8>>;

    /// Upper bound on the compressed size of an `input_size`-byte input.
    fn max_compressed_size(&self, input_size: usize) -> usize;

    /// Codec name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the codec can be used in this build.
    fn is_available(&self) -> bool {
        true
    }
}

/// Statistics for a single compress call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Input length
    pub original_size: usize,
    /// Output length
    pub compressed_size: usize,
    /// `original_size / compressed_size`; 1.0 for empty input
    pub ratio: f64,
    /// Compression throughput in MB/s
    pub compression_mbps: f64,
    /// Decompression throughput in MB/s (0 until measured)
    pub decompression_mbps: f64,
}

impl CompressionStats {
    /// Build stats from sizes and the time the call took.
    pub fn new(original_size: usize, compressed_size: usize, elapsed: Duration) -> Self {
        let ratio = if original_size == 0 || compressed_size == 0 {
            1.0
        } else {
            original_size as f64 / compressed_size as f64
        };
        CompressionStats {
            original_size,
            compressed_size,
            ratio,
            compression_mbps: throughput_mbps(original_size, elapsed),
            decompression_mbps: 0.0,
        }
    }

    /// Record decompression throughput for `elapsed`.
    pub fn with_decompression_time(mut self, elapsed: Duration) -> Self {
        self.decompression_mbps = throughput_mbps(self.original_size, elapsed);
        self
    }

    /// Fraction of space saved, in `[0, 1)` when the codec helped.
    pub fn space_savings(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        1.0 - self.compressed_size as f64 / self.original_size as f64
    }
}

fn throughput_mbps(bytes: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / (1024.0 * 1024.0) / secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{IdentityCodec, RunLengthCodec};

    // Test that trait is object-safe
    fn _accepts_box_dyn_compressor(_codec: Box<dyn Compressor>) {}

    #[test]
    fn test_compressor_trait_object_safe() {
        let codecs: Vec<Box<dyn Compressor>> =
            vec![Box::new(IdentityCodec), Box::new(RunLengthCodec)];
        for codec in codecs {
            let data = b"aaaabbbbcccc";
            let (compressed, _) = codec.compress(data, CompressionLevel::Default).unwrap();
            let restored = codec.decompress(&compressed, data.len()).unwrap();
            assert_eq!(restored, data, "codec {}", codec.name());
            assert!(codec.is_available());
        }
    }

    #[test]
    fn test_stats_ratio() {
        let stats = CompressionStats::new(100, 2, Duration::from_millis(1));
        assert_eq!(stats.ratio, 50.0);
        assert!((stats.space_savings() - 0.98).abs() < 1e-9);
        assert!(stats.compression_mbps > 0.0);
    }

    #[test]
    fn test_stats_empty_input() {
        let stats = CompressionStats::new(0, 0, Duration::ZERO);
        assert_eq!(stats.ratio, 1.0);
        assert_eq!(stats.compression_mbps, 0.0);
        assert_eq!(stats.space_savings(), 0.0);
    }
}
