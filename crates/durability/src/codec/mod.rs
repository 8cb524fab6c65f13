//! Compression codecs.
//!
//! The codec set is closed: [`Codec`] is a sum type over the implemented
//! codecs and dispatches through the [`Compressor`] trait. The speed- and
//! ratio-priority kinds both resolve to the run-length codec until real
//! codecs are substituted; callers always go through [`Codec::for_kind`].
//!
//! Compressed blocks are framed as a [`CompressedDataHeader`] followed by the
//! compressed bytes (see [`encode_block`] / [`decode_block`]).

pub mod identity;
pub mod rle;
pub mod traits;

pub use identity::IdentityCodec;
pub use rle::RunLengthCodec;
pub use traits::{CompressionStats, Compressor};

use crate::format::{CompressedDataHeader, COMPRESSED_DATA_HEADER_SIZE};
use tracing::debug;
use vellum_core::{CompressionKind, CompressionLevel, Error, Result, MIN_COMPRESSION_INPUT};

/// Closed set of codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// No compression
    Identity(IdentityCodec),
    /// Run-length encoding
    RunLength(RunLengthCodec),
}

impl Codec {
    /// Codec used for `kind`.
    pub fn for_kind(kind: CompressionKind) -> Self {
        match kind {
            CompressionKind::None => Codec::Identity(IdentityCodec),
            CompressionKind::Fast | CompressionKind::HighRatio => Codec::RunLength(RunLengthCodec),
        }
    }

    /// Codec for a raw compression byte read from disk.
    pub fn for_wire(kind: u8) -> Result<Self> {
        CompressionKind::from_u8(kind)
            .map(Self::for_kind)
            .ok_or(Error::UnknownCompression(kind))
    }

    /// Whether this codec leaves bytes unchanged.
    pub fn is_identity(&self) -> bool {
        matches!(self, Codec::Identity(_))
    }

    fn inner(&self) -> &dyn Compressor {
        match self {
            Codec::Identity(c) => c as &dyn Compressor,
            Codec::RunLength(c) => c as &dyn Compressor,
        }
    }
}

impl Compressor for Codec {
    fn compress(
        &self,
        input: &[u8],
        level: CompressionLevel,
    ) -> Result<(Vec<u8>, CompressionStats)> {
        self.inner().compress(input, level)
    }

    fn decompress(&self, input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        self.inner().decompress(input, expected_size)
    }

    fn max_compressed_size(&self, input_size: usize) -> usize {
        self.inner().max_compressed_size(input_size)
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn is_available(&self) -> bool {
        self.inner().is_available()
    }
}

/// Pick a compression kind for a payload of `size` bytes.
///
/// Inputs below [`MIN_COMPRESSION_INPUT`] are stored as-is.
pub fn recommended_kind(size: usize, speed_priority: bool) -> CompressionKind {
    if size < MIN_COMPRESSION_INPUT {
        CompressionKind::None
    } else if speed_priority {
        CompressionKind::Fast
    } else {
        CompressionKind::HighRatio
    }
}

/// Compress `data` into a framed block: header followed by compressed bytes.
pub fn encode_block(
    kind: CompressionKind,
    level: CompressionLevel,
    data: &[u8],
) -> Result<Vec<u8>> {
    let uncompressed_size = u32::try_from(data.len()).map_err(|_| {
        Error::CompressionFailure(format!("block of {} bytes exceeds u32 range", data.len()))
    })?;
    let codec = Codec::for_kind(kind);
    let (compressed, stats) = codec.compress(data, level)?;
    let compressed_size = u32::try_from(compressed.len()).map_err(|_| {
        Error::CompressionFailure(format!(
            "compressed block of {} bytes exceeds u32 range",
            compressed.len()
        ))
    })?;

    let header = CompressedDataHeader {
        uncompressed_size,
        compressed_size,
        kind: kind.as_u8(),
    };
    let mut block = Vec::with_capacity(COMPRESSED_DATA_HEADER_SIZE + compressed.len());
    block.extend_from_slice(&header.to_bytes());
    block.extend_from_slice(&compressed);

    debug!(
        codec = codec.name(),
        original = stats.original_size,
        compressed = stats.compressed_size,
        ratio = stats.ratio,
        "Encoded block"
    );
    Ok(block)
}

/// Decode a framed block produced by [`encode_block`].
///
/// Fails when the recorded uncompressed size exceeds `max_uncompressed`,
/// when the block is truncated, or when the codec produces a different
/// length than recorded.
pub fn decode_block(block: &[u8], max_uncompressed: usize) -> Result<Vec<u8>> {
    let header = CompressedDataHeader::from_bytes(block)?;
    let body = &block[COMPRESSED_DATA_HEADER_SIZE..];
    let compressed_size = header.compressed_size as usize;
    if compressed_size > body.len() {
        return Err(Error::structure(format!(
            "compressed block declares {} bytes but only {} remain",
            compressed_size,
            body.len()
        )));
    }
    let expected = header.uncompressed_size as usize;
    if expected > max_uncompressed {
        return Err(Error::InvalidData(format!(
            "block decompresses to {} bytes, limit is {}",
            expected, max_uncompressed
        )));
    }

    let codec = Codec::for_wire(header.kind)?;
    let out = codec.decompress(&body[..compressed_size], expected)?;
    if out.len() != expected {
        return Err(Error::DecompressionSizeMismatch {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_mapping() {
        assert!(Codec::for_kind(CompressionKind::None).is_identity());
        assert_eq!(
            Codec::for_kind(CompressionKind::Fast),
            Codec::RunLength(RunLengthCodec)
        );
        assert_eq!(
            Codec::for_kind(CompressionKind::HighRatio),
            Codec::RunLength(RunLengthCodec)
        );
    }

    #[test]
    fn test_for_wire_rejects_unknown() {
        assert!(matches!(
            Codec::for_wire(7),
            Err(Error::UnknownCompression(7))
        ));
        assert!(Codec::for_wire(0).unwrap().is_identity());
    }

    #[test]
    fn test_recommended_kind() {
        assert_eq!(recommended_kind(100, true), CompressionKind::None);
        assert_eq!(recommended_kind(1023, false), CompressionKind::None);
        assert_eq!(recommended_kind(1024, true), CompressionKind::Fast);
        assert_eq!(recommended_kind(1 << 20, false), CompressionKind::HighRatio);
    }

    #[test]
    fn test_block_roundtrip() {
        let data: Vec<u8> = std::iter::repeat(3u8)
            .take(500)
            .chain(0..200u8)
            .collect();
        let block = encode_block(CompressionKind::Fast, CompressionLevel::Fast, &data).unwrap();
        assert_eq!(decode_block(&block, usize::MAX).unwrap(), data);
    }

    #[test]
    fn test_block_size_mismatch_detected() {
        let data = vec![1u8; 64];
        let mut block =
            encode_block(CompressionKind::HighRatio, CompressionLevel::Default, &data).unwrap();
        // Claim one byte more than the pairs produce
        block[3] = 65;
        assert!(matches!(
            decode_block(&block, usize::MAX),
            Err(Error::DecompressionSizeMismatch {
                expected: 65,
                actual: 64
            })
        ));
    }

    #[test]
    fn test_block_truncated() {
        let block =
            encode_block(CompressionKind::Fast, CompressionLevel::Default, b"abcabc").unwrap();
        let err = decode_block(&block[..block.len() - 1], usize::MAX).unwrap_err();
        assert!(matches!(err, Error::StructureMismatch(_)));
    }

    #[test]
    fn test_block_limit_enforced() {
        let block =
            encode_block(CompressionKind::Fast, CompressionLevel::Default, &[0u8; 4096]).unwrap();
        assert!(matches!(
            decode_block(&block, 1024),
            Err(Error::InvalidData(_))
        ));
    }
}
