//! Compression codec applied to a sealed record set's framed bytes.

use bytes::Bytes;

/// Codec baked into a writer at construction time; applied uniformly to every
/// sealed record set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    /// Pass framed bytes through unmodified.
    #[default]
    None,
    /// LZ4 block compression via `lz4_flex`.
    #[cfg(feature = "lz4")]
    Lz4,
}

impl CompressionCodec {
    pub(crate) fn compress(&self, framed: &[u8]) -> Bytes {
        match self {
            CompressionCodec::None => Bytes::copy_from_slice(framed),
            #[cfg(feature = "lz4")]
            CompressionCodec::Lz4 => Bytes::from(lz4_flex::compress_prepend_size(framed)),
        }
    }

    /// Decompress is exposed for wire-client implementations and test doubles
    /// that need to round-trip a payload (e.g. to log record counts); the
    /// writer itself never decompresses its own output.
    #[allow(dead_code)]
    pub(crate) fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>, String> {
        match self {
            CompressionCodec::None => Ok(payload.to_vec()),
            #[cfg(feature = "lz4")]
            CompressionCodec::Lz4 => lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| format!("lz4 decompress failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_codec_passes_through() {
        let codec = CompressionCodec::None;
        let framed = b"hello world";
        let out = codec.compress(framed);
        assert_eq!(out.as_ref(), framed);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn lz4_round_trips() {
        let codec = CompressionCodec::Lz4;
        let framed = b"hello hello hello hello world world world";
        let compressed = codec.compress(framed);
        let decompressed = codec.decompress(&compressed).unwrap();
        assert_eq!(decompressed, framed);
    }
}
