//! Structured-state codec trait definitions.

/// How encoded state is compressed before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    /// Plain encoded bytes
    #[default]
    None,
    /// zstd frame at the given level
    Zstd(i32),
}

/// Structured-state codec.
///
/// Encodes and decodes the application's whole state object. The same
/// codec is used for the primary save file and for the reserved state
/// record inside a chunked backup, so a backup restores exactly what a
/// save would.
pub trait StateCodec: Send + Sync {
    /// Decoded state type
    type State;

    /// Decode state bytes (compressed or not).
    fn decode(&self, data: &[u8]) -> Result<Self::State, StateCodecError>;

    /// Encode state with the requested compression.
    fn encode(&self, state: &Self::State, mode: CompressionMode)
        -> Result<Vec<u8>, StateCodecError>;

    /// Unique codec identifier.
    fn codec_id(&self) -> &str;
}

/// State codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateCodecError {
    /// Decoding failed (corrupt, truncated or foreign data).
    ///
    /// Carries the codec identity and data length so callers can
    /// distinguish a wrong-codec error from data corruption.
    #[error("Decode error (codec={codec_id}, data_len={data_len}): {detail}")]
    DecodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the decode
        codec_id: String,
        /// Length of the data that failed to decode
        data_len: usize,
    },

    /// Encoding failed.
    #[error("Encode error (codec={codec_id}): {detail}")]
    EncodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the encode
        codec_id: String,
    },
}

impl StateCodecError {
    /// Create a decode error with full diagnostic context.
    pub fn decode(detail: impl Into<String>, codec_id: impl Into<String>, data_len: usize) -> Self {
        StateCodecError::DecodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
            data_len,
        }
    }

    /// Create an encode error.
    pub fn encode(detail: impl Into<String>, codec_id: impl Into<String>) -> Self {
        StateCodecError::EncodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
        }
    }
}
