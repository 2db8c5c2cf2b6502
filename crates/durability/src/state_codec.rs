//! JSON state codec
//!
//! Encodes the application state as JSON, optionally wrapped in a zstd
//! frame. Decoding detects the frame magic, so compressed and plain saves
//! are read by the same codec.

use std::fmt;
use std::marker::PhantomData;

use keepsake_core::{CompressionMode, StateCodec, StateCodecError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Leading bytes of every zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

const CODEC_ID: &str = "json";

/// `serde_json` codec for any serializable state type.
pub struct JsonStateCodec<T> {
    _state: PhantomData<fn() -> T>,
}

impl<T> JsonStateCodec<T> {
    /// Create the codec.
    pub fn new() -> Self {
        JsonStateCodec {
            _state: PhantomData,
        }
    }
}

impl<T> Default for JsonStateCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonStateCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonStateCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonStateCodec")
    }
}

/// Whether `data` starts with a zstd frame.
pub fn is_zstd_frame(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}

impl<T> StateCodec for JsonStateCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type State = T;

    fn decode(&self, data: &[u8]) -> Result<T, StateCodecError> {
        if is_zstd_frame(data) {
            let plain = zstd::decode_all(data)
                .map_err(|e| StateCodecError::decode(e.to_string(), CODEC_ID, data.len()))?;
            return serde_json::from_slice(&plain)
                .map_err(|e| StateCodecError::decode(e.to_string(), CODEC_ID, data.len()));
        }
        serde_json::from_slice(data)
            .map_err(|e| StateCodecError::decode(e.to_string(), CODEC_ID, data.len()))
    }

    fn encode(&self, state: &T, mode: CompressionMode) -> Result<Vec<u8>, StateCodecError> {
        let json =
            serde_json::to_vec(state).map_err(|e| StateCodecError::encode(e.to_string(), CODEC_ID))?;
        match mode {
            CompressionMode::None => Ok(json),
            CompressionMode::Zstd(level) => zstd::encode_all(json.as_slice(), level)
                .map_err(|e| StateCodecError::encode(e.to_string(), CODEC_ID)),
        }
    }

    fn codec_id(&self) -> &str {
        CODEC_ID
    }
}
