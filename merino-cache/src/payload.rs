//! The stored form of cached values.

use crate::CacheError;
use serde::{de::DeserializeOwned, Serialize};

/// A byte string prepended to all cached data to avoid format problems. Cache
/// entries with a different version will be treated as invalid.
const SERIALIZATION_VERSION: &[u8] = b"v1";

/// A value that can be written to and read back from a cache adapter.
///
/// Implemented for every serde type. The stored bytes are the serialization
/// version followed by the JSON form of the value.
pub trait CachePayload: Sized {
    /// Convert the value into bytes for storage.
    ///
    /// # Errors
    /// Fails if the value cannot be serialized.
    fn to_cache_bytes(&self) -> Result<Vec<u8>, CacheError>;

    /// Rebuild a value from stored bytes.
    ///
    /// # Errors
    /// Fails if the bytes carry a different version, or do not decode.
    fn from_cache_bytes(bytes: &[u8]) -> Result<Self, CacheError>;
}

impl<T> CachePayload for T
where
    T: Serialize + DeserializeOwned,
{
    fn to_cache_bytes(&self) -> Result<Vec<u8>, CacheError> {
        let mut output = SERIALIZATION_VERSION.to_vec();
        serde_json::to_writer(&mut output, self).map_err(CacheError::Serialization)?;
        Ok(output)
    }

    fn from_cache_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        let version_len = SERIALIZATION_VERSION.len();
        if bytes.len() < version_len || &bytes[..version_len] != SERIALIZATION_VERSION {
            let found = &bytes[..bytes.len().min(version_len)];
            return Err(CacheError::Format(format!(
                "Unexpected cache serialization version `{}`",
                String::from_utf8_lossy(found)
            )));
        }
        serde_json::from_slice(&bytes[version_len..]).map_err(CacheError::Serialization)
    }
}
