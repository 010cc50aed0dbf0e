//! Authenticated encoding of cookie values and stored payloads.
//!
//! A codec turns bytes into a token that only holders of the same keys can
//! read back, and rejects tokens that were altered after encoding. Several
//! codecs are kept in priority order so keys can be rotated: the first codec
//! that succeeds encodes, and every codec is tried when decoding.

pub mod secure_cookie;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

pub use secure_cookie::SecureCookie;

/// Reversible, tamper-evident encoding bound to a cookie name.
pub trait Codec: Send + Sync {
    fn encode(&self, name: &str, payload: &[u8]) -> Result<String, CodecError>;

    fn decode(&self, name: &str, token: &str) -> Result<Vec<u8>, CodecError>;
}

impl<C: Codec + ?Sized> Codec for Box<C> {
    fn encode(&self, name: &str, payload: &[u8]) -> Result<String, CodecError> {
        (**self).encode(name, payload)
    }

    fn decode(&self, name: &str, token: &str) -> Result<Vec<u8>, CodecError> {
        (**self).decode(name, token)
    }
}

/// Authentication secret plus an optional encryption secret.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub hash_key: Vec<u8>,
    pub block_key: Option<Vec<u8>>,
}

impl KeyPair {
    pub fn new(hash_key: impl Into<Vec<u8>>, block_key: Option<Vec<u8>>) -> Self {
        Self {
            hash_key: hash_key.into(),
            block_key,
        }
    }

    /// Key pair that signs but does not encrypt.
    pub fn signing(hash_key: impl Into<Vec<u8>>) -> Self {
        Self::new(hash_key, None)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("hash_key", &"<redacted>")
            .field("block_key", &self.block_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Build one codec per key pair, preserving order.
pub fn codecs_from_pairs(pairs: &[KeyPair]) -> Vec<SecureCookie> {
    pairs.iter().map(SecureCookie::new).collect()
}

/// Serialize `value` and encode it with the first codec that succeeds.
pub fn encode_multi<T, C>(name: &str, value: &T, codecs: &[C]) -> Result<String, CodecError>
where
    T: Serialize + ?Sized,
    C: Codec,
{
    if codecs.is_empty() {
        return Err(CodecError::NoCodecs);
    }

    let payload = serde_json::to_vec(value)?;
    let mut errors = Vec::new();
    for codec in codecs {
        match codec.encode(name, &payload) {
            Ok(token) => return Ok(token),
            Err(e) => errors.push(e),
        }
    }
    Err(CodecError::Multi(errors))
}

/// Decode `token` with each codec in turn and deserialize the first match.
pub fn decode_multi<T, C>(name: &str, token: &str, codecs: &[C]) -> Result<T, CodecError>
where
    T: DeserializeOwned,
    C: Codec,
{
    if codecs.is_empty() {
        return Err(CodecError::NoCodecs);
    }

    let mut errors = Vec::new();
    for codec in codecs {
        let decoded = codec
            .decode(name, token)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(CodecError::from));
        match decoded {
            Ok(value) => return Ok(value),
            Err(e) => errors.push(e),
        }
    }
    Err(CodecError::Multi(errors))
}
