//! HMAC-SHA256 signed, optionally AES-256-GCM encrypted tokens.
//!
//! Token layout before the outer base64url step:
//!   `timestamp|base64url(value)|mac`
//! where `mac = HMAC-SHA256(hash_key, "name|timestamp|base64url(value)")` and
//! `value` is `nonce || ciphertext` when a block key is configured.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{Codec, KeyPair};
use crate::error::CodecError;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime: 30 days.
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

/// Browsers cap a single cookie at 4096 bytes.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

const NONCE_LEN: usize = 12;

pub struct SecureCookie {
    hash_key: Vec<u8>,
    block_key: Option<[u8; 32]>,
    min_age: i64,
    max_age: i64,
    max_length: usize,
}

impl SecureCookie {
    pub fn new(pair: &KeyPair) -> Self {
        Self {
            hash_key: pair.hash_key.clone(),
            block_key: pair.block_key.as_deref().map(derive_block_key),
            min_age: 0,
            max_age: DEFAULT_MAX_AGE,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    /// Reject tokens older than `seconds`. Zero disables the check.
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Reject tokens younger than `seconds`. Zero disables the check.
    pub fn with_min_age(mut self, seconds: i64) -> Self {
        self.min_age = seconds;
        self
    }

    /// Maximum encoded length. Zero disables the check.
    pub fn with_max_length(mut self, length: usize) -> Self {
        self.max_length = length;
        self
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn is_encrypting(&self) -> bool {
        self.block_key.is_some()
    }

    fn mac(&self, name: &str, timestamp: &[u8], value: &[u8]) -> Result<HmacSha256, CodecError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .map_err(|_| CodecError::HashKeyNotSet)?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp);
        mac.update(b"|");
        mac.update(value);
        Ok(mac)
    }

    pub(crate) fn encode_at(
        &self,
        name: &str,
        payload: &[u8],
        timestamp: i64,
    ) -> Result<String, CodecError> {
        if self.hash_key.is_empty() {
            return Err(CodecError::HashKeyNotSet);
        }

        let value = match &self.block_key {
            Some(key) => encrypt(key, payload)?,
            None => payload.to_vec(),
        };
        let value = URL_SAFE_NO_PAD.encode(value);
        let timestamp = timestamp.to_string();
        let mac = self
            .mac(name, timestamp.as_bytes(), value.as_bytes())?
            .finalize()
            .into_bytes();

        let mut raw = Vec::with_capacity(timestamp.len() + value.len() + mac.len() + 2);
        raw.extend_from_slice(timestamp.as_bytes());
        raw.push(b'|');
        raw.extend_from_slice(value.as_bytes());
        raw.push(b'|');
        raw.extend_from_slice(&mac);

        let token = URL_SAFE_NO_PAD.encode(raw);
        if self.max_length != 0 && token.len() > self.max_length {
            return Err(CodecError::ValueTooLong {
                len: token.len(),
                max: self.max_length,
            });
        }
        Ok(token)
    }

    pub(crate) fn decode_at(
        &self,
        name: &str,
        token: &str,
        now: i64,
    ) -> Result<Vec<u8>, CodecError> {
        if self.hash_key.is_empty() {
            return Err(CodecError::HashKeyNotSet);
        }
        if self.max_length != 0 && token.len() > self.max_length {
            return Err(CodecError::ValueTooLong {
                len: token.len(),
                max: self.max_length,
            });
        }

        let raw = URL_SAFE_NO_PAD.decode(token)?;
        // The MAC is raw bytes and may itself contain '|'
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(value), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::InvalidFormat);
        };

        self.mac(name, timestamp, value)?
            .verify_slice(mac)
            .map_err(|_| CodecError::MacInvalid)?;

        let issued: i64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::InvalidTimestamp)?;
        if self.min_age != 0 && issued > now.saturating_sub(self.min_age) {
            return Err(CodecError::TooNew);
        }
        if self.max_age != 0 && issued < now.saturating_sub(self.max_age) {
            return Err(CodecError::Expired);
        }

        let value = URL_SAFE_NO_PAD.decode(value)?;
        match &self.block_key {
            Some(key) => decrypt(key, &value),
            None => Ok(value),
        }
    }
}

impl Codec for SecureCookie {
    fn encode(&self, name: &str, payload: &[u8]) -> Result<String, CodecError> {
        self.encode_at(name, payload, chrono::Utc::now().timestamp())
    }

    fn decode(&self, name: &str, token: &str) -> Result<Vec<u8>, CodecError> {
        self.decode_at(name, token, chrono::Utc::now().timestamp())
    }
}

/// Stretch an arbitrary-length block secret into an AES-256 key.
fn derive_block_key(secret: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut okm = [0u8; 32];
    hk.expand(b"kvsession-block-key", &mut okm)
        .expect("HKDF expand should not fail for 32-byte output");
    okm
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    use aes_gcm::aead::OsRng;
    use aes_gcm::AeadCore;

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CodecError::Encrypt(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.len() < NONCE_LEN {
        return Err(CodecError::Decrypt(format!(
            "value must be at least {NONCE_LEN} bytes, got {}",
            data.len()
        )));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CodecError::Decrypt(e.to_string()))
}
