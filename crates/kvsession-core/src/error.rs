use std::path::PathBuf;

/// Errors surfaced by the session store.
///
/// Read-side variants (`CookieDecode`, `RecordMissing`, `StorageRead`,
/// `PayloadDecode`) never reach callers: they are logged and collapsed into a
/// fresh session before `SessionStore::new_session` returns.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Failed to decode session cookie: {0}")]
    CookieDecode(#[source] CodecError),

    #[error("Session record not found: {0}")]
    RecordMissing(String),

    #[error("Failed to read session: {0}")]
    StorageRead(String),

    #[error("Failed to decode session payload: {0}")]
    PayloadDecode(#[source] CodecError),

    #[error("Failed to encode session: {0}")]
    Encoding(#[source] CodecError),

    #[error("Failed to write session: {0}")]
    StorageWrite(String),

    #[error("Invalid Set-Cookie header: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures reported by a key-value backend.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Client is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("hash key is not set")]
    HashKeyNotSet,

    #[error("value is too long ({len} > {max} bytes)")]
    ValueTooLong { len: usize, max: usize },

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid value format")]
    InvalidFormat,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("the value is not valid")]
    MacInvalid,

    #[error("expired timestamp")]
    Expired,

    #[error("timestamp is too new")]
    TooNew,

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no codecs were provided")]
    NoCodecs,

    #[error("all codecs failed: {}", join_errors(.0))]
    Multi(Vec<CodecError>),
}

impl CodecError {
    /// True when the failure means "this token is not ours or is damaged",
    /// as opposed to a failure inside the codec itself.
    pub fn is_decode(&self) -> bool {
        match self {
            CodecError::Base64(_)
            | CodecError::InvalidFormat
            | CodecError::InvalidTimestamp
            | CodecError::MacInvalid
            | CodecError::Expired
            | CodecError::TooNew
            | CodecError::ValueTooLong { .. }
            | CodecError::Decrypt(_) => true,
            CodecError::Multi(errors) => errors.iter().all(CodecError::is_decode),
            _ => false,
        }
    }
}

fn join_errors(errors: &[CodecError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No key pairs configured")]
    NoKeyPairs,
}

pub type Result<T> = std::result::Result<T, SessionError>;
