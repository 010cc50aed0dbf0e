use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::KeyPair;
use crate::error::ConfigError;
use crate::session::CookieOptions;

/// Root configuration for a session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Cookie name used by the demo server and by `SessionStore::get` callers.
    pub session_name: String,
    pub cookie: CookieOptions,
    pub backend: BackendConfig,
    pub key_pairs: Vec<KeyPairConfig>,
    /// Token lifetime enforced by the codecs. Defaults to the cookie max-age
    /// when that is positive.
    pub codec_max_age: Option<i64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_name: "kvsession".to_string(),
            cookie: CookieOptions::default(),
            backend: BackendConfig::default(),
            key_pairs: Vec::new(),
            codec_max_age: None,
        }
    }
}

impl StoreConfig {
    /// Decode the configured secrets, newest first.
    pub fn key_pairs(&self) -> Result<Vec<KeyPair>, ConfigError> {
        if self.key_pairs.is_empty() {
            return Err(ConfigError::NoKeyPairs);
        }
        self.key_pairs.iter().map(KeyPairConfig::decode).collect()
    }

    /// Reject values that would make every issued token unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(age) = self.codec_max_age {
            if age < 0 {
                return Err(ConfigError::Invalid(format!(
                    "codecMaxAge must not be negative (got {age})"
                )));
            }
        }
        Ok(())
    }
}

/// Where session records live.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    File {
        dir: PathBuf,
    },
    Dynamo {
        table: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

/// Secrets are hex, or base64 with a `base64:` prefix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyPairConfig {
    pub hash_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_key: Option<String>,
}

impl KeyPairConfig {
    pub fn decode(&self) -> Result<KeyPair, ConfigError> {
        let hash_key = decode_secret(&self.hash_key)?;
        if hash_key.is_empty() {
            return Err(ConfigError::Invalid("hashKey must not be empty".to_string()));
        }
        let block_key = match self.block_key.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Some(decode_secret(s)?),
            _ => None,
        };
        Ok(KeyPair::new(hash_key, block_key))
    }
}

fn decode_secret(value: &str) -> Result<Vec<u8>, ConfigError> {
    let value = value.trim();
    if let Some(b64) = value.strip_prefix("base64:") {
        return base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| ConfigError::Invalid(format!("bad base64 secret: {e}")));
    }
    hex::decode(value).map_err(|e| ConfigError::Invalid(format!("bad hex secret: {e}")))
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kvsession")
        .join("config.json")
}

/// Load configuration from file or fall back to defaults.
pub fn load_config(config_path: Option<&Path>) -> StoreConfig {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<StoreConfig>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    StoreConfig::default()
}

/// Load configuration strictly from a file, surfacing every failure.
pub fn read_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

/// Load configuration from the environment.
///
/// `KVSESSION_CONFIG` holds the whole JSON document; otherwise the file
/// config is used and individual variables are layered on top.
pub fn load_config_from_env() -> StoreConfig {
    if let Ok(json) = std::env::var("KVSESSION_CONFIG") {
        match serde_json::from_str::<StoreConfig>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse KVSESSION_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg, |name| std::env::var(name).ok());
    cfg
}

fn apply_env_overrides(cfg: &mut StoreConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(hash_key) = var("KVSESSION_HASH_KEY") {
        // The env key becomes the primary pair; file keys stay for rotation
        cfg.key_pairs.insert(
            0,
            KeyPairConfig {
                hash_key,
                block_key: var("KVSESSION_BLOCK_KEY"),
            },
        );
    }
    if let Some(name) = var("KVSESSION_SESSION_NAME") {
        cfg.session_name = name;
    }
    if let Some(path) = var("KVSESSION_COOKIE_PATH") {
        cfg.cookie.path = path;
    }
    if let Some(max_age) = var("KVSESSION_MAX_AGE") {
        match max_age.trim().parse() {
            Ok(v) => cfg.cookie.max_age = v,
            Err(e) => tracing::warn!("Ignoring KVSESSION_MAX_AGE={}: {}", max_age, e),
        }
    }
    if let Some(table) = var("KVSESSION_DYNAMO_TABLE") {
        cfg.backend = BackendConfig::Dynamo {
            table,
            region: var("AWS_REGION"),
            endpoint: var("KVSESSION_DYNAMO_ENDPOINT"),
        };
    } else if let Some(dir) = var("KVSESSION_FILE_DIR") {
        cfg.backend = BackendConfig::File {
            dir: PathBuf::from(dir),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "sessionName": "app",
            "cookie": { "path": "/app", "maxAge": 3600, "secure": true, "sameSite": "strict" },
            "backend": { "type": "dynamo", "table": "sessions", "region": "ap-northeast-1" },
            "keyPairs": [
                { "hashKey": "00112233", "blockKey": "base64:c2VjcmV0" },
                { "hashKey": "44556677" }
            ]
        }"#;
        let cfg: StoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.session_name, "app");
        assert_eq!(cfg.cookie.path, "/app");
        assert_eq!(cfg.cookie.max_age, 3600);
        assert!(cfg.cookie.secure);
        // Unspecified cookie fields keep their defaults
        assert!(cfg.cookie.http_only);
        assert_eq!(
            cfg.backend,
            BackendConfig::Dynamo {
                table: "sessions".to_string(),
                region: Some("ap-northeast-1".to_string()),
                endpoint: None,
            }
        );

        let pairs = cfg.key_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].hash_key, vec![0x00, 0x11, 0x22, 0x33]);
        assert_eq!(pairs[0].block_key.as_deref(), Some(&b"secret"[..]));
        assert!(pairs[1].block_key.is_none());
    }

    #[test]
    fn test_default_config() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.session_name, "kvsession");
        assert_eq!(cfg.backend, BackendConfig::Memory);
        assert!(matches!(cfg.key_pairs(), Err(ConfigError::NoKeyPairs)));
    }

    #[test]
    fn test_negative_codec_max_age_rejected() {
        let mut cfg = StoreConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.codec_max_age = Some(0);
        assert!(cfg.validate().is_ok());

        for age in [-5, i64::MIN] {
            cfg.codec_max_age = Some(age);
            assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_bad_secret() {
        let pair = KeyPairConfig {
            hash_key: "not-hex".to_string(),
            block_key: None,
        };
        assert!(matches!(pair.decode(), Err(ConfigError::Invalid(_))));

        let empty = KeyPairConfig::default();
        assert!(matches!(empty.decode(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KVSESSION_HASH_KEY", "aabbcc"),
            ("KVSESSION_COOKIE_PATH", "/api"),
            ("KVSESSION_MAX_AGE", "120"),
            ("KVSESSION_FILE_DIR", "/tmp/sessions"),
        ]
        .into_iter()
        .collect();

        let mut cfg = StoreConfig {
            key_pairs: vec![KeyPairConfig {
                hash_key: "ddeeff".to_string(),
                block_key: None,
            }],
            ..StoreConfig::default()
        };
        apply_env_overrides(&mut cfg, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.cookie.path, "/api");
        assert_eq!(cfg.cookie.max_age, 120);
        assert_eq!(
            cfg.backend,
            BackendConfig::File {
                dir: PathBuf::from("/tmp/sessions")
            }
        );
        let pairs = cfg.key_pairs().unwrap();
        assert_eq!(pairs[0].hash_key, vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(pairs[1].hash_key, vec![0xdd, 0xee, 0xff]);
    }

    #[test]
    fn test_invalid_max_age_is_ignored() {
        let mut cfg = StoreConfig::default();
        apply_env_overrides(&mut cfg, |k| {
            (k == "KVSESSION_MAX_AGE").then(|| "soon".to_string())
        });
        assert_eq!(cfg.cookie.max_age, CookieOptions::default().max_age);
    }

    #[test]
    fn test_load_config_falls_back_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config(Some(&path)), StoreConfig::default());
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            read_config(&tmp.path().join("missing.json")),
            Err(ConfigError::NotFound(_))
        ));
    }
}
