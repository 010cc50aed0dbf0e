pub mod cookie;
pub mod id;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use self::cookie::SameSite;
pub use id::generate_session_id;
pub use registry::{Registry, SharedSession};

/// Attributes written on the session cookie.
///
/// `max_age` follows cookie semantics: zero is a browser-session cookie,
/// negative deletes the cookie immediately, positive expires after that many
/// seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: 86400 * 30,
            secure: false,
            http_only: true,
            same_site: Some(SameSite::Lax),
        }
    }
}

/// Server-side session state addressed by an opaque identifier.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    name: String,
    pub values: HashMap<String, serde_json::Value>,
    pub options: CookieOptions,
    pub is_new: bool,
}

impl Session {
    /// Empty session carrying its own copy of the store's cookie options.
    pub fn new(name: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            values: HashMap::new(),
            options,
            is_new: true,
        }
    }

    /// Storage key; empty until the first save.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cookie name this session is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Assign an identifier if none exists yet; returns the identifier.
    pub(crate) fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = generate_session_id();
        }
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Deserialize a stored value into `T`.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Serialize,
    ) -> Result<(), serde_json::Error> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    /// Clear all values.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
