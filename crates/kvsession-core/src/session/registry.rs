//! Per-request session cache.
//!
//! Every lookup by name within one request must see the same mutable
//! session, so the registry lives in the request's extensions and hands out
//! shared handles.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Extensions, HeaderMap};
use tokio::sync::Mutex;
use tracing::warn;

use super::Session;
use crate::error::Result;
use crate::store::SessionStore;

/// Shared handle to a request's session.
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<Mutex<HashMap<String, SharedSession>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the registry stored in `extensions`, inserting an empty one.
    pub fn from_extensions(extensions: &mut Extensions) -> Self {
        if let Some(registry) = extensions.get::<Registry>() {
            return registry.clone();
        }
        let registry = Registry::new();
        extensions.insert(registry.clone());
        registry
    }

    /// Return the session for `name`, loading it through `store` on first use.
    pub async fn get(&self, store: &SessionStore, headers: &HeaderMap, name: &str) -> SharedSession {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(name) {
            return session.clone();
        }
        let session = Arc::new(Mutex::new(store.new_session(headers, name).await));
        sessions.insert(name.to_string(), session.clone());
        session
    }

    /// Save every registered session, attaching their cookies to `response`.
    ///
    /// All sessions are attempted; the first failure is returned.
    pub async fn save_all(&self, store: &SessionStore, response: &mut HeaderMap) -> Result<()> {
        let sessions = self.sessions.lock().await;
        let mut first_err = None;
        for (name, session) in sessions.iter() {
            let mut session = session.lock().await;
            if let Err(e) = store.save(response, &mut session).await {
                warn!("Failed to save session {}: {}", name, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
