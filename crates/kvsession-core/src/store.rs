use std::sync::Arc;

use http::{HeaderMap, Request};
use tracing::{debug, info, warn};

use crate::codec::{codecs_from_pairs, decode_multi, encode_multi, Codec, KeyPair};
use crate::config::StoreConfig;
use crate::error::{Result, SessionError};
use crate::kv::{self, KvClient};
use crate::session::cookie::{new_cookie, read_cookie, set_cookie};
use crate::session::{CookieOptions, Registry, Session, SharedSession};

/// Sessions kept in a key-value backend, addressed by an authenticated cookie.
///
/// The cookie carries only the encoded session identifier; the encoded values
/// live in the backend under that identifier. Read failures degrade to an
/// empty session, write failures are returned to the caller.
pub struct SessionStore {
    options: CookieOptions,
    codecs: Vec<Box<dyn Codec>>,
    kv: Arc<dyn KvClient>,
}

impl SessionStore {
    /// Build a store over an already connected client.
    ///
    /// Key pairs are in priority order: the first encodes, all are tried when
    /// decoding.
    pub fn new(kv: Arc<dyn KvClient>, path: &str, max_age: i64, key_pairs: &[KeyPair]) -> Self {
        let options = CookieOptions {
            path: path.to_string(),
            max_age,
            ..CookieOptions::default()
        };
        Self::with_codecs(kv, options, default_codecs(key_pairs, max_age, None))
    }

    /// Build a store with explicit cookie options and codecs.
    pub fn with_codecs(
        kv: Arc<dyn KvClient>,
        options: CookieOptions,
        codecs: Vec<Box<dyn Codec>>,
    ) -> Self {
        Self {
            options,
            codecs,
            kv,
        }
    }

    /// Connect to `backend` and build a store.
    pub async fn connect_with(
        backend: &crate::config::BackendConfig,
        path: &str,
        max_age: i64,
        key_pairs: &[KeyPair],
    ) -> Result<Self> {
        let kv = kv::connect(backend).await?;
        info!("Session store ready (path={}, max_age={})", path, max_age);
        Ok(Self::new(kv, path, max_age, key_pairs))
    }

    /// Connect using a full configuration document.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let key_pairs = config.key_pairs()?;
        let kv = kv::connect(&config.backend).await?;
        let codecs = default_codecs(&key_pairs, config.cookie.max_age, config.codec_max_age);
        info!(
            "Session store ready (path={}, max_age={}, keys={})",
            config.cookie.path,
            config.cookie.max_age,
            key_pairs.len()
        );
        Ok(Self::with_codecs(kv, config.cookie.clone(), codecs))
    }

    /// Default cookie options copied into every new session.
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Return the session registered under `name` for this request, loading it
    /// on first access.
    pub async fn get<B>(&self, request: &mut Request<B>, name: &str) -> SharedSession {
        let registry = Registry::from_extensions(request.extensions_mut());
        registry.get(self, request.headers(), name).await
    }

    /// Load the session named by the request cookie, or start a fresh one.
    ///
    /// Never fails: a missing, forged or expired cookie, a missing record or a
    /// backend error all yield a new empty session.
    pub async fn new_session(&self, headers: &HeaderMap, name: &str) -> Session {
        let mut session = Session::new(name, self.options.clone());

        let Some(cookie) = read_cookie(headers, name) else {
            return session;
        };

        let id: String = match decode_multi(name, &cookie, &self.codecs) {
            Ok(id) => id,
            Err(e) => {
                debug!("{}", SessionError::CookieDecode(e));
                return session;
            }
        };
        session.set_id(id);

        match self.load(&mut session).await {
            Ok(()) => session.is_new = false,
            // The identifier is authentic, so it may be reused on save
            Err(e @ SessionError::RecordMissing(_)) => {
                debug!("Starting empty session: {}", e);
            }
            Err(e @ SessionError::PayloadDecode(_)) => {
                warn!("Starting empty session: {}", e);
            }
            Err(e) => {
                // The record may still exist; never overwrite it with an empty one
                warn!("Starting empty session: {}", e);
                session.set_id(String::new());
            }
        }
        session
    }

    /// Persist the session values and attach the identifier cookie.
    ///
    /// A session with a negative max-age is destroyed instead.
    pub async fn save(&self, response: &mut HeaderMap, session: &mut Session) -> Result<()> {
        if session.options.max_age < 0 {
            return self.destroy(response, session).await;
        }

        let name = session.name().to_string();
        let id = session.ensure_id().to_string();

        let payload =
            encode_multi(&name, &session.values, &self.codecs).map_err(SessionError::Encoding)?;
        self.kv
            .put(&id, &payload)
            .await
            .map_err(|e| SessionError::StorageWrite(e.to_string()))?;

        let token = encode_multi(&name, &id, &self.codecs).map_err(SessionError::Encoding)?;
        set_cookie(response, &new_cookie(&name, &token, &session.options))?;
        Ok(())
    }

    /// Delete the backend record and expire the cookie.
    pub async fn destroy(&self, response: &mut HeaderMap, session: &mut Session) -> Result<()> {
        if !session.id().is_empty() {
            let existed = self
                .kv
                .delete(session.id())
                .await
                .map_err(|e| SessionError::StorageWrite(e.to_string()))?;
            debug!("Deleted session record (existed={})", existed);
        }

        session.options.max_age = -1;
        session.clear();
        session.set_id(String::new());
        set_cookie(response, &new_cookie(session.name(), "", &session.options))?;
        Ok(())
    }

    /// Release the backend client. The store must not be used afterwards.
    pub async fn close(&self) {
        self.kv.close().await;
        info!("Session store closed");
    }

    async fn load(&self, session: &mut Session) -> Result<()> {
        let data = self
            .kv
            .get(session.id())
            .await
            .map_err(|e| SessionError::StorageRead(e.to_string()))?
            .ok_or_else(|| SessionError::RecordMissing(session.id().to_string()))?;

        session.values =
            decode_multi(session.name(), &data, &self.codecs).map_err(SessionError::PayloadDecode)?;
        Ok(())
    }
}

/// Codecs for `key_pairs`, with token expiry tied to the cookie lifetime.
fn default_codecs(
    key_pairs: &[KeyPair],
    cookie_max_age: i64,
    codec_max_age: Option<i64>,
) -> Vec<Box<dyn Codec>> {
    let max_age = codec_max_age.or((cookie_max_age > 0).then_some(cookie_max_age));
    codecs_from_pairs(key_pairs)
        .into_iter()
        .map(|codec| match max_age {
            Some(age) => codec.with_max_age(age),
            None => codec,
        })
        .map(|codec| Box::new(codec) as Box<dyn Codec>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvClient;
    use http::header::{COOKIE, SET_COOKIE};
    use http::HeaderValue;

    fn store_with(kv: Arc<MemoryKvClient>, keys: &[&str]) -> SessionStore {
        let pairs: Vec<KeyPair> = keys
            .iter()
            .map(|k| KeyPair::signing(k.as_bytes().to_vec()))
            .collect();
        SessionStore::new(kv, "/", 3600, &pairs)
    }

    fn cookie_request(response: &HeaderMap) -> HeaderMap {
        let set_cookie = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_new_without_cookie() {
        let store = store_with(Arc::new(MemoryKvClient::new()), &["k1"]);
        let session = store.new_session(&HeaderMap::new(), "sid").await;
        assert!(session.is_new);
        assert!(session.id().is_empty());
        assert_eq!(session.options, *store.options());
    }

    #[tokio::test]
    async fn test_save_stores_record_under_cookie_id() {
        let kv = Arc::new(MemoryKvClient::new());
        let store = store_with(kv.clone(), &["k1"]);

        let mut session = store.new_session(&HeaderMap::new(), "sid").await;
        session.insert("user", "alice").unwrap();
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();

        assert_eq!(kv.len(), 1);
        let token = read_cookie(&cookie_request(&response), "sid").unwrap();
        let id: String = decode_multi("sid", &token, &store.codecs).unwrap();
        assert_eq!(id, session.id());
        assert_ne!(token, session.id());
        assert!(kv.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_id_kept_across_saves() {
        let kv = Arc::new(MemoryKvClient::new());
        let store = store_with(kv.clone(), &["k1"]);
        let mut session = store.new_session(&HeaderMap::new(), "sid").await;

        store.save(&mut HeaderMap::new(), &mut session).await.unwrap();
        let first = session.id().to_string();
        session.insert("n", 2).unwrap();
        store.save(&mut HeaderMap::new(), &mut session).await.unwrap();

        assert_eq!(session.id(), first);
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_keeps_id() {
        let kv = Arc::new(MemoryKvClient::new());
        let store = store_with(kv.clone(), &["k1"]);

        let mut session = store.new_session(&HeaderMap::new(), "sid").await;
        session.insert("user", "alice").unwrap();
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();
        let id = session.id().to_string();
        kv.put(&id, "not-a-token").await.unwrap();

        let request = cookie_request(&response);
        let mut loaded = store.new_session(&request, "sid").await;
        assert!(loaded.is_new);
        assert!(loaded.values.is_empty());
        assert_eq!(loaded.id(), id);

        loaded.insert("user", "bob").unwrap();
        store.save(&mut HeaderMap::new(), &mut loaded).await.unwrap();
        let reloaded = store.new_session(&request, "sid").await;
        assert_eq!(reloaded.get_as::<String>("user").as_deref(), Some("bob"));
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_negative_codec_max_age() {
        let config = StoreConfig {
            key_pairs: vec![crate::config::KeyPairConfig {
                hash_key: "00112233".to_string(),
                block_key: None,
            }],
            codec_max_age: Some(-5),
            ..StoreConfig::default()
        };
        assert!(matches!(
            SessionStore::connect(&config).await,
            Err(SessionError::Config(crate::error::ConfigError::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_save_with_huge_max_age() {
        let kv = Arc::new(MemoryKvClient::new());
        let store = SessionStore::new(
            kv.clone(),
            "/",
            1_000_000_000_000,
            &[KeyPair::signing(b"k1".to_vec())],
        );

        let mut session = store.new_session(&HeaderMap::new(), "sid").await;
        session.insert("n", 1).unwrap();
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();

        let loaded = store.new_session(&cookie_request(&response), "sid").await;
        assert!(!loaded.is_new);
        assert_eq!(loaded.get_as::<i32>("n"), Some(1));
    }

    #[tokio::test]
    async fn test_negative_max_age_destroys() {
        let kv = Arc::new(MemoryKvClient::new());
        let store = store_with(kv.clone(), &["k1"]);
        let mut session = store.new_session(&HeaderMap::new(), "sid").await;
        store.save(&mut HeaderMap::new(), &mut session).await.unwrap();
        assert_eq!(kv.len(), 1);

        session.options.max_age = -1;
        let mut response = HeaderMap::new();
        store.save(&mut response, &mut session).await.unwrap();

        assert!(kv.is_empty());
        assert!(session.id().is_empty());
        let set_cookie = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
    }
}
