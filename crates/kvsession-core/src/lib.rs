pub mod codec;
pub mod config;
pub mod error;
pub mod kv;
pub mod session;
pub mod store;

pub use codec::{Codec, KeyPair, SecureCookie};
pub use config::{BackendConfig, StoreConfig};
pub use error::{CodecError, ConfigError, KvError, Result, SessionError};
pub use kv::{KvClient, MemoryKvClient};
pub use session::{CookieOptions, Registry, SameSite, Session, SharedSession};
pub use store::SessionStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
