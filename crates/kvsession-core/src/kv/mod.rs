pub mod memory;

#[cfg(feature = "file-backend")]
pub mod file;

#[cfg(feature = "dynamodb-backend")]
pub mod dynamo;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::BackendConfig;
use crate::error::{KvError, SessionError};

pub use memory::MemoryKvClient;

#[cfg(feature = "file-backend")]
pub use file::FileKvClient;

#[cfg(feature = "dynamodb-backend")]
pub use dynamo::DynamoKvClient;

/// Key-value backend holding encoded session payloads.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Fetch a value. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Store a value, replacing any previous one.
    async fn put(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Release backend resources. Later calls fail with `KvError::Closed`.
    async fn close(&self);
}

/// Build a client for the configured backend.
///
/// Only local validation happens here; reachability of remote backends is
/// discovered on first use.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn KvClient>, SessionError> {
    match config {
        BackendConfig::Memory => {
            info!("Using in-memory session backend");
            Ok(Arc::new(MemoryKvClient::new()))
        }
        BackendConfig::File { dir } => connect_file(dir),
        BackendConfig::Dynamo {
            table,
            region,
            endpoint,
        } => connect_dynamo(table, region.as_deref(), endpoint.as_deref()).await,
    }
}

#[cfg(feature = "file-backend")]
fn connect_file(dir: &std::path::Path) -> Result<Arc<dyn KvClient>, SessionError> {
    let client = FileKvClient::new(dir)
        .map_err(|e| SessionError::Connection(format!("{}: {}", dir.display(), e)))?;
    info!("Using file session backend at {}", dir.display());
    Ok(Arc::new(client))
}

#[cfg(not(feature = "file-backend"))]
fn connect_file(_dir: &std::path::Path) -> Result<Arc<dyn KvClient>, SessionError> {
    Err(SessionError::Connection(
        "file backend requires the `file-backend` feature".to_string(),
    ))
}

#[cfg(feature = "dynamodb-backend")]
async fn connect_dynamo(
    table: &str,
    region: Option<&str>,
    endpoint: Option<&str>,
) -> Result<Arc<dyn KvClient>, SessionError> {
    if table.trim().is_empty() {
        return Err(SessionError::Connection(
            "DynamoDB table name is empty".to_string(),
        ));
    }

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;
    let client = aws_sdk_dynamodb::Client::new(&aws_config);

    info!("Using DynamoDB session backend, table={}", table);
    Ok(Arc::new(DynamoKvClient::new(client, table.to_string())))
}

#[cfg(not(feature = "dynamodb-backend"))]
async fn connect_dynamo(
    _table: &str,
    _region: Option<&str>,
    _endpoint: Option<&str>,
) -> Result<Arc<dyn KvClient>, SessionError> {
    Err(SessionError::Connection(
        "DynamoDB backend requires the `dynamodb-backend` feature".to_string(),
    ))
}
