use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::KvClient;
use crate::error::KvError;

/// In-process backend. Data lives as long as the client.
#[derive(Default)]
pub struct MemoryKvClient {
    entries: DashMap<String, String>,
    closed: AtomicBool,
}

impl MemoryKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_open(&self) -> Result<(), KvError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check_open()?;
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.check_open()?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.check_open()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let kv = MemoryKvClient::new();
        assert_eq!(kv.get("a").await.unwrap(), None);

        kv.put("a", "1").await.unwrap();
        kv.put("a", "2").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(kv.len(), 1);

        assert!(kv.delete("a").await.unwrap());
        assert!(!kv.delete("a").await.unwrap());
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let kv = MemoryKvClient::new();
        kv.put("a", "1").await.unwrap();
        kv.close().await;

        assert!(matches!(kv.get("a").await, Err(KvError::Closed)));
        assert!(matches!(kv.put("a", "1").await, Err(KvError::Closed)));
        assert!(matches!(kv.delete("a").await, Err(KvError::Closed)));
    }
}
