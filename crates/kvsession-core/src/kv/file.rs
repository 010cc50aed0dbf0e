use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::KvClient;
use crate::error::KvError;

/// File-based backend: one file per key inside a directory.
pub struct FileKvClient {
    dir: PathBuf,
    closed: AtomicBool,
}

impl FileKvClient {
    /// Open (and create if needed) the backing directory.
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            closed: AtomicBool::new(false),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("session_{}", safe_filename(key)))
    }

    /// Unique per write, so concurrent puts to one key never share a temp file.
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(
            "session_{}.{:016x}.tmp",
            safe_filename(key),
            rand::random::<u64>()
        ))
    }

    fn check_open(&self) -> Result<(), KvError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        Ok(())
    }
}

/// Convert a key to a safe filename.
fn safe_filename(name: &str) -> String {
    const UNSAFE: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '.'];
    name.chars()
        .map(|c| if UNSAFE.contains(&c) { '_' } else { c })
        .collect()
}

#[async_trait]
impl KvClient for FileKvClient {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check_open()?;
        match tokio::fs::read_to_string(self.entry_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.check_open()?;
        let path = self.entry_path(key);
        // Write-then-rename so readers never observe a partial record
        let tmp = self.temp_path(key);
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Wrote session record {}", path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.check_open()?;
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
