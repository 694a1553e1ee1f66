//! JSON file storage implementation.
//!
//! Keeps every entry in one small JSON document (default
//! `.etabar/estimates.json`) alongside a version and `updated_at` marker.
//! Writes go to a sibling temp file which is then renamed over the original,
//! so a crash mid-write leaves the previous document intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Result, Storage};

const DOCUMENT_VERSION: u32 = 1;

/// On-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    version: u32,
    updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            updated_at: chrono::Utc::now(),
            entries: BTreeMap::new(),
        }
    }
}

/// File-based JSON storage backend.
pub struct JsonStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStorage {
    /// Default location relative to the working directory.
    pub const DEFAULT_PATH: &'static str = ".etabar/estimates.json";

    /// Open storage at `path`. Parent directories are created; the file
    /// itself is only written on the first `set`.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document> {
        match fs::read_to_string(&self.path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, mut doc: Document) -> Result<()> {
        doc.version = DOCUMENT_VERSION;
        doc.updated_at = chrono::Utc::now();
        let json = serde_json::to_string_pretty(&doc)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {} entries to {}", doc.entries.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        doc.entries.insert(key.to_string(), value.to_string());
        self.store(doc).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        if doc.entries.remove(key).is_none() {
            return Ok(());
        }
        self.store(doc).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.entries.into_keys().collect())
    }
}
