//! Persistence collaborators: the event request store and the raw intake
//! payload archive.
//!
//! The reconciliation engine only ever sees `RequestStore` — one snapshot per
//! sync pass, plus create/update. Implementations here are deliberately
//! simple: a whole-collection JSON document with atomic writes for real runs,
//! and an in-memory store for tests.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evreq_core::EventRequest;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "evreq-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request {0} not found")]
    NotFound(Uuid),
    #[error("request {0} already exists")]
    Duplicate(Uuid),
    #[error("store io: {0}")]
    Io(#[from] io::Error),
    #[error("store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Read/write contract the sync orchestrator depends on.
///
/// `snapshot` is fetched once per pass and reconciled against in memory;
/// `create` and `update` apply one record at a time.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn snapshot(&self) -> Result<Vec<EventRequest>, StoreError>;
    async fn create(&self, request: EventRequest) -> Result<(), StoreError>;
    async fn update(&self, request: EventRequest) -> Result<(), StoreError>;
}

/// Whole-collection JSON store. Every mutation rewrites the document through
/// a temp-file rename, so readers never observe a partial write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<EventRequest>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "request store file absent, starting empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn persist(&self, requests: &[EventRequest]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(requests)?;
        write_atomic(&self.path, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for JsonFileStore {
    async fn snapshot(&self) -> Result<Vec<EventRequest>, StoreError> {
        self.load().await
    }

    async fn create(&self, request: EventRequest) -> Result<(), StoreError> {
        let mut requests = self.load().await?;
        if requests.iter().any(|r| r.id == request.id) {
            return Err(StoreError::Duplicate(request.id));
        }
        requests.push(request);
        self.persist(&requests).await
    }

    async fn update(&self, request: EventRequest) -> Result<(), StoreError> {
        let mut requests = self.load().await?;
        let slot = requests
            .iter_mut()
            .find(|r| r.id == request.id)
            .ok_or(StoreError::NotFound(request.id))?;
        *slot = request;
        self.persist(&requests).await
    }
}

/// In-memory store for unit and integration tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    requests: Mutex<Vec<EventRequest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(requests: Vec<EventRequest>) -> Self {
        Self {
            requests: Mutex::new(requests),
        }
    }

    /// Current contents, for assertions.
    pub async fn dump(&self) -> Vec<EventRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn snapshot(&self) -> Result<Vec<EventRequest>, StoreError> {
        Ok(self.requests.lock().await.clone())
    }

    async fn create(&self, request: EventRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.lock().await;
        if requests.iter().any(|r| r.id == request.id) {
            return Err(StoreError::Duplicate(request.id));
        }
        requests.push(request);
        Ok(())
    }

    async fn update(&self, request: EventRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.lock().await;
        let slot = requests
            .iter_mut()
            .find(|r| r.id == request.id)
            .ok_or(StoreError::NotFound(request.id))?;
        *slot = request;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ArchivedPayload {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Content-hash-addressed archive of the raw feed payloads each sync pass
/// reconciled. Paths are immutable once written; re-archiving identical bytes
/// is reported as deduplicated rather than rewritten.
#[derive(Debug, Clone)]
pub struct IntakeArchive {
    root: PathBuf,
}

impl IntakeArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn payload_relative_path(
        &self,
        fetched_at: DateTime<Utc>,
        feed_id: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let stamp = fetched_at.format("%Y%m%d_%H%M%S").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(feed_id)
            .join(stamp)
            .join(format!("{content_hash}.{ext}"))
    }

    pub async fn archive(
        &self,
        fetched_at: DateTime<Utc>,
        feed_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<ArchivedPayload> {
        let content_hash = sha256_hex(bytes);
        let relative_path =
            self.payload_relative_path(fetched_at, feed_id, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);

        let exists = fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking archive path {}", absolute_path.display()))?;
        if exists {
            return Ok(ArchivedPayload {
                content_hash,
                relative_path,
                absolute_path,
                byte_size: bytes.len(),
                deduplicated: true,
            });
        }

        write_atomic(&absolute_path, bytes)
            .await
            .with_context(|| format!("archiving payload {}", absolute_path.display()))?;

        Ok(ArchivedPayload {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            deduplicated: false,
        })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Write through a sibling temp file and rename into place.
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("target path has no parent directory"))?;
    fs::create_dir_all(parent).await?;

    let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    match fs::rename(&temp_path, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&temp_path).await;
            Err(err)
        }
    }
}
