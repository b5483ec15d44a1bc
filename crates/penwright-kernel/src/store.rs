//! Durable storage for documents.
//!
//! The write contract is a single idempotent "replace full content" call:
//! the complete block array plus a markdown mirror for search indexing. No
//! diffs. A failed write can simply be repeated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use penwright_types::Block;

/// Errors from a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid document id: {0:?}")]
    InvalidDocumentId(String),

    /// The backend refused or could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything written on a save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub blocks: Vec<Block>,
    /// Derived markdown mirror.
    pub markdown: String,
}

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    /// Milliseconds since the Unix epoch.
    pub modified_at: u64,
}

impl SaveReceipt {
    pub fn now() -> Self {
        let modified_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { modified_at }
    }
}

/// Persistence backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replace a document's stored content wholesale.
    async fn replace_content(&self, document_id: &str, document: PersistedDocument) -> Result<SaveReceipt, StoreError>;

    /// Load the stored blocks, if the document exists.
    async fn load(&self, document_id: &str) -> Result<Option<Vec<Block>>, StoreError>;
}

pub type SharedDocumentStore = Arc<dyn DocumentStore>;

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<String, PersistedDocument>,
    saves: usize,
    /// Fail this many upcoming writes.
    failures: usize,
}

/// Store kept in process memory. Used for tests and embedding.
///
/// Can be told to fail writes and to take time per write, which makes it
/// useful for exercising autosave behaviour.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write sleeps this long before completing.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` writes fail.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().failures = count;
    }

    pub fn get(&self, document_id: &str) -> Option<PersistedDocument> {
        self.state.lock().documents.get(document_id).cloned()
    }

    /// Number of successful writes.
    pub fn save_count(&self) -> usize {
        self.state.lock().saves
    }

    /// Highest number of writes ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn replace_content(&self, document_id: &str, document: PersistedDocument) -> Result<SaveReceipt, StoreError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = {
            let mut state = self.state.lock();
            if state.failures > 0 {
                state.failures -= 1;
                Err(StoreError::Unavailable("injected failure".to_string()))
            } else {
                state.documents.insert(document_id.to_string(), document);
                state.saves += 1;
                Ok(SaveReceipt::now())
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn load(&self, document_id: &str) -> Result<Option<Vec<Block>>, StoreError> {
        Ok(self.get(document_id).map(|d| d.blocks))
    }
}

// ============================================================================
// File store
// ============================================================================

/// Stores `<id>.json` (block array) and `<id>.md` (mirror) under a directory.
///
/// Each file is written to a temporary sibling and renamed into place, so a
/// crash mid-write never leaves a truncated document.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the block JSON for a document.
    pub fn json_path(&self, document_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.json", checked_id(document_id)?)))
    }

    /// Path of the markdown mirror for a document.
    pub fn markdown_path(&self, document_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(format!("{}.md", checked_id(document_id)?)))
    }
}

fn checked_id(document_id: &str) -> Result<&str, StoreError> {
    let bad = document_id.is_empty()
        || document_id.starts_with('.')
        || document_id.contains(['/', '\\'])
        || document_id.contains("..");
    if bad {
        Err(StoreError::InvalidDocumentId(document_id.to_string()))
    } else {
        Ok(document_id)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("document");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn replace_content(&self, document_id: &str, document: PersistedDocument) -> Result<SaveReceipt, StoreError> {
        let json_path = self.json_path(document_id)?;
        let md_path = self.markdown_path(document_id)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let json = serde_json::to_vec_pretty(&document.blocks)?;
        write_atomic(&json_path, &json).await?;
        write_atomic(&md_path, document.markdown.as_bytes()).await?;

        tracing::debug!(path = %json_path.display(), bytes = json.len(), "wrote document");
        Ok(SaveReceipt::now())
    }

    async fn load(&self, document_id: &str) -> Result<Option<Vec<Block>>, StoreError> {
        let path = self.json_path(document_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
