//! Debounced autosave.
//!
//! # State machine
//!
//! ```text
//!          mutation                debounce elapsed
//!   idle ────────────▶ unsaved ─────────────────────▶ saving
//!    ▲                                                  │
//!    │ display window               ┌───── ok ──────────┤
//!    └──────────────── saved ◀──────┘                   │ err
//!                                                       ▼
//!                                     error (sticky until a save succeeds)
//! ```
//!
//! Only one debounce timer is live at a time: each mutation aborts the
//! outstanding one and starts a fresh one. Saves are serialized through an
//! async mutex and always write the document as it is when the save starts.
//! A failed save is never retried on its own; the next mutation, a manual
//! [`AutosaveController::flush`] or teardown via
//! [`AutosaveController::flush_detached`] sends the content again.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use penwright_doc::render_markdown;

use crate::SharedDocument;
use crate::config::AutosaveConfig;
use crate::store::{PersistedDocument, SaveReceipt, SharedDocumentStore, StoreError};

/// Persistence status for one document session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutosaveStatus {
    #[default]
    Idle,
    Unsaved,
    Saving,
    Saved,
    Error,
}

impl AutosaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutosaveStatus::Idle => "idle",
            AutosaveStatus::Unsaved => "unsaved",
            AutosaveStatus::Saving => "saving",
            AutosaveStatus::Saved => "saved",
            AutosaveStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AutosaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct Inner {
    document: SharedDocument,
    store: SharedDocumentStore,
    config: AutosaveConfig,
    status: watch::Sender<AutosaveStatus>,
    /// Pending debounce timer.
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Pending saved → idle revert.
    revert: Mutex<Option<JoinHandle<()>>>,
    save_lock: tokio::sync::Mutex<()>,
    /// Document version last written successfully.
    saved_version: Mutex<u64>,
    last_error: Mutex<Option<String>>,
}

/// Debounced persistence for a shared document. Cheap to clone.
#[derive(Clone)]
pub struct AutosaveController {
    inner: Arc<Inner>,
}

impl AutosaveController {
    /// The document's current version counts as already saved.
    pub fn new(document: SharedDocument, store: SharedDocumentStore, config: AutosaveConfig) -> Self {
        let saved_version = document.read().version();
        let (status, _) = watch::channel(AutosaveStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                document,
                store,
                config,
                status,
                timer: Mutex::new(None),
                revert: Mutex::new(None),
                save_lock: tokio::sync::Mutex::new(()),
                saved_version: Mutex::new(saved_version),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> AutosaveStatus {
        *self.inner.status.borrow()
    }

    /// Watch status transitions.
    pub fn subscribe(&self) -> watch::Receiver<AutosaveStatus> {
        self.inner.status.subscribe()
    }

    /// Message of the last failed save, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// True when the document has changes not yet written.
    pub fn has_pending_changes(&self) -> bool {
        self.inner.document.read().version() != *self.inner.saved_version.lock()
    }

    /// Record a mutation and (re)start the debounce timer.
    pub fn notify_change(&self) {
        if let Some(revert) = self.inner.revert.lock().take() {
            revert.abort();
        }
        if matches!(self.status(), AutosaveStatus::Idle | AutosaveStatus::Saved) {
            self.inner.set_status(AutosaveStatus::Unsaved);
        }

        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.config.debounce();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // The save runs detached so a later restart cannot cancel it mid-write.
            tokio::spawn(async move {
                if let Err(e) = inner.save().await {
                    tracing::warn!(error = %e, "debounced save failed");
                }
            });
        });
        if let Some(previous) = self.inner.timer.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Save pending changes now, bypassing the debounce.
    ///
    /// Returns `Ok(None)` when there was nothing to write.
    pub async fn flush(&self) -> Result<Option<SaveReceipt>, StoreError> {
        self.inner.cancel_timer();
        self.inner.save().await
    }

    /// Fire-and-forget flush for teardown. Sends pending content even if the
    /// previous save failed.
    pub fn flush_detached(&self) -> JoinHandle<()> {
        self.inner.cancel_timer();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.save().await {
                tracing::warn!(error = %e, "detached flush failed");
            }
        })
    }
}

impl Inner {
    fn set_status(&self, status: AutosaveStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "autosave status");
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    async fn save(self: &Arc<Self>) -> Result<Option<SaveReceipt>, StoreError> {
        let _serialized = self.save_lock.lock().await;

        let (document_id, version, persisted) = {
            let doc = self.document.read();
            (
                doc.document_id().to_string(),
                doc.version(),
                PersistedDocument {
                    blocks: doc.snapshot(),
                    markdown: render_markdown(doc.blocks()),
                },
            )
        };

        if version == *self.saved_version.lock() {
            if *self.status.borrow() == AutosaveStatus::Unsaved {
                self.set_status(AutosaveStatus::Idle);
            }
            return Ok(None);
        }

        self.set_status(AutosaveStatus::Saving);
        match self.store.replace_content(&document_id, persisted).await {
            Ok(receipt) => {
                *self.saved_version.lock() = version;
                *self.last_error.lock() = None;
                tracing::info!(document = %document_id, version, modified_at = receipt.modified_at, "saved document");

                if self.document.read().version() != version {
                    self.set_status(AutosaveStatus::Unsaved);
                } else {
                    self.set_status(AutosaveStatus::Saved);
                    self.schedule_revert();
                }
                Ok(Some(receipt))
            }
            Err(e) => {
                tracing::warn!(document = %document_id, version, error = %e, "save failed");
                *self.last_error.lock() = Some(e.to_string());
                self.set_status(AutosaveStatus::Error);
                Err(e)
            }
        }
    }

    fn schedule_revert(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let window = self.config.saved_display();
        let revert = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if *inner.status.borrow() == AutosaveStatus::Saved {
                inner.set_status(AutosaveStatus::Idle);
            }
        });
        if let Some(previous) = self.revert.lock().replace(revert) {
            previous.abort();
        }
    }
}
