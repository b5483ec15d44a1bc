//! # penwright-kernel
//!
//! Tool-call mediated document mutation for penwright.
//!
//! An assistant never touches the document directly. It emits tool calls;
//! the kernel turns each one into a safe, bounded edit:
//! - resolves block ids or line selectors to concrete blocks
//! - widens edits on a list item to the whole list
//! - refuses edits that would destroy disproportionate content
//! - applies the edit as one undoable transaction
//! - persists the result through a debounced autosave
//!
//! | Type | Role |
//! |------|------|
//! | [`ToolCallDispatcher`] | Dedup, gates, and the resolve/guard/execute pipeline |
//! | [`DocumentLines`] | Line view and targeting queries |
//! | [`ContentGuard`] | Content preservation rules |
//! | [`DocumentExecutor`] | Applies resolved edits to a [`BlockDocument`] |
//! | [`AutosaveController`] | Debounced persistence with status |
//! | [`DocumentStore`] | Replace-full-content persistence backend |

pub mod analysis;
pub mod autosave;
pub mod config;
pub mod dispatcher;
pub mod edit_tools;
pub mod guard;
pub mod store;

use std::sync::Arc;

use parking_lot::RwLock;

pub use penwright_doc::BlockDocument;

/// A document shared between the dispatcher, the autosave and the UI.
pub type SharedDocument = Arc<RwLock<BlockDocument>>;

/// Wrap a document for sharing.
pub fn shared_document(document: BlockDocument) -> SharedDocument {
    Arc::new(RwLock::new(document))
}

pub use analysis::{
    ConceptualUnit, ContentSearchOptions, DocumentLines, InsertionPoint, LineRange, LineResolution, LineTarget,
    RelativePosition, UnitAnalysis, UnitInfo,
};
pub use autosave::{AutosaveController, AutosaveStatus};
pub use config::{
    AutosaveConfig, ConfigError, ContentPreservationConfig, EngineConfig, ResolverConfig, WarningThresholds,
    load_engine_config,
};
pub use dispatcher::{
    DispatchOutcome, DispatchRecord, DispatchReport, EditorContext, Notice, NoticeLevel, Surface, SurfaceMode,
    ToolCallDispatcher,
};
pub use edit_tools::{AddAnchor, DocumentExecutor, EditError, EditReport};
pub use guard::{ContentGuard, ContentImpact, PreservationResult, SuggestedAction};
pub use store::{
    DocumentStore, FileDocumentStore, MemoryDocumentStore, PersistedDocument, SaveReceipt, SharedDocumentStore,
    StoreError,
};
