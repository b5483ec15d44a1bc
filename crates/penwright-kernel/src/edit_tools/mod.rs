//! Edit tools: the document side of assistant tool calls.
//!
//! # Tools
//!
//! | Tool | Effect |
//! |------|--------|
//! | `addContent` | Insert parsed markdown after / before a target, or at the end |
//! | `modifyContent` | Replace a substring, a block, or the block's whole list |
//! | `deleteContent` | Remove blocks, or a substring (dropping emptied blocks) |
//! | `modifyTable` | Swap a table's rows in place |
//! | `replaceAllContent` | Replace the whole document |
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         ToolCallDispatcher              │
//! │   (dedup, resolve, guard, parse)        │
//! └────────────────────┬────────────────────┘
//!                      │ resolved edits
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │         DocumentExecutor                │
//! │   (placement, span-level text edits)    │
//! └────────────────────┬────────────────────┘
//!                      │ transactions
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │         BlockDocument                   │
//! └─────────────────────────────────────────┘
//! ```

pub mod engines;
pub mod error;
pub mod text;

pub use engines::{AddAnchor, DocumentExecutor, EditReport};
pub use error::{EditError, Result};
pub use text::{remove_first, replace_first};
