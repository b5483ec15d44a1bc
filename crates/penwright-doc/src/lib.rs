//! Block document model for Penwright.
//!
//! Holds the editor's content as a tree of [`Block`](penwright_types::Block)s
//! and guarantees its structural invariants across every edit. Also bridges
//! between markdown and blocks in both directions.
//!
//! # Key Types
//!
//! |------------------------|-------------------------------------------|
//! | Type                   | Purpose                                   |
//! |------------------------|-------------------------------------------|
//! | [`BlockDocument`]      | Versioned block tree with one-step undo   |
//! | [`Transaction`]        | Scratch view for atomic multi-step edits  |
//! | [`InsertPosition`]     | Start / End / Before / After a block      |
//! | [`MarkdownParser`]     | Markdown → blocks (pulldown-cmark)        |
//! | [`ContentParser`]      | Async parser seam for editor surfaces     |
//! |------------------------|-------------------------------------------|

mod document;
mod error;
mod markdown;
mod render;

pub use document::{BlockDocument, InsertPosition, Transaction};
pub use error::DocumentError;
pub use markdown::{ContentParser, MarkdownParser, ParseError};
pub use render::{render_inline, render_markdown};

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;
