//! Error types for document operations.

use thiserror::Error;

use penwright_types::BlockId;

/// Errors that can occur while reading or mutating a [`BlockDocument`](crate::BlockDocument).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// Block not found in document.
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// Two blocks would share an id.
    #[error("block already exists: {0}")]
    DuplicateBlock(BlockId),

    /// The mutation would leave the document without blocks.
    #[error("a document must contain at least one block")]
    EmptyDocument,

    /// An insert or replace was handed no blocks.
    #[error("no blocks supplied")]
    NoBlocks,

    /// Operation not supported on this block's content.
    #[error("operation not supported on block {id}: {reason}")]
    UnsupportedOperation { id: BlockId, reason: String },
}
