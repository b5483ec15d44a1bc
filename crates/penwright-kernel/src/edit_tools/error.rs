//! Error types for edit tools.
//!
//! Messages are written for the assistant as much as for logs: they say what
//! was wrong with the call so it can be reissued correctly.

use thiserror::Error;

use penwright_doc::{DocumentError, ParseError};
use penwright_types::{BlockId, ToolCallError, ToolName};

/// Errors that can occur while executing a tool call.
#[derive(Debug, Error)]
pub enum EditError {
    /// The call's arguments did not parse.
    #[error(transparent)]
    ToolCall(#[from] ToolCallError),

    /// A target block id does not exist.
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// A line selector resolved to nothing.
    #[error("{tool}: target could not be resolved: {detail}")]
    TargetNotResolved { tool: ToolName, detail: String },

    /// `targetText` is not present in the target block.
    #[error("text {text:?} not found in block {block_id}")]
    TextNotFound { block_id: BlockId, text: String },

    /// modifyTable pointed at something that is not a table.
    #[error("block {0} is not a table")]
    NotATable(BlockId),

    /// modifyTable content held no table.
    #[error("new table markdown contains no table")]
    NoTableInContent,

    /// The document rejected the mutation.
    #[error("document rejected edit: {0}")]
    Document(#[from] DocumentError),

    /// Content parsing failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl EditError {
    pub fn unresolved(tool: ToolName, detail: impl Into<String>) -> Self {
        Self::TargetNotResolved {
            tool,
            detail: detail.into(),
        }
    }

    pub fn text_not_found(block_id: &BlockId, text: impl Into<String>) -> Self {
        Self::TextNotFound {
            block_id: block_id.clone(),
            text: text.into(),
        }
    }
}

/// Result type for edit operations.
pub type Result<T> = std::result::Result<T, EditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EditError::unresolved(ToolName::ModifyContent, "line 40 is out of range");
        let msg = err.to_string();
        assert!(msg.contains("modifyContent"));
        assert!(msg.contains("line 40"));

        let err = EditError::text_not_found(&BlockId::new("b7"), "teh");
        assert!(err.to_string().contains("b7"));
        assert!(err.to_string().contains("\"teh\""));
    }

    #[test]
    fn test_document_error_conversion() {
        let err: EditError = DocumentError::EmptyDocument.into();
        assert!(matches!(err, EditError::Document(DocumentError::EmptyDocument)));
        assert!(err.to_string().contains("at least one block"));
    }
}
