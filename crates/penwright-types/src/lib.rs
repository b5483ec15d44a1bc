//! Shared block and tool-call types for Penwright.
//!
//! This crate is the foundation the rest of the workspace builds on. It has
//! **no internal penwright dependencies**; it is a pure leaf crate.
//!
//! # Key Types
//!
//! |--------------------|-----------------------------------------------|
//! | Type               | Purpose                                       |
//! |--------------------|-----------------------------------------------|
//! | [`Block`]          | A node of the document tree                   |
//! | [`BlockId`]        | Stable block identifier                       |
//! | [`BlockKind`]      | Paragraph, heading, list item, table, ...     |
//! | [`InlineSpan`]     | Styled run of text                            |
//! | [`ToolCallEvent`]  | Tool call as emitted by the assistant         |
//! | [`ToolCall`]       | Validated, typed tool call                    |
//! |--------------------|-----------------------------------------------|

pub mod block;
pub mod tool_call;

pub use block::{
    Block, BlockContent, BlockId, BlockKind, BlockProps, InlineSpan, SpanStyles, TableContent,
    TableRow, spans_text,
};
pub use tool_call::{
    AddContentArgs, DeleteContentArgs, Direction, LineSelector, ModifyContentArgs,
    ModifyTableArgs, OneOrMany, ReplaceAllContentArgs, ToolCall, ToolCallError, ToolCallEvent,
    ToolCallState, ToolName,
};
