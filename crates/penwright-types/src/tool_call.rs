//! Tool-call wire schema and typed tool calls.
//!
//! The assistant backend emits loosely-typed events:
//!
//! ```json
//! { "toolCallId": "call_1", "toolName": "modifyContent",
//!   "args": { "targetBlockId": "b7", "newMarkdownContent": "..." },
//!   "state": "call" }
//! ```
//!
//! [`ToolCall::from_event`] validates `args` into one variant per tool name so
//! nothing downstream sees an untyped payload.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;
use thiserror::Error;

use crate::block::BlockId;

/// Lifecycle marker on a wire event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallState {
    /// Emitted by the assistant, not yet applied.
    #[default]
    Call,
    /// Already finalized in an earlier session; must not run again.
    Result,
}

/// A tool-call entry as it appears in a transcript message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEvent {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub state: ToolCallState,
}

impl ToolCallEvent {
    /// Create a pending call event.
    pub fn call(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_call_id: id.into(),
            tool_name: name.into(),
            args,
            state: ToolCallState::Call,
        }
    }

    /// Mark as already finalized.
    pub fn finalized(mut self) -> Self {
        self.state = ToolCallState::Result;
        self
    }
}

/// Known tool names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "camelCase")]
pub enum ToolName {
    #[strum(serialize = "addContent")]
    AddContent,
    #[strum(serialize = "modifyContent")]
    ModifyContent,
    #[strum(serialize = "deleteContent")]
    DeleteContent,
    #[strum(serialize = "modifyTable")]
    ModifyTable,
    #[strum(serialize = "replaceAllContent")]
    ReplaceAllContent,
    #[strum(serialize = "requestEditorContent")]
    RequestEditorContent,
}

impl ToolName {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::AddContent => "addContent",
            ToolName::ModifyContent => "modifyContent",
            ToolName::DeleteContent => "deleteContent",
            ToolName::ModifyTable => "modifyTable",
            ToolName::ReplaceAllContent => "replaceAllContent",
            ToolName::RequestEditorContent => "requestEditorContent",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction for relative line targeting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "up", alias = "above")]
    Before,
    #[serde(alias = "down", alias = "below")]
    After,
}

fn default_true() -> bool {
    true
}

/// Line-based alternative to an explicit block id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineSelector {
    /// `offset` lines before/after a reference block.
    #[serde(rename_all = "camelCase")]
    Relative {
        reference_block_id: BlockId,
        direction: Direction,
        offset: usize,
        #[serde(default = "default_true")]
        respect_unit_boundaries: bool,
    },
    /// The n-th (0-based `occurrence`) line whose text matches `search`.
    #[serde(rename_all = "camelCase")]
    Content {
        search: String,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default)]
        exact_match: bool,
        #[serde(default)]
        occurrence: usize,
    },
    /// Absolute 0-based line number.
    #[serde(rename_all = "camelCase")]
    Position { line_number: usize },
}

/// A single id or a list of ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(BlockId),
    Many(Vec<BlockId>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<BlockId> {
        match self {
            OneOrMany::One(id) => vec![id],
            OneOrMany::Many(ids) => ids,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arguments for `addContent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContentArgs {
    pub markdown_content: String,
    /// Insert after this block.
    #[serde(default)]
    pub target_block_id: Option<BlockId>,
    /// Insert before this block.
    #[serde(default)]
    pub before_block_id: Option<BlockId>,
    /// Insert after the resolved line.
    #[serde(default)]
    pub target_line: Option<LineSelector>,
}

/// Arguments for `modifyContent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyContentArgs {
    #[serde(default)]
    pub target_block_id: Option<BlockId>,
    #[serde(default)]
    pub target_line: Option<LineSelector>,
    /// Literal substring to replace; whole block (or unit) when absent.
    #[serde(default)]
    pub target_text: Option<String>,
    pub new_markdown_content: String,
}

/// Arguments for `deleteContent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteContentArgs {
    #[serde(default)]
    pub target_block_id: Option<OneOrMany>,
    #[serde(default)]
    pub target_line: Option<LineSelector>,
    /// Literal substring to delete; whole blocks when absent.
    #[serde(default)]
    pub target_text: Option<String>,
}

/// Arguments for `modifyTable`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyTableArgs {
    pub table_block_id: BlockId,
    pub new_table_markdown: String,
}

/// Arguments for `replaceAllContent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAllContentArgs {
    pub new_markdown_content: String,
    #[serde(default)]
    pub require_confirmation: bool,
}

/// A validated tool call.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolCall {
    AddContent(AddContentArgs),
    ModifyContent(ModifyContentArgs),
    DeleteContent(DeleteContentArgs),
    ModifyTable(ModifyTableArgs),
    ReplaceAllContent(ReplaceAllContentArgs),
    RequestEditorContent,
}

/// Errors raised while turning a wire event into a [`ToolCall`].
#[derive(Debug, Error, PartialEq)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("malformed arguments for {tool}: {reason}")]
    MalformedArgs { tool: ToolName, reason: String },

    #[error("{0} requires a target (targetBlockId or targetLine)")]
    MissingTarget(ToolName),
}

impl ToolCallError {
    fn malformed(tool: ToolName, reason: impl Into<String>) -> Self {
        Self::MalformedArgs {
            tool,
            reason: reason.into(),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: ToolName, args: &Value) -> Result<T, ToolCallError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolCallError::malformed(tool, e.to_string()))
}

impl ToolCall {
    /// Validate a wire event.
    pub fn from_event(event: &ToolCallEvent) -> Result<Self, ToolCallError> {
        Self::parse(&event.tool_name, &event.args)
    }

    /// Validate a tool name and its raw arguments.
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolCallError> {
        let tool = ToolName::from_str(name).ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;

        let call = match tool {
            ToolName::AddContent => ToolCall::AddContent(parse_args(tool, args)?),
            ToolName::ModifyContent => {
                let args: ModifyContentArgs = parse_args(tool, args)?;
                if args.target_block_id.is_none() && args.target_line.is_none() {
                    return Err(ToolCallError::MissingTarget(tool));
                }
                if args.target_text.as_deref() == Some("") {
                    return Err(ToolCallError::malformed(tool, "targetText must not be empty"));
                }
                ToolCall::ModifyContent(args)
            }
            ToolName::DeleteContent => {
                let args: DeleteContentArgs = parse_args(tool, args)?;
                match (&args.target_block_id, &args.target_line) {
                    (None, None) => return Err(ToolCallError::MissingTarget(tool)),
                    (Some(ids), _) if ids.is_empty() => return Err(ToolCallError::MissingTarget(tool)),
                    (Some(ids), _) if ids.len() > 1 && args.target_text.is_some() => {
                        return Err(ToolCallError::malformed(
                            tool,
                            "targetText can only be combined with a single targetBlockId",
                        ));
                    }
                    _ => {}
                }
                if args.target_text.as_deref() == Some("") {
                    return Err(ToolCallError::malformed(tool, "targetText must not be empty"));
                }
                ToolCall::DeleteContent(args)
            }
            ToolName::ModifyTable => ToolCall::ModifyTable(parse_args(tool, args)?),
            ToolName::ReplaceAllContent => ToolCall::ReplaceAllContent(parse_args(tool, args)?),
            ToolName::RequestEditorContent => ToolCall::RequestEditorContent,
        };
        Ok(call)
    }

    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::AddContent(_) => ToolName::AddContent,
            ToolCall::ModifyContent(_) => ToolName::ModifyContent,
            ToolCall::DeleteContent(_) => ToolName::DeleteContent,
            ToolCall::ModifyTable(_) => ToolName::ModifyTable,
            ToolCall::ReplaceAllContent(_) => ToolName::ReplaceAllContent,
            ToolCall::RequestEditorContent => ToolName::RequestEditorContent,
        }
    }

    /// Whether this call mutates the document (and so needs the document view).
    pub fn targets_document(&self) -> bool {
        !matches!(self, ToolCall::RequestEditorContent)
    }
}
