//! Block types: the nodes of a hierarchical rich-text document.
//!
//! The model mirrors what block-based editor surfaces exchange as JSON:
//!
//! ```text
//! Block
//! ├── id        (BlockId, unique within the document)
//! ├── type      (BlockKind: paragraph, heading, bulletListItem, table, ...)
//! ├── props     (level, checked, language, url, caption, name, ...extra)
//! ├── content   (inline spans, or a table payload)
//! └── children  (nested blocks, e.g. a sub-list under a list item)
//! ```
//!
//! Tree invariants (unique ids, at least one block) are not enforced here;
//! `penwright-doc::BlockDocument` owns them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Stable block identifier.
///
/// Editor surfaces hand out opaque string ids; blocks created by the engine
/// get a time-ordered UUIDv7 so newly inserted content sorts after older content
/// in logs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a block *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Plain paragraph.
    #[default]
    #[serde(alias = "text")]
    #[strum(serialize = "paragraph", serialize = "text")]
    Paragraph,
    /// Heading; `props.level` carries 1..=6.
    Heading,
    /// Bulleted list item.
    #[serde(alias = "listItem")]
    #[strum(serialize = "bulletListItem", serialize = "listItem")]
    BulletListItem,
    /// Ordered list item.
    #[strum(serialize = "numberedListItem")]
    NumberedListItem,
    /// Task list item; `props.checked` carries the state.
    #[strum(serialize = "checkListItem")]
    CheckListItem,
    /// Code block; `props.language` is optional.
    #[strum(serialize = "codeBlock")]
    CodeBlock,
    /// Block quote.
    Quote,
    /// Table; content is a [`TableContent`] payload.
    Table,
    /// Image; `props.url` and `props.caption`.
    Image,
    /// File attachment; `props.url` and `props.name`.
    File,
}

impl BlockKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading => "heading",
            BlockKind::BulletListItem => "bulletListItem",
            BlockKind::NumberedListItem => "numberedListItem",
            BlockKind::CheckListItem => "checkListItem",
            BlockKind::CodeBlock => "codeBlock",
            BlockKind::Quote => "quote",
            BlockKind::Table => "table",
            BlockKind::Image => "image",
            BlockKind::File => "file",
        }
    }

    /// Check if this is any kind of list item.
    pub fn is_list_item(&self) -> bool {
        matches!(
            self,
            BlockKind::BulletListItem | BlockKind::NumberedListItem | BlockKind::CheckListItem
        )
    }

    /// Check if contiguous runs of this kind form one conceptual unit.
    ///
    /// Only list items group. A table already holds its rows, so each table
    /// block is a unit of its own.
    pub fn is_groupable(&self) -> bool {
        self.is_list_item()
    }

    /// Check if this block carries a structured payload that is expensive to
    /// recreate (tables, media, attachments).
    pub fn is_special(&self) -> bool {
        matches!(self, BlockKind::Table | BlockKind::Image | BlockKind::File)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inline formatting applied to a span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanStyles {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    /// Link target, when the span is a hyperlink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl SpanStyles {
    /// True when no formatting is applied.
    pub fn is_plain(&self) -> bool {
        *self == SpanStyles::default()
    }
}

/// Helper for `#[serde(skip_serializing_if)]` on bool fields.
fn is_false(v: &bool) -> bool {
    !v
}

/// A run of text sharing one set of styles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineSpan {
    pub text: String,
    #[serde(default, skip_serializing_if = "SpanStyles::is_plain")]
    pub styles: SpanStyles,
}

impl InlineSpan {
    /// Unstyled text.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            styles: SpanStyles::default(),
        }
    }

    /// Text with explicit styles.
    pub fn styled(text: impl Into<String>, styles: SpanStyles) -> Self {
        Self {
            text: text.into(),
            styles,
        }
    }
}

/// One table row: each cell is a list of inline spans.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<Vec<InlineSpan>>,
}

/// Structured payload of a table block. The first row is the header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "tableContent")]
pub struct TableContent {
    pub rows: Vec<TableRow>,
}

impl TableContent {
    /// Plain-text rendering: cells joined by ` | `, rows by newlines.
    pub fn plain_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .map(|cell| spans_text(cell))
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Block content: inline spans for text blocks, a payload for tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockContent {
    Inline(Vec<InlineSpan>),
    Table(TableContent),
}

impl Default for BlockContent {
    fn default() -> Self {
        BlockContent::Inline(Vec::new())
    }
}

impl BlockContent {
    /// Inline spans, if this is text content.
    pub fn spans(&self) -> Option<&[InlineSpan]> {
        match self {
            BlockContent::Inline(spans) => Some(spans),
            BlockContent::Table(_) => None,
        }
    }

    pub fn plain_text(&self) -> String {
        match self {
            BlockContent::Inline(spans) => spans_text(spans),
            BlockContent::Table(table) => table.plain_text(),
        }
    }
}

/// Concatenate the text of a span list.
pub fn spans_text(spans: &[InlineSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Block properties. Unknown editor props are preserved in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProps {
    /// Heading level, or an editor-assigned level for other kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Check state for task list items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    /// Code block language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Media / attachment location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Image caption (alt text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Attachment display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A node in the document tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub props: BlockProps,
    #[serde(default)]
    pub content: BlockContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

impl Block {
    /// Create an empty block of the given kind with a fresh id.
    pub fn new(kind: BlockKind) -> Self {
        Self {
            id: BlockId::generate(),
            kind,
            props: BlockProps::default(),
            content: BlockContent::default(),
            children: Vec::new(),
        }
    }

    /// Create a block holding a single unstyled span.
    pub fn with_text(kind: BlockKind, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut block = Self::new(kind);
        if !text.is_empty() {
            block.content = BlockContent::Inline(vec![InlineSpan::plain(text)]);
        }
        block
    }

    /// Create a paragraph with plain text.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::with_text(BlockKind::Paragraph, text)
    }

    /// Create a heading of the given level.
    pub fn heading(level: u32, text: impl Into<String>) -> Self {
        let mut block = Self::with_text(BlockKind::Heading, text);
        block.props.level = Some(level);
        block
    }

    /// Replace the generated id.
    pub fn id(mut self, id: impl Into<BlockId>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach nested blocks.
    pub fn children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    /// The block's own text (children excluded).
    ///
    /// Media blocks have no inline content; their caption or name stands in.
    pub fn plain_text(&self) -> String {
        match self.kind {
            BlockKind::Image => self.props.caption.clone().unwrap_or_default(),
            BlockKind::File => self.props.name.clone().unwrap_or_default(),
            _ => self.content.plain_text(),
        }
    }

    /// Number of characters (not bytes) in the block's own text.
    pub fn char_count(&self) -> usize {
        self.plain_text().chars().count()
    }

    /// True when the block has no visible text and no payload.
    pub fn is_empty(&self) -> bool {
        !self.kind.is_special() && self.plain_text().trim().is_empty()
    }

    /// Visit this block and all descendants in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Block)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Number of blocks in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Block::subtree_len).sum::<usize>()
    }
}
