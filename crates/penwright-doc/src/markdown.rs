//! Markdown → block conversion.
//!
//! Uses pulldown-cmark (the same parser as rustdoc) and walks its event
//! stream with a frame stack, turning block-level tags into [`Block`]s and
//! inline formatting into [`InlineSpan`] styles:
//!
//! ```text
//! "- **bold** item\n  - nested"
//!     ↓ pulldown-cmark events
//! Start(List) Start(Item) Start(Strong) Text("bold") End ...
//!     ↓ frame stack
//! [Block { bulletListItem, spans: [bold "bold", " item"],
//!          children: [Block { bulletListItem, "nested" }] }]
//! ```
//!
//! Every produced block gets a fresh id.

use async_trait::async_trait;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

use penwright_types::{Block, BlockContent, BlockKind, InlineSpan, SpanStyles, TableContent, TableRow, spans_text};

/// Errors from a [`ContentParser`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("content parse failed: {0}")]
pub struct ParseError(pub String);

/// Converts free-form assistant content into blocks.
///
/// Editor surfaces usually expose their own (asynchronous) parser; this trait
/// is the seam. [`MarkdownParser`] is the built-in implementation.
#[async_trait]
pub trait ContentParser: Send + Sync {
    async fn parse_blocks(&self, content: &str) -> Result<Vec<Block>, ParseError>;
}

/// pulldown-cmark backed parser with GFM tables, strikethrough and task lists.
#[derive(Debug, Clone)]
pub struct MarkdownParser {
    options: Options,
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownParser {
    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS,
        }
    }

    /// Parse markdown into top-level blocks.
    pub fn parse(&self, markdown: &str) -> Vec<Block> {
        let mut builder = Builder::default();
        for event in Parser::new_ext(markdown, self.options) {
            builder.event(event);
        }
        builder.finish()
    }
}

#[async_trait]
impl ContentParser for MarkdownParser {
    async fn parse_blocks(&self, content: &str) -> Result<Vec<Block>, ParseError> {
        Ok(self.parse(content))
    }
}

/// One open pulldown-cmark tag.
enum Frame {
    Paragraph,
    Heading(u32),
    Quote,
    Code,
    List,
    Item,
    Table,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Strikethrough,
    Link,
    Image { url: String },
    Other,
}

#[derive(Default)]
struct Builder {
    frames: Vec<Frame>,
    out: Vec<Block>,

    /// Item kind for each open list.
    lists: Vec<BlockKind>,
    /// Open list items, innermost last.
    items: Vec<Block>,

    /// Inline buffer for the current paragraph / heading / cell.
    spans: Vec<InlineSpan>,
    bold: u32,
    italic: u32,
    strike: u32,
    links: Vec<String>,

    code: Option<(Option<String>, String)>,

    quote_depth: u32,
    quote_spans: Vec<InlineSpan>,

    table: Option<TableContent>,
    row: Option<TableRow>,

    /// Alt text being collected for an open image.
    image_alt: Option<String>,
    /// Images seen in the current paragraph: (url, alt).
    images: Vec<(String, String)>,
}

fn heading_level(level: HeadingLevel) -> u32 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

impl Builder {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.open(tag),
            Event::End(_) => {
                let frame = self.frames.pop().unwrap_or(Frame::Other);
                self.close(frame);
            }
            Event::Text(text) => self.push_text(&text, false),
            Event::Code(text) => self.push_text(&text, true),
            Event::SoftBreak => self.push_text(" ", false),
            Event::HardBreak => self.push_text("\n", false),
            Event::TaskListMarker(checked) => {
                if let Some(item) = self.items.last_mut() {
                    item.kind = BlockKind::CheckListItem;
                    item.props.checked = Some(checked);
                }
            }
            // Raw HTML, rules, footnotes and math have no block equivalent.
            _ => {}
        }
    }

    fn open(&mut self, tag: Tag<'_>) {
        let frame = match tag {
            Tag::Paragraph => Frame::Paragraph,
            Tag::Heading { level, .. } => Frame::Heading(heading_level(level)),
            Tag::BlockQuote(_) => {
                self.quote_depth += 1;
                Frame::Quote
            }
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => Some(lang.trim().to_string()),
                    _ => None,
                };
                self.code = Some((language, String::new()));
                Frame::Code
            }
            Tag::List(start) => {
                self.flush_item_text();
                self.lists.push(if start.is_some() {
                    BlockKind::NumberedListItem
                } else {
                    BlockKind::BulletListItem
                });
                Frame::List
            }
            Tag::Item => {
                let kind = self.lists.last().copied().unwrap_or(BlockKind::BulletListItem);
                self.items.push(Block::new(kind));
                Frame::Item
            }
            Tag::Table(_) => {
                self.table = Some(TableContent::default());
                Frame::Table
            }
            Tag::TableHead | Tag::TableRow => {
                self.row = Some(TableRow::default());
                Frame::TableRow
            }
            Tag::TableCell => {
                self.spans.clear();
                Frame::TableCell
            }
            Tag::Emphasis => {
                self.italic += 1;
                Frame::Emphasis
            }
            Tag::Strong => {
                self.bold += 1;
                Frame::Strong
            }
            Tag::Strikethrough => {
                self.strike += 1;
                Frame::Strikethrough
            }
            Tag::Link { dest_url, .. } => {
                self.links.push(dest_url.to_string());
                Frame::Link
            }
            Tag::Image { dest_url, .. } => {
                self.image_alt = Some(String::new());
                Frame::Image {
                    url: dest_url.to_string(),
                }
            }
            _ => Frame::Other,
        };
        self.frames.push(frame);
    }

    fn close(&mut self, frame: Frame) {
        match frame {
            Frame::Paragraph => self.close_paragraph(),
            Frame::Heading(level) => {
                let mut block = Block::new(BlockKind::Heading);
                block.props.level = Some(level);
                block.content = BlockContent::Inline(std::mem::take(&mut self.spans));
                self.emit(block);
            }
            Frame::Quote => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 && !self.quote_spans.is_empty() {
                    let mut block = Block::new(BlockKind::Quote);
                    block.content = BlockContent::Inline(std::mem::take(&mut self.quote_spans));
                    self.emit(block);
                }
            }
            Frame::Code => {
                if let Some((language, text)) = self.code.take() {
                    let mut block = Block::with_text(BlockKind::CodeBlock, text.trim_end_matches('\n'));
                    block.props.language = language;
                    self.emit(block);
                }
            }
            Frame::List => {
                self.lists.pop();
            }
            Frame::Item => {
                self.flush_item_text();
                if let Some(item) = self.items.pop() {
                    self.emit(item);
                }
            }
            Frame::Table => {
                if let Some(table) = self.table.take() {
                    let mut block = Block::new(BlockKind::Table);
                    block.content = BlockContent::Table(table);
                    self.emit(block);
                }
            }
            Frame::TableRow => {
                if let (Some(row), Some(table)) = (self.row.take(), self.table.as_mut()) {
                    table.rows.push(row);
                }
            }
            Frame::TableCell => {
                let cell = std::mem::take(&mut self.spans);
                if let Some(row) = self.row.as_mut() {
                    row.cells.push(cell);
                }
            }
            Frame::Emphasis => self.italic = self.italic.saturating_sub(1),
            Frame::Strong => self.bold = self.bold.saturating_sub(1),
            Frame::Strikethrough => self.strike = self.strike.saturating_sub(1),
            Frame::Link => {
                self.links.pop();
            }
            Frame::Image { url } => {
                let alt = self.image_alt.take().unwrap_or_default();
                // Alt text stays readable inline if the paragraph has other text.
                self.links.push(url.clone());
                self.push_text(&alt, false);
                self.links.pop();
                self.images.push((url, alt));
            }
            Frame::Other => {}
        }
    }

    fn close_paragraph(&mut self) {
        let spans = std::mem::take(&mut self.spans);
        let images = std::mem::take(&mut self.images);

        if let [(url, alt)] = images.as_slice() {
            if spans_text(&spans).trim() == alt.trim() {
                let mut block = Block::new(BlockKind::Image);
                block.props.url = Some(url.clone());
                if !alt.is_empty() {
                    block.props.caption = Some(alt.clone());
                }
                self.emit(block);
                return;
            }
        }

        if spans.is_empty() {
            return;
        }

        if self.quote_depth > 0 {
            if !self.quote_spans.is_empty() {
                self.quote_spans.push(InlineSpan::plain("\n"));
            }
            self.quote_spans.extend(spans);
        } else if !self.items.is_empty() {
            self.spans = spans;
            self.flush_item_text();
        } else {
            let mut block = Block::new(BlockKind::Paragraph);
            block.content = BlockContent::Inline(spans);
            self.emit(block);
        }
    }

    /// Move buffered inline text into the innermost open list item.
    ///
    /// The first run becomes the item's own content; later paragraphs of a
    /// loose item become child paragraphs.
    fn flush_item_text(&mut self) {
        if self.spans.is_empty() || self.items.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.spans);
        let Some(item) = self.items.last_mut() else {
            return;
        };
        if spans_text(item.content.spans().unwrap_or(&[])).is_empty() {
            item.content = BlockContent::Inline(spans);
        } else {
            let mut paragraph = Block::new(BlockKind::Paragraph);
            paragraph.content = BlockContent::Inline(spans);
            item.children.push(paragraph);
        }
    }

    fn emit(&mut self, block: Block) {
        match self.items.last_mut() {
            Some(item) => item.children.push(block),
            None => self.out.push(block),
        }
    }

    fn styles(&self, code: bool) -> SpanStyles {
        SpanStyles {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
            strike: self.strike > 0,
            link: self.links.last().cloned(),
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if let Some((_, buffer)) = self.code.as_mut() {
            buffer.push_str(text);
            return;
        }
        if let Some(alt) = self.image_alt.as_mut() {
            alt.push_str(text);
            return;
        }
        if text.is_empty() {
            return;
        }
        let styles = self.styles(code);
        match self.spans.last_mut() {
            Some(last) if last.styles == styles => last.text.push_str(text),
            _ => self.spans.push(InlineSpan::styled(text, styles)),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        if !self.spans.is_empty() {
            let mut block = Block::new(BlockKind::Paragraph);
            block.content = BlockContent::Inline(std::mem::take(&mut self.spans));
            self.out.push(block);
        }
        self.out
    }
}
