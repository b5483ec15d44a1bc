//! Block → markdown rendering.
//!
//! Used for the `.md` mirror a store writes next to the block JSON and for
//! handing editor content back to the assistant. Rendering is lossy for
//! editor-only props; it is not meant to round-trip byte for byte.

use penwright_types::{Block, BlockContent, BlockKind, InlineSpan, TableContent};

/// Render a block list as markdown, blocks separated by blank lines.
///
/// Consecutive list items of the same kind are kept tight.
pub fn render_markdown(blocks: &[Block]) -> String {
    let mut out = String::new();
    render_level(blocks, 0, &mut out);
    out.trim_end().to_string()
}

fn render_level(blocks: &[Block], indent: usize, out: &mut String) {
    let mut previous: Option<BlockKind> = None;
    let mut number = 0usize;

    for block in blocks {
        let tight = previous.is_some_and(|p| p == block.kind && p.is_list_item());
        if previous.is_some() && !tight && indent == 0 {
            out.push('\n');
        }
        number = if block.kind == BlockKind::NumberedListItem && tight {
            number + 1
        } else {
            1
        };

        render_block(block, indent, number, out);
        previous = Some(block.kind);
    }
}

fn render_block(block: &Block, indent: usize, number: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    let text = render_inline(block.content.spans().unwrap_or(&[]));

    match block.kind {
        BlockKind::Heading => {
            let level = block.props.level.unwrap_or(1).clamp(1, 6) as usize;
            push_line(out, &pad, &format!("{} {}", "#".repeat(level), text));
        }
        BlockKind::BulletListItem => push_line(out, &pad, &format!("- {}", text)),
        BlockKind::NumberedListItem => push_line(out, &pad, &format!("{}. {}", number, text)),
        BlockKind::CheckListItem => {
            let mark = if block.props.checked.unwrap_or(false) { 'x' } else { ' ' };
            push_line(out, &pad, &format!("- [{}] {}", mark, text));
        }
        BlockKind::CodeBlock => {
            let language = block.props.language.as_deref().unwrap_or("");
            push_line(out, &pad, &format!("```{}", language));
            for line in block.content.plain_text().lines() {
                push_line(out, &pad, line);
            }
            push_line(out, &pad, "```");
        }
        BlockKind::Quote => {
            for line in text.split('\n') {
                push_line(out, &pad, &format!("> {}", line).trim_end().to_string());
            }
        }
        BlockKind::Table => {
            if let BlockContent::Table(table) = &block.content {
                render_table(table, &pad, out);
            }
        }
        BlockKind::Image => {
            let caption = block.props.caption.as_deref().unwrap_or("");
            let url = block.props.url.as_deref().unwrap_or("");
            push_line(out, &pad, &format!("![{}]({})", caption, url));
        }
        BlockKind::File => {
            let name = block.props.name.as_deref().unwrap_or("file");
            let url = block.props.url.as_deref().unwrap_or("");
            push_line(out, &pad, &format!("[{}]({})", name, url));
        }
        BlockKind::Paragraph => push_line(out, &pad, &text),
    }

    if !block.children.is_empty() {
        let child_indent = if block.kind.is_list_item() { indent + 2 } else { indent };
        render_level(&block.children, child_indent, out);
    }
}

fn push_line(out: &mut String, pad: &str, line: &str) {
    out.push_str(pad);
    out.push_str(line);
    out.push('\n');
}

fn render_table(table: &TableContent, pad: &str, out: &mut String) {
    for (i, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = row.cells.iter().map(|cell| render_inline(cell)).collect();
        push_line(out, pad, &format!("| {} |", cells.join(" | ")));
        if i == 0 {
            let rule = vec!["---"; row.cells.len().max(1)].join(" | ");
            push_line(out, pad, &format!("| {} |", rule));
        }
    }
}

/// Render spans with markdown emphasis markers.
pub fn render_inline(spans: &[InlineSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        let mut text = span.text.clone();
        let styles = &span.styles;
        if styles.code {
            text = format!("`{}`", text);
        }
        if styles.bold {
            text = format!("**{}**", text);
        }
        if styles.italic {
            text = format!("*{}*", text);
        }
        if styles.strike {
            text = format!("~~{}~~", text);
        }
        if let Some(link) = &styles.link {
            text = format!("[{}]({})", text, link);
        }
        out.push_str(&text);
    }
    out
}
