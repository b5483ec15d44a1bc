//! Document mutation executor.
//!
//! Thin translation from validated, resolved tool-call arguments to block
//! document primitives. Every operation is a single [`BlockDocument`]
//! transaction, so a failed edit leaves the document untouched and a
//! successful one is one undo step.
//!
//! The executor never decides *whether* an edit may happen; the guard has
//! already said yes by the time anything here runs.

use penwright_doc::{BlockDocument, DocumentError, InsertPosition};
use penwright_types::{Block, BlockContent, BlockId, BlockKind, InlineSpan, ToolName, spans_text};
use serde::Serialize;

use super::error::{EditError, Result};
use super::text::{remove_first, replace_first};
use crate::analysis::{DocumentLines, UnitAnalysis};
use crate::config::ResolverConfig;

// ============================================================================
// Report
// ============================================================================

/// What an edit did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditReport {
    pub tool: Option<ToolName>,
    /// Ids of blocks created by the edit.
    pub inserted: Vec<BlockId>,
    /// Blocks whose content changed in place.
    pub modified: Vec<BlockId>,
    /// Number of removed subtrees.
    pub removed: usize,
    /// Guard and resolver warnings to show the user.
    pub warnings: Vec<String>,
    /// Document version after the edit.
    pub version: u64,
}

impl EditReport {
    fn new(tool: ToolName, doc: &BlockDocument) -> Self {
        Self {
            tool: Some(tool),
            version: doc.version(),
            ..Default::default()
        }
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

/// Where addContent puts its blocks, before unit adjustment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddAnchor {
    /// Insert after this block.
    pub after: Option<BlockId>,
    /// Insert before this block.
    pub before: Option<BlockId>,
}

// ============================================================================
// Executor
// ============================================================================

/// Applies resolved edits to a document.
#[derive(Debug, Clone, Default)]
pub struct DocumentExecutor {
    resolver: ResolverConfig,
}

/// Fallback when parsing yields nothing for non-empty input.
fn raw_paragraph(raw: &str) -> Vec<Block> {
    if raw.trim().is_empty() {
        Vec::new()
    } else {
        vec![Block::paragraph(raw.trim())]
    }
}

/// Never hand the document an empty replacement.
fn or_empty_paragraph(blocks: Vec<Block>) -> Vec<Block> {
    if blocks.is_empty() {
        vec![Block::paragraph("")]
    } else {
        blocks
    }
}

fn inline_spans<'a>(block: &'a Block, id: &BlockId) -> Result<&'a [InlineSpan]> {
    block.content.spans().ok_or_else(|| {
        EditError::Document(DocumentError::UnsupportedOperation {
            id: id.clone(),
            reason: "substring edits need inline text content".to_string(),
        })
    })
}

impl DocumentExecutor {
    pub fn new(resolver: ResolverConfig) -> Self {
        Self { resolver }
    }

    /// Blocks a whole-block modification of `target` actually replaces:
    /// the target's entire list when it is a list item.
    pub fn modification_targets(doc: &BlockDocument, target: &BlockId) -> Vec<BlockId> {
        UnitAnalysis::analyze(doc.blocks()).expand_to_units(std::slice::from_ref(target))
    }

    /// Decide the insert position for addContent.
    ///
    /// `None` means the document is blank and should be replaced wholesale.
    pub fn add_placement(&self, doc: &BlockDocument, anchor: &AddAnchor, first_kind: Option<BlockKind>) -> (Option<InsertPosition>, Vec<String>) {
        if doc.is_blank() {
            return (None, Vec::new());
        }
        let lines = DocumentLines::analyze(doc.blocks(), &self.resolver);

        // A lone anchor inside a unit the new content continues stays put.
        let continues = |id: &BlockId| {
            let unit = lines.line_for_block(id).and_then(|line| line.unit.as_ref());
            match (unit, first_kind) {
                (Some(_), Some(kind)) => lines.units().find_unit_for_block(id).is_some_and(|u| u.kind == kind),
                (Some(_), None) => false,
                (None, _) => true,
            }
        };

        match (&anchor.before, &anchor.after) {
            (None, Some(after)) if lines.line_for_block(after).is_some() && continues(after) => {
                (Some(InsertPosition::After(after.clone())), Vec::new())
            }
            (Some(before), None) if lines.line_for_block(before).is_some() && continues(before) => {
                (Some(InsertPosition::Before(before.clone())), Vec::new())
            }
            (before, after) => {
                let point = lines.find_optimal_insertion_point(before.as_ref(), after.as_ref());
                (Some(point.position), point.warnings)
            }
        }
    }

    /// addContent: insert parsed blocks.
    pub fn add_content(&self, doc: &mut BlockDocument, blocks: Vec<Block>, raw: &str, anchor: &AddAnchor) -> Result<EditReport> {
        let blocks = if blocks.is_empty() { raw_paragraph(raw) } else { blocks };
        if blocks.is_empty() {
            return Ok(EditReport::new(ToolName::AddContent, doc).with_warnings(["nothing to add".to_string()]));
        }

        let (position, warnings) = self.add_placement(doc, anchor, blocks.first().map(|b| b.kind));
        let inserted = match &position {
            None => doc.replace_all(blocks)?,
            Some(position) => doc.insert_blocks(position.clone(), blocks)?,
        };
        tracing::info!(document = %doc.document_id(), ?position, count = inserted.len(), "added content");

        let mut report = EditReport::new(ToolName::AddContent, doc).with_warnings(warnings);
        report.inserted = inserted;
        Ok(report)
    }

    /// modifyContent with `targetText`: first-occurrence substring replace.
    pub fn modify_text(&self, doc: &mut BlockDocument, target: &BlockId, target_text: &str, replacement: &str) -> Result<EditReport> {
        let block = doc.get(target).ok_or_else(|| EditError::BlockNotFound(target.clone()))?;
        let spans = inline_spans(block, target)?;
        let updated = replace_first(spans, target_text, replacement).ok_or_else(|| EditError::text_not_found(target, target_text))?;

        doc.update_content(target, BlockContent::Inline(updated))?;
        tracing::info!(document = %doc.document_id(), block = %target, "modified text");

        let mut report = EditReport::new(ToolName::ModifyContent, doc);
        report.modified.push(target.clone());
        Ok(report)
    }

    /// modifyContent without `targetText`: replace the (unit-expanded) targets.
    pub fn modify_blocks(&self, doc: &mut BlockDocument, targets: &[BlockId], blocks: Vec<Block>, raw: &str) -> Result<EditReport> {
        let blocks = if blocks.is_empty() { raw_paragraph(raw) } else { blocks };
        let removed = targets.len();
        let inserted = doc.replace_blocks(targets, or_empty_paragraph(blocks))?;
        tracing::info!(document = %doc.document_id(), replaced = removed, inserted = inserted.len(), "modified blocks");

        let mut report = EditReport::new(ToolName::ModifyContent, doc);
        report.inserted = inserted;
        report.removed = removed;
        Ok(report)
    }

    /// deleteContent by ids.
    pub fn delete_blocks(&self, doc: &mut BlockDocument, targets: &[BlockId]) -> Result<EditReport> {
        let removed = doc.remove_blocks(targets)?;
        tracing::info!(document = %doc.document_id(), removed, "deleted blocks");

        let mut report = EditReport::new(ToolName::DeleteContent, doc);
        report.removed = removed;
        Ok(report)
    }

    /// deleteContent with `targetText`. A block left without text goes too,
    /// unless it still has children; those keep an empty parent.
    pub fn delete_text(&self, doc: &mut BlockDocument, target: &BlockId, target_text: &str) -> Result<EditReport> {
        let block = doc.get(target).ok_or_else(|| EditError::BlockNotFound(target.clone()))?;
        let spans = inline_spans(block, target)?;
        let updated = remove_first(spans, target_text).ok_or_else(|| EditError::text_not_found(target, target_text))?;
        let now_empty = spans_text(&updated).trim().is_empty() && block.children.is_empty();

        let report = if now_empty {
            doc.remove_blocks(std::slice::from_ref(target))?;
            let mut report = EditReport::new(ToolName::DeleteContent, doc);
            report.removed = 1;
            report
        } else {
            doc.update_content(target, BlockContent::Inline(updated))?;
            let mut report = EditReport::new(ToolName::DeleteContent, doc);
            report.modified.push(target.clone());
            report
        };
        tracing::info!(document = %doc.document_id(), block = %target, dropped = now_empty, "deleted text");
        Ok(report)
    }

    /// modifyTable: swap the table's rows, keeping its id.
    pub fn modify_table(&self, doc: &mut BlockDocument, table: &BlockId, blocks: Vec<Block>) -> Result<EditReport> {
        let existing = doc.get(table).ok_or_else(|| EditError::BlockNotFound(table.clone()))?;
        if existing.kind != BlockKind::Table {
            return Err(EditError::NotATable(table.clone()));
        }
        let content = blocks
            .into_iter()
            .find(|b| b.kind == BlockKind::Table)
            .map(|b| b.content)
            .ok_or(EditError::NoTableInContent)?;

        doc.update_content(table, content)?;
        tracing::info!(document = %doc.document_id(), table = %table, "modified table");

        let mut report = EditReport::new(ToolName::ModifyTable, doc);
        report.modified.push(table.clone());
        Ok(report)
    }

    /// replaceAllContent: the whole document in one step.
    pub fn replace_all(&self, doc: &mut BlockDocument, blocks: Vec<Block>, raw: &str) -> Result<EditReport> {
        let blocks = if blocks.is_empty() { raw_paragraph(raw) } else { blocks };
        let removed = doc.blocks().len();
        let inserted = doc.replace_all(or_empty_paragraph(blocks))?;
        tracing::info!(document = %doc.document_id(), count = inserted.len(), "replaced all content");

        let mut report = EditReport::new(ToolName::ReplaceAllContent, doc);
        report.inserted = inserted;
        report.removed = removed;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_doc::MarkdownParser;

    fn parse(md: &str) -> Vec<Block> {
        MarkdownParser::new().parse(md)
    }

    fn item(id: &str) -> Block {
        Block::with_text(BlockKind::BulletListItem, id).id(id)
    }

    fn texts(doc: &BlockDocument) -> Vec<String> {
        doc.blocks().iter().map(|b| b.plain_text()).collect()
    }

    fn exec() -> DocumentExecutor {
        DocumentExecutor::default()
    }

    #[test]
    fn test_add_without_target_appends() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("X").id("x")]).unwrap();
        let report = exec().add_content(&mut doc, parse("Y"), "Y", &AddAnchor::default()).unwrap();
        assert_eq!(texts(&doc), vec!["X", "Y"]);
        assert_eq!(doc.blocks()[0].id, BlockId::new("x"));
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(report.version, 1);
    }

    #[test]
    fn test_add_to_blank_document_replaces() {
        let mut doc = BlockDocument::new("d");
        exec().add_content(&mut doc, parse("# T\n\nbody"), "# T\n\nbody", &AddAnchor::default()).unwrap();
        assert_eq!(texts(&doc), vec!["T", "body"]);
    }

    #[test]
    fn test_add_falls_back_to_raw_text() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("X")]).unwrap();
        exec().add_content(&mut doc, Vec::new(), "  <b>raw</b>  ", &AddAnchor::default()).unwrap();
        assert_eq!(texts(&doc), vec!["X", "<b>raw</b>"]);
    }

    #[test]
    fn test_add_after_list_item_moves_paragraph_to_unit_end() {
        let mut doc = BlockDocument::from_blocks("d", vec![item("a"), item("b"), item("c"), Block::paragraph("end")]).unwrap();
        let anchor = AddAnchor {
            after: Some(BlockId::new("a")),
            before: None,
        };
        let report = exec().add_content(&mut doc, parse("para"), "para", &anchor).unwrap();
        assert_eq!(texts(&doc), vec!["a", "b", "c", "para", "end"]);
        assert_eq!(report.warnings.len(), 1);

        // list content continues the list where asked
        exec().add_content(&mut doc, parse("- a2"), "- a2", &anchor).unwrap();
        assert_eq!(texts(&doc), vec!["a", "a2", "b", "c", "para", "end"]);
    }

    #[test]
    fn test_add_before() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("one").id("1"), Block::paragraph("two").id("2")]).unwrap();
        let anchor = AddAnchor {
            after: None,
            before: Some(BlockId::new("2")),
        };
        exec().add_content(&mut doc, parse("mid"), "mid", &anchor).unwrap();
        assert_eq!(texts(&doc), vec!["one", "mid", "two"]);
    }

    #[test]
    fn test_modify_whole_unit() {
        let items: Vec<Block> = (1..=10).map(|i| item(&format!("i{i}"))).collect();
        let mut doc = BlockDocument::from_blocks("d", items).unwrap();
        let targets = DocumentExecutor::modification_targets(&doc, &BlockId::new("i5"));
        assert_eq!(targets.len(), 10);

        exec().modify_blocks(&mut doc, &targets, parse("- x\n- y"), "- x\n- y").unwrap();
        assert_eq!(texts(&doc), vec!["x", "y"]);
        for i in 1..=10 {
            assert!(!doc.contains(&BlockId::new(format!("i{i}"))));
        }
    }

    #[test]
    fn test_modify_text_preserves_block() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("hello world").id("p")]).unwrap();
        exec().modify_text(&mut doc, &BlockId::new("p"), "world", "there").unwrap();
        assert_eq!(texts(&doc), vec!["hello there"]);
        assert_eq!(doc.blocks()[0].id, BlockId::new("p"));

        let err = exec().modify_text(&mut doc, &BlockId::new("p"), "absent", "x").unwrap_err();
        assert!(matches!(err, EditError::TextNotFound { .. }));
    }

    #[test]
    fn test_modify_with_empty_content_leaves_empty_paragraph() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("only").id("p")]).unwrap();
        exec().modify_blocks(&mut doc, &[BlockId::new("p")], Vec::new(), "").unwrap();
        assert!(doc.is_blank());
    }

    #[test]
    fn test_delete_text_drops_empty_block() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("gone").id("p"), Block::paragraph("stay").id("q")]).unwrap();
        let report = exec().delete_text(&mut doc, &BlockId::new("p"), "gone").unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(texts(&doc), vec!["stay"]);

        let report = exec().delete_text(&mut doc, &BlockId::new("q"), "ay").unwrap();
        assert_eq!(report.modified, vec![BlockId::new("q")]);
        assert_eq!(texts(&doc), vec!["st"]);
    }

    #[test]
    fn test_delete_text_keeps_parent_with_children() {
        let parent = item("Groceries").children(vec![item("milk"), item("eggs")]);
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("intro").id("p"), parent]).unwrap();

        let report = exec().delete_text(&mut doc, &BlockId::new("Groceries"), "Groceries").unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.modified, vec![BlockId::new("Groceries")]);

        let parent = doc.get(&BlockId::new("Groceries")).unwrap();
        assert!(parent.plain_text().is_empty());
        assert!(doc.contains(&BlockId::new("milk")));
        assert!(doc.contains(&BlockId::new("eggs")));
        assert_eq!(doc.block_count(), 4);
    }

    #[test]
    fn test_delete_missing_block_is_atomic() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("a").id("a"), Block::paragraph("b").id("b")]).unwrap();
        let err = exec().delete_blocks(&mut doc, &[BlockId::new("a"), BlockId::new("zzz")]).unwrap_err();
        assert!(matches!(err, EditError::Document(_)));
        assert_eq!(doc.block_count(), 2);
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_modify_table() {
        let table_md = "| a | b |\n|---|---|\n| 1 | 2 |";
        let mut table = parse(table_md).remove(0);
        table.id = BlockId::new("t");
        let mut doc = BlockDocument::from_blocks("d", vec![table, Block::paragraph("p").id("p")]).unwrap();

        exec().modify_table(&mut doc, &BlockId::new("t"), parse("| a | b |\n|---|---|\n| 3 | 4 |")).unwrap();
        assert_eq!(doc.get(&BlockId::new("t")).unwrap().plain_text(), "a | b\n3 | 4");

        let err = exec().modify_table(&mut doc, &BlockId::new("p"), parse(table_md)).unwrap_err();
        assert!(matches!(err, EditError::NotATable(_)));
        let err = exec().modify_table(&mut doc, &BlockId::new("t"), parse("no table")).unwrap_err();
        assert!(matches!(err, EditError::NoTableInContent));
    }

    #[test]
    fn test_replace_all_is_one_undo_step() {
        let mut doc = BlockDocument::from_blocks("d", vec![Block::paragraph("a"), Block::paragraph("b")]).unwrap();
        let before = doc.snapshot();
        exec().replace_all(&mut doc, parse("fresh"), "fresh").unwrap();
        assert_eq!(texts(&doc), vec!["fresh"]);
        assert!(doc.undo());
        assert_eq!(doc.snapshot(), before);
    }
}
