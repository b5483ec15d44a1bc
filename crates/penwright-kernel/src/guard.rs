//! Content preservation guard.
//!
//! Estimates how much existing content an edit would destroy and decides
//! allow / allow-with-warning / block before anything is mutated. All checks
//! are pure functions of the current document and the proposed payload.
//!
//! | Operation    | Blocks when                                                     |
//! |--------------|-----------------------------------------------------------------|
//! | modification | large target replaced by disproportionately little content,     |
//! |              | or special blocks replaced by less than half their size         |
//! | deletion     | every block would go, or more than the batch-delete percentage  |
//! | insertion    | the payload carries script / iframe / event-handler markup      |

use std::collections::HashSet;

use penwright_doc::BlockDocument;
use penwright_types::{Block, BlockId};
use serde::Serialize;

use crate::config::ContentPreservationConfig;

/// Special blocks are protected unless replaced by at least this ratio.
const SPECIAL_BLOCK_MIN_RATIO: f64 = 0.5;

/// Quantified size of what an operation touches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentImpact {
    pub affected_chars: usize,
    pub affected_blocks: usize,
    pub total_chars: usize,
    pub total_blocks: usize,
    /// `affected_chars` as a percentage of the document's characters.
    pub char_percent: f64,
    /// `affected_blocks` as a percentage of the document's blocks.
    pub block_percent: f64,
    pub new_chars: usize,
    /// `new_chars / affected_chars`; 1.0 when nothing is affected.
    pub replacement_ratio: f64,
    pub special_blocks: usize,
}

/// What the assistant could do instead of a blocked (or risky) edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SuggestedAction {
    TargetSpecificText,
    ReduceScope,
    PreserveSpecialBlocks,
    DeleteInBatches,
    ReplaceAllInstead,
    SplitInsertion,
    RemoveUnsafeMarkup,
}

impl SuggestedAction {
    pub fn message(&self) -> &'static str {
        match self {
            SuggestedAction::TargetSpecificText => "use targetText to change only the part that needs editing",
            SuggestedAction::ReduceScope => "modify a smaller section at a time",
            SuggestedAction::PreserveSpecialBlocks => {
                "edit tables with modifyTable and keep images and files in the new content"
            }
            SuggestedAction::DeleteInBatches => "delete fewer blocks at a time",
            SuggestedAction::ReplaceAllInstead => "use replaceAllContent to start the document over",
            SuggestedAction::SplitInsertion => "add content in smaller pieces",
            SuggestedAction::RemoveUnsafeMarkup => "remove script, iframe and event-handler markup",
        }
    }
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Guard decision. `is_allowed` is the control-flow signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreservationResult {
    pub is_allowed: bool,
    pub should_warn: bool,
    pub error_message: Option<String>,
    pub warning_message: Option<String>,
    pub impact: ContentImpact,
    pub suggested_action: Option<SuggestedAction>,
}

impl PreservationResult {
    fn allow(impact: ContentImpact) -> Self {
        Self {
            is_allowed: true,
            should_warn: false,
            error_message: None,
            warning_message: None,
            impact,
            suggested_action: None,
        }
    }

    fn warn(impact: ContentImpact, message: String, action: Option<SuggestedAction>) -> Self {
        Self {
            should_warn: true,
            warning_message: Some(message),
            suggested_action: action,
            ..Self::allow(impact)
        }
    }

    fn block(impact: ContentImpact, message: String, action: SuggestedAction) -> Self {
        Self {
            is_allowed: false,
            should_warn: false,
            error_message: Some(message),
            warning_message: None,
            impact,
            suggested_action: Some(action),
        }
    }
}

/// Validates modify / delete / insert proposals against the thresholds.
#[derive(Debug, Clone, Default)]
pub struct ContentGuard {
    config: ContentPreservationConfig,
}

/// Distinct blocks in the subtrees rooted at `ids`, in first-seen order.
fn affected_subtrees<'a>(doc: &'a BlockDocument, ids: &[BlockId]) -> Vec<&'a Block> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if let Some(root) = doc.get(id) {
            root.walk(&mut |b| {
                if seen.insert(&b.id) {
                    out.push(b);
                }
            });
        }
    }
    out
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl ContentGuard {
    pub fn new(config: ContentPreservationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContentPreservationConfig {
        &self.config
    }

    fn impact(&self, doc: &BlockDocument, blocks: &[&Block], affected_chars: usize, new_chars: usize) -> ContentImpact {
        let total_chars = doc.char_count();
        let total_blocks = doc.block_count();
        ContentImpact {
            affected_chars,
            affected_blocks: blocks.len(),
            total_chars,
            total_blocks,
            char_percent: percent(affected_chars, total_chars),
            block_percent: percent(blocks.len(), total_blocks),
            new_chars,
            replacement_ratio: if affected_chars == 0 {
                1.0
            } else {
                new_chars as f64 / affected_chars as f64
            },
            special_blocks: blocks.iter().filter(|b| b.kind.is_special()).count(),
        }
    }

    /// Check replacing `targets` (already unit-expanded) with `new_content`.
    ///
    /// With `target_text`, only that substring of the single target counts as
    /// affected.
    pub fn validate_modification(
        &self,
        doc: &BlockDocument,
        targets: &[BlockId],
        target_text: Option<&str>,
        new_content: &str,
    ) -> PreservationResult {
        let blocks = affected_subtrees(doc, targets);
        let affected_chars = match target_text {
            Some(text) => text.chars().count(),
            None => blocks.iter().map(|b| b.char_count()).sum(),
        };
        let new_chars = new_content.trim().chars().count();
        let impact = self.impact(doc, &blocks, affected_chars, new_chars);
        let config = &self.config;

        if impact.affected_chars >= config.min_content_threshold
            && impact.replacement_ratio < config.max_replacement_ratio
        {
            let action = if target_text.is_none() {
                SuggestedAction::TargetSpecificText
            } else {
                SuggestedAction::ReduceScope
            };
            tracing::warn!(
                affected = impact.affected_chars,
                new = impact.new_chars,
                ratio = impact.replacement_ratio,
                "modification blocked: disproportionate replacement"
            );
            return PreservationResult::block(
                impact.clone(),
                format!(
                    "This edit would replace {} characters with only {} (ratio {:.3}, minimum {}).",
                    impact.affected_chars, impact.new_chars, impact.replacement_ratio, config.max_replacement_ratio
                ),
                action,
            );
        }

        if config.protect_special_blocks
            && impact.special_blocks > 0
            && impact.replacement_ratio < SPECIAL_BLOCK_MIN_RATIO
        {
            tracing::warn!(special = impact.special_blocks, ratio = impact.replacement_ratio, "modification blocked: special blocks");
            return PreservationResult::block(
                impact.clone(),
                format!(
                    "This edit would replace {} table, image or file block(s) with much less content.",
                    impact.special_blocks
                ),
                SuggestedAction::PreserveSpecialBlocks,
            );
        }

        let warn = &config.warnings;
        if impact.char_percent > warn.modify_percent || impact.affected_chars > warn.modify_chars {
            let message = format!(
                "This edit changes {} characters ({:.0}% of the document).",
                impact.affected_chars, impact.char_percent
            );
            return PreservationResult::warn(impact, message, Some(SuggestedAction::ReduceScope));
        }

        PreservationResult::allow(impact)
    }

    /// Check deleting `targets`, or `target_text` out of the single target.
    ///
    /// A substring deletion only counts its block as removed when the text is
    /// the block's whole content and the block has no children; a parent
    /// keeps its place (and its children) with empty text.
    pub fn validate_deletion(&self, doc: &BlockDocument, targets: &[BlockId], target_text: Option<&str>) -> PreservationResult {
        let (blocks, affected_chars) = match target_text {
            Some(text) => {
                let husk = targets
                    .first()
                    .and_then(|id| doc.get(id))
                    .filter(|b| b.children.is_empty() && b.plain_text().trim() == text.trim());
                match husk {
                    Some(block) => (vec![block], block.char_count()),
                    None => (Vec::new(), text.chars().count()),
                }
            }
            None => {
                let blocks = affected_subtrees(doc, targets);
                let chars = blocks.iter().map(|b| b.char_count()).sum();
                (blocks, chars)
            }
        };
        let impact = self.impact(doc, &blocks, affected_chars, 0);
        let config = &self.config;

        if impact.affected_blocks > 0 && impact.affected_blocks >= impact.total_blocks {
            tracing::warn!(blocks = impact.affected_blocks, "deletion blocked: would empty the document");
            return PreservationResult::block(
                impact,
                "This would delete every block; a document must keep at least one.".to_string(),
                SuggestedAction::ReplaceAllInstead,
            );
        }

        if impact.block_percent > config.max_batch_delete_percent {
            tracing::warn!(percent = impact.block_percent, "deletion blocked: batch too large");
            let message = format!(
                "This would delete {} of {} blocks ({:.0}%, limit {:.0}%).",
                impact.affected_blocks, impact.total_blocks, impact.block_percent, config.max_batch_delete_percent
            );
            return PreservationResult::block(impact, message, SuggestedAction::DeleteInBatches);
        }

        let warn = &config.warnings;
        if impact.special_blocks > 0 {
            let message = format!("Deleting {} table, image or file block(s).", impact.special_blocks);
            return PreservationResult::warn(impact, message, None);
        }
        if impact.char_percent > warn.delete_percent || impact.affected_chars > warn.delete_chars {
            let message = format!(
                "Deleting {} characters ({:.0}% of the document).",
                impact.affected_chars, impact.char_percent
            );
            return PreservationResult::warn(impact, message, Some(SuggestedAction::DeleteInBatches));
        }

        PreservationResult::allow(impact)
    }

    /// Check inserting `new_content`. Insertion never destroys content, so
    /// only unsafe markup blocks it.
    pub fn validate_insertion(&self, doc: &BlockDocument, new_content: &str) -> PreservationResult {
        let new_chars = new_content.trim().chars().count();
        let impact = self.impact(doc, &[], 0, new_chars);

        if let Some(signature) = unsafe_signature(new_content) {
            tracing::warn!(signature, "insertion blocked: unsafe markup");
            return PreservationResult::block(
                impact,
                format!("The new content contains unsafe markup ({}).", signature),
                SuggestedAction::RemoveUnsafeMarkup,
            );
        }

        if new_chars > self.config.warnings.insert_chars {
            let message = format!("Inserting a large amount of content ({} characters).", new_chars);
            return PreservationResult::warn(impact, message, Some(SuggestedAction::SplitInsertion));
        }

        PreservationResult::allow(impact)
    }
}

/// First unsafe markup signature found in `content`, if any.
fn unsafe_signature(content: &str) -> Option<&'static str> {
    let lower = content.to_lowercase();
    if lower.contains("<script") {
        Some("<script>")
    } else if lower.contains("<iframe") {
        Some("<iframe>")
    } else if lower.contains("javascript:") {
        Some("javascript: URL")
    } else if has_inline_handler(&lower) {
        Some("inline event handler")
    } else {
        None
    }
}

/// `on<name>=` attribute inside an HTML-looking tag.
fn has_inline_handler(lower: &str) -> bool {
    for tag in lower.split('<').skip(1) {
        let tag = tag.split('>').next().unwrap_or_default();
        let bytes = tag.as_bytes();
        for (i, pair) in bytes.windows(2).enumerate() {
            if pair != b"on" || i == 0 || !bytes[i - 1].is_ascii_whitespace() {
                continue;
            }
            let rest = &tag[i + 2..];
            let name_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
            if name_len > 0 && rest[name_len..].trim_start().starts_with('=') {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use penwright_types::{BlockContent, BlockKind, TableContent};

    fn doc(blocks: Vec<Block>) -> BlockDocument {
        BlockDocument::from_blocks("doc", blocks).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<BlockId> {
        list.iter().map(|s| BlockId::new(*s)).collect()
    }

    fn guard() -> ContentGuard {
        ContentGuard::default()
    }

    #[test]
    fn test_large_paragraph_wiped_is_blocked() {
        let d = doc(vec![Block::paragraph("x".repeat(400)).id("p")]);
        let result = guard().validate_modification(&d, &ids(&["p"]), None, "0123456789");
        assert!(!result.is_allowed);
        assert!((result.impact.replacement_ratio - 0.025).abs() < 1e-9);
        assert_eq!(result.suggested_action, Some(SuggestedAction::TargetSpecificText));
        assert!(result.error_message.is_some());
    }

    #[test]
    fn test_small_target_is_never_ratio_protected() {
        let d = doc(vec![Block::paragraph("x".repeat(99)).id("p"), Block::paragraph("y".repeat(500))]);
        let result = guard().validate_modification(&d, &ids(&["p"]), None, "z");
        assert!(result.is_allowed);
    }

    #[test]
    fn test_modification_rule_matches_thresholds() {
        let config = ContentPreservationConfig::default();
        for affected in [50usize, 100, 150, 400] {
            for new in [0usize, 5, 9, 10, 15, 40, 120] {
                let d = doc(vec![
                    Block::paragraph("a".repeat(affected)).id("p"),
                    Block::paragraph("b".repeat(5000)),
                ]);
                let result = guard().validate_modification(&d, &ids(&["p"]), None, &"n".repeat(new));
                let ratio = new as f64 / affected as f64;
                let blocked = affected >= config.min_content_threshold && ratio < config.max_replacement_ratio;
                assert_eq!(result.is_allowed, !blocked, "affected={affected} new={new}");
            }
        }
    }

    #[test]
    fn test_empty_target_ratio_is_one() {
        let d = doc(vec![Block::paragraph("").id("p")]);
        let result = guard().validate_modification(&d, &ids(&["p"]), None, "");
        assert!(result.is_allowed);
        assert_eq!(result.impact.replacement_ratio, 1.0);
    }

    #[test]
    fn test_special_blocks_protected() {
        let mut table = Block::new(BlockKind::Table).id("t");
        table.content = BlockContent::Table(TableContent::default());
        let mut image = Block::new(BlockKind::Image).id("img");
        image.props.caption = Some("diagram of the pipeline".into());
        let d = doc(vec![Block::paragraph("intro"), image]);

        let result = guard().validate_modification(&d, &ids(&["img"]), None, "pic");
        assert!(!result.is_allowed);
        assert_eq!(result.suggested_action, Some(SuggestedAction::PreserveSpecialBlocks));

        let lenient = ContentGuard::new(ContentPreservationConfig {
            protect_special_blocks: false,
            ..Default::default()
        });
        assert!(lenient.validate_modification(&d, &ids(&["img"]), None, "pic").is_allowed);

        // an empty table has nothing to lose
        let d = doc(vec![Block::paragraph("intro"), table]);
        assert!(guard().validate_modification(&d, &ids(&["t"]), None, "| a |").is_allowed);
    }

    #[test]
    fn test_modification_warns_on_large_share() {
        let d = doc(vec![Block::paragraph("a".repeat(60)).id("p"), Block::paragraph("b".repeat(60))]);
        let result = guard().validate_modification(&d, &ids(&["p"]), None, "c".repeat(50).as_str());
        assert!(result.is_allowed);
        assert!(result.should_warn);
        assert!(result.warning_message.is_some());
    }

    #[test]
    fn test_target_text_limits_impact() {
        let d = doc(vec![Block::paragraph("x".repeat(400)).id("p")]);
        let result = guard().validate_modification(&d, &ids(&["p"]), Some("xxxx"), "y");
        assert!(result.is_allowed);
        assert_eq!(result.impact.affected_chars, 4);
    }

    #[test]
    fn test_delete_only_block_is_blocked() {
        let d = BlockDocument::new("doc");
        let only = d.blocks()[0].id.clone();
        let result = guard().validate_deletion(&d, &[only], None);
        assert!(!result.is_allowed);
        assert_eq!(result.suggested_action, Some(SuggestedAction::ReplaceAllInstead));
    }

    #[test]
    fn test_deletion_rule_matches_thresholds() {
        let blocks: Vec<Block> = (0..10).map(|i| Block::paragraph(format!("p{i}")).id(format!("p{i}"))).collect();
        let d = doc(blocks);
        let all: Vec<BlockId> = (0..10).map(|i| BlockId::new(format!("p{i}"))).collect();
        for n in 1..=10 {
            let result = guard().validate_deletion(&d, &all[..n], None);
            let blocked = n == 10 || (n as f64 / 10.0 * 100.0) > 50.0;
            assert_eq!(result.is_allowed, !blocked, "n={n}");
        }
    }

    #[test]
    fn test_deletion_counts_descendants() {
        let d = doc(vec![
            Block::with_text(BlockKind::BulletListItem, "parent")
                .id("a")
                .children(vec![Block::with_text(BlockKind::BulletListItem, "child")]),
            Block::paragraph("keep"),
        ]);
        let result = guard().validate_deletion(&d, &ids(&["a"]), None);
        assert_eq!(result.impact.affected_blocks, 2);
        assert!(!result.is_allowed);
    }

    #[test]
    fn test_substring_deletion() {
        let d = doc(vec![Block::paragraph("hello world").id("p"), Block::paragraph("other")]);
        let partial = guard().validate_deletion(&d, &ids(&["p"]), Some("world"));
        assert!(partial.is_allowed);
        assert_eq!(partial.impact.affected_blocks, 0);

        let whole = guard().validate_deletion(&d, &ids(&["p"]), Some("hello world"));
        assert_eq!(whole.impact.affected_blocks, 1);
    }

    #[test]
    fn test_emptying_a_parent_only_counts_its_text() {
        let parent = Block::with_text(BlockKind::BulletListItem, "Groceries").id("g").children(vec![
            Block::with_text(BlockKind::BulletListItem, "milk").id("c1"),
            Block::with_text(BlockKind::BulletListItem, "eggs").id("c2"),
        ]);
        let d = doc(vec![Block::paragraph("intro").id("p"), parent]);
        let result = guard().validate_deletion(&d, &ids(&["g"]), Some("Groceries"));
        assert!(result.is_allowed);
        assert_eq!(result.impact.affected_blocks, 0);
        assert_eq!(result.impact.affected_chars, "Groceries".len());
    }

    #[test]
    fn test_deleting_special_block_warns() {
        let mut image = Block::new(BlockKind::Image).id("img");
        image.props.url = Some("a.png".into());
        let d = doc(vec![image, Block::paragraph("a"), Block::paragraph("b")]);
        let result = guard().validate_deletion(&d, &ids(&["img"]), None);
        assert!(result.is_allowed);
        assert!(result.should_warn);
    }

    #[test]
    fn test_insertion() {
        let d = BlockDocument::new("doc");
        let g = guard();
        assert!(g.validate_insertion(&d, "Plain **markdown**").is_allowed);
        assert!(!g.validate_insertion(&d, "hi <SCRIPT>alert(1)</script>").is_allowed);
        assert!(!g.validate_insertion(&d, "[x](javascript:alert(1))").is_allowed);
        assert!(!g.validate_insertion(&d, "<img src=x onerror = \"boom()\">").is_allowed);
        assert!(!g.validate_insertion(&d, "<iframe src=\"x\"></iframe>").is_allowed);
        // prose mentioning "on" is fine
        assert!(g.validate_insertion(&d, "Turn it on = enable it").is_allowed);

        let big = g.validate_insertion(&d, &"a".repeat(5001));
        assert!(big.is_allowed);
        assert!(big.should_warn);
        assert_eq!(big.suggested_action, Some(SuggestedAction::SplitInsertion));
    }
}
