//! Conceptual units: runs of contiguous blocks that read as one thing.
//!
//! A bulleted list is five `bulletListItem` blocks in the tree, but "the list"
//! to a reader. Units let edits act on the list as a whole.
//!
//! Scanning in pre-order, a new unit starts whenever the block's kind, tree
//! depth or `props.level` (missing = 0) differs from the previous block's,
//! or either block is not groupable. Every block lands in exactly one unit.

use std::collections::HashMap;

use penwright_types::{Block, BlockId, BlockKind};

use super::hierarchy::flatten;

/// A maximal run of contiguous, same-kind, same-level blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptualUnit {
    pub unit_id: String,
    pub kind: BlockKind,
    /// Member blocks in document order.
    pub block_ids: Vec<BlockId>,
    /// `props.level`, or 0.
    pub level: u32,
    /// Tree depth shared by all members.
    pub depth: usize,
    /// Flat (pre-order) index of the first member.
    pub start: usize,
}

impl ConceptualUnit {
    pub fn len(&self) -> usize {
        self.block_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_ids.is_empty()
    }

    /// Flat index of the last member.
    pub fn end(&self) -> usize {
        self.start + self.len().saturating_sub(1)
    }

    /// Lists; everything else is a singleton unit.
    pub fn is_groupable(&self) -> bool {
        self.kind.is_groupable()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.block_ids.contains(id)
    }
}

/// Units for a whole document, with O(1) block → unit lookup.
#[derive(Debug, Clone, Default)]
pub struct UnitAnalysis {
    units: Vec<ConceptualUnit>,
    by_block: HashMap<BlockId, usize>,
}

impl UnitAnalysis {
    pub fn analyze(blocks: &[Block]) -> Self {
        Self::from_flat(&flatten(blocks))
    }

    /// Build from an already-flattened `(block, depth)` list.
    pub fn from_flat(flat: &[(&Block, usize)]) -> Self {
        let mut units: Vec<ConceptualUnit> = Vec::new();
        let mut by_block = HashMap::with_capacity(flat.len());
        let mut previous: Option<(BlockKind, usize, u32)> = None;

        for (index, (block, depth)) in flat.iter().enumerate() {
            let key = (block.kind, *depth, block.props.level.unwrap_or(0));
            let continues = previous == Some(key) && block.kind.is_groupable();

            match units.last_mut() {
                Some(unit) if continues => unit.block_ids.push(block.id.clone()),
                _ => units.push(ConceptualUnit {
                    unit_id: format!("{}-{}", block.kind, block.id),
                    kind: block.kind,
                    block_ids: vec![block.id.clone()],
                    level: key.2,
                    depth: *depth,
                    start: index,
                }),
            }
            by_block.insert(block.id.clone(), units.len() - 1);
            previous = Some(key);
        }

        Self { units, by_block }
    }

    pub fn units(&self) -> &[ConceptualUnit] {
        &self.units
    }

    pub fn find_unit_for_block(&self, id: &BlockId) -> Option<&ConceptualUnit> {
        self.by_block.get(id).map(|&i| &self.units[i])
    }

    /// Expand a target set so every groupable unit it touches is covered whole.
    ///
    /// Order follows first appearance; duplicates are dropped.
    pub fn expand_to_units(&self, ids: &[BlockId]) -> Vec<BlockId> {
        let mut out: Vec<BlockId> = Vec::new();
        for id in ids {
            let members = match self.find_unit_for_block(id) {
                Some(unit) if unit.is_groupable() => unit.block_ids.clone(),
                _ => vec![id.clone()],
            };
            for member in members {
                if !out.contains(&member) {
                    out.push(member);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> Block {
        Block::with_text(BlockKind::BulletListItem, id).id(id)
    }

    #[test]
    fn test_list_groups_paragraphs_do_not() {
        let blocks = vec![
            Block::paragraph("p1").id("p1"),
            Block::paragraph("p2").id("p2"),
            item("a"),
            item("b"),
            item("c"),
            Block::paragraph("p3").id("p3"),
        ];
        let analysis = UnitAnalysis::analyze(&blocks);
        let sizes: Vec<_> = analysis.units().iter().map(|u| u.len()).collect();
        assert_eq!(sizes, vec![1, 1, 3, 1]);

        let unit = analysis.find_unit_for_block(&BlockId::new("b")).unwrap();
        assert_eq!(unit.unit_id, "bulletListItem-a");
        assert_eq!(unit.start, 2);
        assert_eq!(unit.end(), 4);
        assert!(unit.is_groupable());
    }

    #[test]
    fn test_kind_and_level_split_units() {
        let mut numbered = Block::with_text(BlockKind::NumberedListItem, "n").id("n");
        numbered.props.level = Some(0);
        let mut leveled = item("l");
        leveled.props.level = Some(2);

        let blocks = vec![item("a"), numbered, item("b"), leveled];
        let analysis = UnitAnalysis::analyze(&blocks);
        assert_eq!(analysis.units().len(), 4);
    }

    #[test]
    fn test_missing_level_equals_zero() {
        let mut explicit = item("b");
        explicit.props.level = Some(0);
        let analysis = UnitAnalysis::analyze(&[item("a"), explicit]);
        assert_eq!(analysis.units().len(), 1);
    }

    #[test]
    fn test_nested_items_form_their_own_unit() {
        let blocks = vec![
            item("a").children(vec![item("a1"), item("a2")]),
            item("b"),
        ];
        let analysis = UnitAnalysis::analyze(&blocks);
        let units: Vec<Vec<&str>> = analysis
            .units()
            .iter()
            .map(|u| u.block_ids.iter().map(BlockId::as_str).collect())
            .collect();
        assert_eq!(units, vec![vec!["a"], vec!["a1", "a2"], vec!["b"]]);
        assert_eq!(analysis.units()[1].depth, 1);
    }

    #[test]
    fn test_every_block_in_exactly_one_unit() {
        let blocks = vec![
            Block::heading(1, "h").id("h"),
            item("a"),
            item("b"),
            Block::paragraph("p").id("p"),
        ];
        let analysis = UnitAnalysis::analyze(&blocks);
        let total: usize = analysis.units().iter().map(|u| u.len()).sum();
        assert_eq!(total, 4);
        for id in ["h", "a", "b", "p"] {
            assert!(analysis.find_unit_for_block(&BlockId::new(id)).is_some());
        }
    }

    #[test]
    fn test_expand_to_units() {
        let blocks = vec![Block::paragraph("p").id("p"), item("a"), item("b")];
        let analysis = UnitAnalysis::analyze(&blocks);
        let expanded = analysis.expand_to_units(&[BlockId::new("b"), BlockId::new("p")]);
        let ids: Vec<_> = expanded.iter().map(BlockId::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "p"]);
    }
}
