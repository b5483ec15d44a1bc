//! Flattened hierarchy view of a block tree.

use penwright_types::{Block, BlockId};

/// One block's position in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyEntry {
    pub block_id: BlockId,
    /// Tree depth; top-level blocks are 0.
    pub level: usize,
    pub parent_id: Option<BlockId>,
    /// Position in the pre-order walk.
    pub index: usize,
    /// Position among the block's siblings.
    pub position_in_parent: usize,
}

/// Pre-order walk of `blocks`. O(n); an empty slice yields an empty list.
pub fn analyze_hierarchy(blocks: &[Block]) -> Vec<HierarchyEntry> {
    let mut entries = Vec::new();
    walk(blocks, 0, None, &mut entries);
    entries
}

/// Blocks in pre-order, paired with their depth.
pub fn flatten(blocks: &[Block]) -> Vec<(&Block, usize)> {
    fn go<'a>(blocks: &'a [Block], depth: usize, out: &mut Vec<(&'a Block, usize)>) {
        for block in blocks {
            out.push((block, depth));
            go(&block.children, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    go(blocks, 0, &mut out);
    out
}

fn walk(blocks: &[Block], level: usize, parent: Option<&BlockId>, out: &mut Vec<HierarchyEntry>) {
    for (position, block) in blocks.iter().enumerate() {
        out.push(HierarchyEntry {
            block_id: block.id.clone(),
            level,
            parent_id: parent.cloned(),
            index: out.len(),
            position_in_parent: position,
        });
        walk(&block.children, level + 1, Some(&block.id), out);
    }
}
