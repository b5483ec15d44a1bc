//! Block document with invariant-checked transactions.
//!
//! # Tree Model
//!
//! ```text
//! BlockDocument
//! ├── blocks (Vec<Block>)          # top level, document order
//! │   └── children (Vec<Block>)    # nested; pre-order = reading order
//! ├── version (u64)                # bumped on every committed change
//! └── undo (Option<Vec<Block>>)    # pre-state of the last transaction
//! ```
//!
//! # Invariants
//!
//! - the tree is acyclic (blocks own their children, so this holds by construction)
//! - every block id is unique across the whole tree
//! - the top level always holds at least one block
//!
//! Every mutation goes through [`BlockDocument::transact`], which works on a
//! scratch copy and only commits when all invariants still hold. A rejected
//! transaction leaves the document untouched.

use std::collections::HashSet;

use penwright_types::{Block, BlockContent, BlockId};

use crate::{DocumentError, Result};

/// Where to put inserted blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertPosition {
    /// Top of the document.
    Start,
    /// Bottom of the document.
    End,
    /// Immediately before this block, as its sibling.
    Before(BlockId),
    /// Immediately after this block, as its sibling.
    After(BlockId),
}

/// Index path from the top level down to a block.
type BlockPath = Vec<usize>;

fn locate_in(blocks: &[Block], id: &BlockId, path: &mut BlockPath) -> bool {
    for (i, block) in blocks.iter().enumerate() {
        path.push(i);
        if &block.id == id || locate_in(&block.children, id, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn locate(blocks: &[Block], id: &BlockId) -> Option<BlockPath> {
    let mut path = Vec::new();
    locate_in(blocks, id, &mut path).then_some(path)
}

/// The sibling list that holds the block at `path`.
fn container_mut<'a>(blocks: &'a mut Vec<Block>, path: &[usize]) -> &'a mut Vec<Block> {
    let mut current = blocks;
    for &i in &path[..path.len().saturating_sub(1)] {
        current = &mut current[i].children;
    }
    current
}

fn block_at_mut<'a>(blocks: &'a mut [Block], path: &[usize]) -> Option<&'a mut Block> {
    let (first, rest) = path.split_first()?;
    let mut current = blocks.get_mut(*first)?;
    for &i in rest {
        current = current.children.get_mut(i)?;
    }
    Some(current)
}

fn validate(blocks: &[Block]) -> Result<()> {
    if blocks.is_empty() {
        return Err(DocumentError::EmptyDocument);
    }
    let mut seen = HashSet::new();
    let mut duplicate = None;
    for block in blocks {
        block.walk(&mut |b| {
            if duplicate.is_none() && !seen.insert(&b.id) {
                duplicate = Some(b.id.clone());
            }
        });
    }
    match duplicate {
        Some(id) => Err(DocumentError::DuplicateBlock(id)),
        None => Ok(()),
    }
}

/// Scratch view handed to [`BlockDocument::transact`] closures.
pub struct Transaction<'a> {
    blocks: &'a mut Vec<Block>,
}

impl Transaction<'_> {
    /// Current (uncommitted) top-level blocks.
    pub fn blocks(&self) -> &[Block] {
        self.blocks
    }

    /// Look up a block anywhere in the tree.
    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        let path = locate(self.blocks, id)?;
        let mut current = &self.blocks[path[0]];
        for &i in &path[1..] {
            current = &current.children[i];
        }
        Some(current)
    }

    /// Mutable access to a block. Id changes are caught at commit.
    pub fn block_mut(&mut self, id: &BlockId) -> Result<&mut Block> {
        locate(self.blocks, id)
            .and_then(|path| block_at_mut(self.blocks, &path))
            .ok_or_else(|| DocumentError::BlockNotFound(id.clone()))
    }

    /// Insert blocks at a position; returns their ids.
    pub fn insert(&mut self, position: &InsertPosition, blocks: Vec<Block>) -> Result<Vec<BlockId>> {
        if blocks.is_empty() {
            return Err(DocumentError::NoBlocks);
        }
        let ids = blocks.iter().map(|b| b.id.clone()).collect();
        let (container, index) = match position {
            InsertPosition::Start => (&mut *self.blocks, 0),
            InsertPosition::End => {
                let len = self.blocks.len();
                (&mut *self.blocks, len)
            }
            InsertPosition::Before(anchor) | InsertPosition::After(anchor) => {
                let path = locate(self.blocks, anchor)
                    .ok_or_else(|| DocumentError::BlockNotFound(anchor.clone()))?;
                let mut index = *path.last().unwrap_or(&0);
                if matches!(position, InsertPosition::After(_)) {
                    index += 1;
                }
                (container_mut(self.blocks, &path), index)
            }
        };
        container.splice(index..index, blocks);
        Ok(ids)
    }

    /// Remove blocks (with their children); returns how many subtrees went.
    pub fn remove(&mut self, ids: &[BlockId]) -> Result<usize> {
        let mut paths = ids
            .iter()
            .map(|id| locate(self.blocks, id).ok_or_else(|| DocumentError::BlockNotFound(id.clone())))
            .collect::<Result<Vec<_>>>()?;
        paths.sort();
        paths.dedup();

        // Descendants of another target disappear with their ancestor.
        let mut roots: Vec<BlockPath> = Vec::new();
        for path in paths {
            if !roots.iter().any(|r| path.starts_with(r)) {
                roots.push(path);
            }
        }

        // Removing from the back keeps the remaining paths valid.
        for path in roots.iter().rev() {
            let index = *path.last().unwrap_or(&0);
            container_mut(self.blocks, path).remove(index);
        }
        Ok(roots.len())
    }

    /// Replace a set of blocks; the new blocks take the place of the target
    /// that comes first in document order.
    pub fn replace(&mut self, targets: &[BlockId], blocks: Vec<Block>) -> Result<Vec<BlockId>> {
        let anchor = targets
            .iter()
            .map(|id| locate(self.blocks, id).ok_or_else(|| DocumentError::BlockNotFound(id.clone())))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .min()
            .ok_or(DocumentError::NoBlocks)?;

        self.remove(targets)?;

        let ids: Vec<BlockId> = blocks.iter().map(|b| b.id.clone()).collect();
        let index = *anchor.last().unwrap_or(&0);
        let container = container_mut(self.blocks, &anchor);
        let index = index.min(container.len());
        container.splice(index..index, blocks);
        Ok(ids)
    }

    /// Swap a block's content, keeping id, kind, props and children.
    pub fn update_content(&mut self, id: &BlockId, content: BlockContent) -> Result<()> {
        self.block_mut(id)?.content = content;
        Ok(())
    }

    /// Replace the whole document.
    pub fn replace_all(&mut self, blocks: Vec<Block>) -> Vec<BlockId> {
        let ids = blocks.iter().map(|b| b.id.clone()).collect();
        *self.blocks = blocks;
        ids
    }
}

/// A hierarchical rich-text document.
#[derive(Clone, Debug)]
pub struct BlockDocument {
    /// Document ID (used as the persistence key).
    document_id: String,

    /// Top-level blocks in document order.
    blocks: Vec<Block>,

    /// Document version (incremented on each committed change).
    version: u64,

    /// Pre-state of the last committed transaction.
    undo: Option<Vec<Block>>,
}

impl BlockDocument {
    /// Create a document holding a single empty paragraph.
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            blocks: vec![Block::paragraph("")],
            version: 0,
            undo: None,
        }
    }

    /// Load a document from existing blocks, checking invariants.
    pub fn from_blocks(document_id: impl Into<String>, blocks: Vec<Block>) -> Result<Self> {
        validate(&blocks)?;
        Ok(Self {
            document_id: document_id.into(),
            blocks,
            version: 0,
            undo: None,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Get the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Top-level blocks in document order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Owned copy of the block array (the persisted form).
    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    /// All blocks in pre-order.
    pub fn flat_blocks(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        for block in &self.blocks {
            block.walk(&mut |b| out.push(b));
        }
        out
    }

    /// Total number of blocks, nested ones included.
    pub fn block_count(&self) -> usize {
        self.blocks.iter().map(Block::subtree_len).sum()
    }

    /// Total characters across every block's own text.
    pub fn char_count(&self) -> usize {
        self.flat_blocks().iter().map(|b| b.char_count()).sum()
    }

    /// Look up a block anywhere in the tree.
    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        let path = locate(&self.blocks, id)?;
        let mut current = &self.blocks[path[0]];
        for &i in &path[1..] {
            current = &current.children[i];
        }
        Some(current)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.get(id).is_some()
    }

    /// True for the "fresh document" state: a single empty paragraph.
    pub fn is_blank(&self) -> bool {
        match self.blocks.as_slice() {
            [only] => only.children.is_empty() && only.is_empty(),
            _ => false,
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run a mutation atomically.
    ///
    /// The closure works on a scratch copy. If it fails, or the result breaks
    /// an invariant, the document is left exactly as it was. A committed change
    /// becomes the single undo step.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut scratch = self.blocks.clone();
        let out = f(&mut Transaction { blocks: &mut scratch })?;
        validate(&scratch)?;

        if scratch != self.blocks {
            let previous = std::mem::replace(&mut self.blocks, scratch);
            self.undo = Some(previous);
            self.version += 1;
            tracing::debug!(document = %self.document_id, version = self.version, "committed transaction");
        }
        Ok(out)
    }

    /// Insert blocks at a position.
    pub fn insert_blocks(&mut self, position: InsertPosition, blocks: Vec<Block>) -> Result<Vec<BlockId>> {
        self.transact(|tx| tx.insert(&position, blocks))
    }

    /// Replace target blocks with new ones.
    pub fn replace_blocks(&mut self, targets: &[BlockId], blocks: Vec<Block>) -> Result<Vec<BlockId>> {
        self.transact(|tx| tx.replace(targets, blocks))
    }

    /// Remove blocks and their children.
    pub fn remove_blocks(&mut self, ids: &[BlockId]) -> Result<usize> {
        self.transact(|tx| tx.remove(ids))
    }

    /// Swap the content of one block.
    pub fn update_content(&mut self, id: &BlockId, content: BlockContent) -> Result<()> {
        self.transact(|tx| tx.update_content(id, content))
    }

    /// Replace the whole document.
    pub fn replace_all(&mut self, blocks: Vec<Block>) -> Result<Vec<BlockId>> {
        self.transact(|tx| Ok(tx.replace_all(blocks)))
    }

    /// Whether a committed change can be reverted.
    pub fn can_undo(&self) -> bool {
        self.undo.is_some()
    }

    /// Revert the last committed transaction. Returns false when there is none.
    pub fn undo(&mut self) -> bool {
        match self.undo.take() {
            Some(previous) => {
                self.blocks = previous;
                self.version += 1;
                tracing::debug!(document = %self.document_id, version = self.version, "undid transaction");
                true
            }
            None => false,
        }
    }
}
