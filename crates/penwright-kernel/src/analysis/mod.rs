//! Structural analysis of a block document.
//!
//! ```text
//! Vec<Block> (tree)
//!     │ pre-order walk
//!     ▼
//! hierarchy  { block_id, level, parent_id, index }
//!     │ group contiguous same-kind runs
//!     ▼
//! units      { unit_id, kind, block_ids, level }
//!     │ one line per block
//!     ▼
//! lines      { line_number, content, unit info }   → targeting queries
//! ```
//!
//! Everything here is a pure function of the tree and is recomputed per
//! tool call; nothing is cached across mutations.

pub mod hierarchy;
pub mod lines;
pub mod units;

pub use hierarchy::{HierarchyEntry, analyze_hierarchy, flatten};
pub use lines::{
    ContentSearchOptions, DocumentLines, InsertionPoint, LineRange, LineResolution, LineTarget,
    RelativePosition, UnitInfo,
};
pub use units::{ConceptualUnit, UnitAnalysis};
