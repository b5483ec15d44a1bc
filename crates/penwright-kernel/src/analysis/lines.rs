//! Line target resolver.
//!
//! Presents the document as an ordered list of "lines", one per block in
//! pre-order, and answers the three targeting queries tool calls need:
//! content search, absolute line number and relative offset from a
//! reference block.
//!
//! Queries never fail hard. When a request has to be adjusted (offset too
//! large, out of bounds, would leave its list) the result is clamped and a
//! warning is attached so the caller can surface it.

use std::collections::HashMap;

use penwright_doc::InsertPosition;
use penwright_types::{Block, BlockId, BlockKind, Direction, LineSelector};
use regex::RegexBuilder;

use super::hierarchy::{analyze_hierarchy, flatten};
use super::units::{ConceptualUnit, UnitAnalysis};
use crate::config::ResolverConfig;

/// Where a line sits within its (groupable) unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub unit_id: String,
    pub position_in_unit: usize,
    pub total_in_unit: usize,
}

/// Ephemeral per-block view used for targeting. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTarget {
    pub block_id: BlockId,
    /// 0-based, in pre-order.
    pub line_number: usize,
    /// Plain text of the block (children excluded).
    pub content: String,
    pub block_type: BlockKind,
    pub is_empty: bool,
    /// Tree depth.
    pub level: usize,
    pub parent_id: Option<BlockId>,
    /// Present when the block is a list item.
    pub unit: Option<UnitInfo>,
}

/// Options for [`DocumentLines::find_lines_by_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSearchOptions {
    pub case_sensitive: bool,
    /// Whole line must equal the query (both trimmed).
    pub exact_match: bool,
    /// Substring match; when false, the query must match whole words.
    pub include_partial_matches: bool,
    pub max_results: usize,
}

impl Default for ContentSearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            exact_match: false,
            include_partial_matches: true,
            max_results: 10,
        }
    }
}

/// A relative positioning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePosition {
    pub reference_block_id: BlockId,
    pub direction: Direction,
    pub offset: usize,
    pub respect_unit_boundaries: bool,
}

/// Outcome of a single-line query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineResolution {
    pub line: Option<LineTarget>,
    pub warnings: Vec<String>,
}

/// Outcome of [`DocumentLines::get_lines_in_range`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineRange {
    pub lines: Vec<LineTarget>,
    /// Units the range cuts through rather than covering whole.
    pub partial_units: Vec<String>,
    pub warnings: Vec<String>,
}

/// Outcome of [`DocumentLines::find_optimal_insertion_point`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    pub position: InsertPosition,
    pub warnings: Vec<String>,
}

/// One analysis pass over a document: hierarchy, units and lines.
#[derive(Debug, Clone)]
pub struct DocumentLines {
    lines: Vec<LineTarget>,
    units: UnitAnalysis,
    by_block: HashMap<BlockId, usize>,
    max_search_distance: usize,
}

impl DocumentLines {
    pub fn analyze(blocks: &[Block], config: &ResolverConfig) -> Self {
        let flat = flatten(blocks);
        let hierarchy = analyze_hierarchy(blocks);
        let units = UnitAnalysis::from_flat(&flat);

        let mut lines = Vec::with_capacity(flat.len());
        let mut by_block = HashMap::with_capacity(flat.len());
        for ((block, _), entry) in flat.iter().zip(hierarchy) {
            let unit = units
                .find_unit_for_block(&block.id)
                .filter(|u| u.is_groupable())
                .map(|u| UnitInfo {
                    unit_id: u.unit_id.clone(),
                    position_in_unit: entry.index - u.start,
                    total_in_unit: u.len(),
                });
            by_block.insert(block.id.clone(), entry.index);
            lines.push(LineTarget {
                block_id: entry.block_id,
                line_number: entry.index,
                content: block.plain_text(),
                block_type: block.kind,
                is_empty: block.is_empty(),
                level: entry.level,
                parent_id: entry.parent_id,
                unit,
            });
        }

        Self {
            lines,
            units,
            by_block,
            max_search_distance: config.max_search_distance,
        }
    }

    pub fn lines(&self) -> &[LineTarget] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn units(&self) -> &UnitAnalysis {
        &self.units
    }

    pub fn line_for_block(&self, id: &BlockId) -> Option<&LineTarget> {
        self.by_block.get(id).map(|&i| &self.lines[i])
    }

    /// The groupable unit a line belongs to, if any.
    fn unit_of(&self, line: &LineTarget) -> Option<&ConceptualUnit> {
        line.unit.as_ref()?;
        self.units.find_unit_for_block(&line.block_id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Lines whose content matches `text`, in document order.
    pub fn find_lines_by_content(&self, text: &str, options: &ContentSearchOptions) -> Vec<&LineTarget> {
        let query = text.trim();
        if query.is_empty() || options.max_results == 0 {
            return Vec::new();
        }
        let fold = |s: &str| {
            if options.case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        let needle = fold(query);

        let word = if options.exact_match || options.include_partial_matches {
            None
        } else {
            let pattern = format!(r"\b{}\b", regex::escape(query));
            match RegexBuilder::new(&pattern).case_insensitive(!options.case_sensitive).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(error = %e, "could not build word matcher");
                    return Vec::new();
                }
            }
        };

        self.lines
            .iter()
            .filter(|line| {
                if options.exact_match {
                    fold(line.content.trim()) == needle
                } else if let Some(re) = &word {
                    re.is_match(&line.content)
                } else {
                    fold(&line.content).contains(&needle)
                }
            })
            .take(options.max_results)
            .collect()
    }

    /// The line at `line_number`, or `None` outside `[0, line_count)`.
    pub fn find_line_by_position(&self, line_number: usize) -> Option<&LineTarget> {
        self.lines.get(line_number)
    }

    /// Offset from a reference line.
    ///
    /// Clamps in order: search distance, document bounds, then the
    /// reference's unit when `respect_unit_boundaries` is set. The unit clamp
    /// runs last, so it wins when the clamps disagree. Every clamp adds a
    /// warning.
    pub fn find_line_by_relative_position(&self, request: &RelativePosition) -> LineResolution {
        let mut warnings = Vec::new();
        let Some(reference) = self.line_for_block(&request.reference_block_id) else {
            warnings.push(format!(
                "reference block {} not found; no line resolved",
                request.reference_block_id
            ));
            return LineResolution { line: None, warnings };
        };

        let mut offset = request.offset;
        if offset > self.max_search_distance {
            warnings.push(format!(
                "offset {} exceeds max search distance {}; clamped",
                offset, self.max_search_distance
            ));
            offset = self.max_search_distance;
        }

        let origin = reference.line_number as i64;
        let mut target = match request.direction {
            Direction::Before => origin - offset as i64,
            Direction::After => origin + offset as i64,
        };

        let last = self.lines.len() as i64 - 1;
        if target < 0 || target > last {
            let clamped = target.clamp(0, last);
            warnings.push(format!(
                "line {} is outside the document (0..={}); clamped to {}",
                target, last, clamped
            ));
            target = clamped;
        }

        if request.respect_unit_boundaries {
            if let Some(unit) = self.unit_of(reference) {
                let (start, end) = (unit.start as i64, unit.end() as i64);
                if target < start || target > end {
                    let clamped = target.clamp(start, end);
                    warnings.push(format!(
                        "line {} leaves unit {} (lines {}..={}); clamped to {}",
                        target, unit.unit_id, start, end, clamped
                    ));
                    target = clamped;
                }
            }
        }

        if !warnings.is_empty() {
            tracing::debug!(reference = %request.reference_block_id, target, ?warnings, "relative position adjusted");
        }
        LineResolution {
            line: self.lines.get(target as usize).cloned(),
            warnings,
        }
    }

    /// Lines `start..=end`, clamped into the document (swapped if reversed).
    pub fn get_lines_in_range(&self, start: usize, end: usize) -> LineRange {
        let mut range = LineRange::default();
        if self.lines.is_empty() {
            range.warnings.push("document has no lines".to_string());
            return range;
        }

        let (mut start, mut end) = (start, end);
        if start > end {
            range.warnings.push(format!("range {}..={} reversed; swapped", start, end));
            std::mem::swap(&mut start, &mut end);
        }
        let last = self.lines.len() - 1;
        if end > last {
            range.warnings.push(format!("range end {} clamped to {}", end, last));
            end = last;
        }
        if start > last {
            range.warnings.push(format!("range start {} clamped to {}", start, last));
            start = last;
        }

        range.lines = self.lines[start..=end].to_vec();
        for unit in self.units.units().iter().filter(|u| u.is_groupable()) {
            let overlaps = unit.start <= end && unit.end() >= start;
            let covered = unit.start >= start && unit.end() <= end;
            if overlaps && !covered {
                range.warnings.push(format!(
                    "range splits unit {} (lines {}..={}); consider covering the whole unit",
                    unit.unit_id,
                    unit.start,
                    unit.end()
                ));
                range.partial_units.push(unit.unit_id.clone());
            }
        }
        range
    }

    /// Where new content should go, given optional neighbours.
    ///
    /// `before` is the block the content should precede, `after` the block it
    /// should follow. A lone reference inside a list anchors to the
    /// unit's edge instead of splitting it.
    pub fn find_optimal_insertion_point(&self, before: Option<&BlockId>, after: Option<&BlockId>) -> InsertionPoint {
        let mut warnings = Vec::new();
        let before = self.known_line(before, "before", &mut warnings);
        let after = self.known_line(after, "after", &mut warnings);

        let position = match (before, after) {
            (Some(b), Some(a)) => {
                if a.line_number + 1 != b.line_number {
                    warnings.push(format!(
                        "references {} and {} are not adjacent; inserting before {}",
                        a.block_id, b.block_id, b.block_id
                    ));
                }
                InsertPosition::Before(b.block_id.clone())
            }
            (Some(b), None) => match self.unit_of(b) {
                Some(unit) if unit.block_ids.first() != Some(&b.block_id) => {
                    warnings.push(format!("anchored to the start of {}", unit.unit_id));
                    InsertPosition::Before(unit.block_ids[0].clone())
                }
                _ => InsertPosition::Before(b.block_id.clone()),
            },
            (None, Some(a)) => match self.unit_of(a) {
                Some(unit) if unit.block_ids.last() != Some(&a.block_id) => {
                    warnings.push(format!("anchored to the end of {}", unit.unit_id));
                    InsertPosition::After(unit.block_ids[unit.len() - 1].clone())
                }
                _ => InsertPosition::After(a.block_id.clone()),
            },
            (None, None) => InsertPosition::End,
        };

        InsertionPoint { position, warnings }
    }

    fn known_line(&self, id: Option<&BlockId>, role: &str, warnings: &mut Vec<String>) -> Option<&LineTarget> {
        let id = id?;
        let line = self.line_for_block(id);
        if line.is_none() {
            warnings.push(format!("{} reference {} not found; ignored", role, id));
        }
        line
    }

    /// Resolve a tool-call line selector to one line.
    pub fn resolve(&self, selector: &LineSelector) -> LineResolution {
        match selector {
            LineSelector::Position { line_number } => match self.find_line_by_position(*line_number) {
                Some(line) => LineResolution {
                    line: Some(line.clone()),
                    warnings: Vec::new(),
                },
                None => LineResolution {
                    line: None,
                    warnings: vec![format!(
                        "line {} is out of range (document has {} lines)",
                        line_number,
                        self.line_count()
                    )],
                },
            },
            LineSelector::Content {
                search,
                case_sensitive,
                exact_match,
                occurrence,
            } => {
                let options = ContentSearchOptions {
                    case_sensitive: *case_sensitive,
                    exact_match: *exact_match,
                    include_partial_matches: true,
                    max_results: occurrence.saturating_add(1),
                };
                let matches = self.find_lines_by_content(search, &options);
                match matches.get(*occurrence) {
                    Some(line) => LineResolution {
                        line: Some((*line).clone()),
                        warnings: Vec::new(),
                    },
                    None => LineResolution {
                        line: None,
                        warnings: vec![format!(
                            "no line matching {:?} (occurrence {}, found {})",
                            search,
                            occurrence,
                            matches.len()
                        )],
                    },
                }
            }
            LineSelector::Relative {
                reference_block_id,
                direction,
                offset,
                respect_unit_boundaries,
            } => self.find_line_by_relative_position(&RelativePosition {
                reference_block_id: reference_block_id.clone(),
                direction: *direction,
                offset: *offset,
                respect_unit_boundaries: *respect_unit_boundaries,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, text: &str) -> Block {
        Block::with_text(BlockKind::BulletListItem, text).id(id)
    }

    /// p0, [l1 l2 l3 l4], p5, p6
    fn sample() -> DocumentLines {
        let blocks = vec![
            Block::paragraph("Introduction to the plan").id("p0"),
            item("l1", "apples"),
            item("l2", "bananas"),
            item("l3", "pineapple"),
            item("l4", "cherries"),
            Block::paragraph("Closing thoughts").id("p5"),
            Block::paragraph("").id("p6"),
        ];
        DocumentLines::analyze(&blocks, &ResolverConfig::default())
    }

    fn rel(id: &str, direction: Direction, offset: usize, respect: bool) -> RelativePosition {
        RelativePosition {
            reference_block_id: BlockId::new(id),
            direction,
            offset,
            respect_unit_boundaries: respect,
        }
    }

    #[test]
    fn test_line_view() {
        let lines = sample();
        assert_eq!(lines.line_count(), 7);
        let l2 = lines.find_line_by_position(2).unwrap();
        assert_eq!(l2.block_id, BlockId::new("l2"));
        assert_eq!(l2.content, "bananas");
        let unit = l2.unit.as_ref().unwrap();
        assert_eq!(unit.position_in_unit, 1);
        assert_eq!(unit.total_in_unit, 4);
        assert!(lines.find_line_by_position(0).unwrap().unit.is_none());
        assert!(lines.find_line_by_position(6).unwrap().is_empty);
        assert!(lines.find_line_by_position(7).is_none());
    }

    #[test]
    fn test_content_search_modes() {
        let lines = sample();
        let partial = lines.find_lines_by_content("APPLE", &ContentSearchOptions::default());
        let ids: Vec<_> = partial.iter().map(|l| l.block_id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "l3"]);

        let words = lines.find_lines_by_content(
            "apple",
            &ContentSearchOptions {
                include_partial_matches: false,
                ..Default::default()
            },
        );
        assert!(words.is_empty());

        let exact = lines.find_lines_by_content(
            " closing thoughts ",
            &ContentSearchOptions {
                exact_match: true,
                ..Default::default()
            },
        );
        assert_eq!(exact.len(), 1);

        let sensitive = lines.find_lines_by_content(
            "apples",
            &ContentSearchOptions {
                case_sensitive: true,
                max_results: 1,
                ..Default::default()
            },
        );
        assert_eq!(sensitive.len(), 1);

        assert!(lines.find_lines_by_content("  ", &ContentSearchOptions::default()).is_empty());
    }

    #[test]
    fn test_relative_within_unit() {
        let lines = sample();
        let res = lines.find_line_by_relative_position(&rel("l1", Direction::After, 2, true));
        assert_eq!(res.line.unwrap().block_id, BlockId::new("l3"));
        assert!(res.warnings.is_empty());
    }

    #[test]
    fn test_relative_unit_clamp_wins() {
        let lines = sample();
        let res = lines.find_line_by_relative_position(&rel("l3", Direction::After, 500, true));
        assert_eq!(res.line.unwrap().block_id, BlockId::new("l4"));
        // distance, document and unit clamps all fired
        assert_eq!(res.warnings.len(), 3);

        let res = lines.find_line_by_relative_position(&rel("l2", Direction::Before, 5, true));
        assert_eq!(res.line.unwrap().block_id, BlockId::new("l1"));
    }

    #[test]
    fn test_relative_ignores_unit_when_asked() {
        let lines = sample();
        let res = lines.find_line_by_relative_position(&rel("l4", Direction::After, 1, false));
        assert_eq!(res.line.unwrap().block_id, BlockId::new("p5"));

        let res = lines.find_line_by_relative_position(&rel("p0", Direction::Before, 3, true));
        assert_eq!(res.line.unwrap().line_number, 0);
        assert_eq!(res.warnings.len(), 1);
    }

    #[test]
    fn test_relative_unknown_reference_degrades() {
        let lines = sample();
        let res = lines.find_line_by_relative_position(&rel("nope", Direction::After, 1, true));
        assert!(res.line.is_none());
        assert_eq!(res.warnings.len(), 1);
    }

    #[test]
    fn test_relative_always_in_bounds() {
        let lines = sample();
        for id in ["p0", "l1", "l2", "l3", "l4", "p5", "p6"] {
            for offset in [0, 1, 3, 7, 60] {
                for direction in [Direction::Before, Direction::After] {
                    for respect in [true, false] {
                        let res = lines.find_line_by_relative_position(&rel(id, direction, offset, respect));
                        let line = res.line.unwrap();
                        assert!(line.line_number < lines.line_count());
                        let reference = lines.line_for_block(&BlockId::new(id)).unwrap();
                        if respect && reference.unit.is_some() {
                            assert!((1..=4).contains(&line.line_number), "{id} {offset}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_range_flags_partial_units() {
        let lines = sample();
        let range = lines.get_lines_in_range(0, 2);
        assert_eq!(range.lines.len(), 3);
        assert_eq!(range.partial_units, vec!["bulletListItem-l1".to_string()]);

        let whole = lines.get_lines_in_range(1, 4);
        assert!(whole.partial_units.is_empty());
        assert!(whole.warnings.is_empty());

        let clamped = lines.get_lines_in_range(9, 5);
        assert_eq!(clamped.lines.len(), 2);
        assert_eq!(clamped.lines[0].line_number, 5);
        assert_eq!(clamped.warnings.len(), 2);
    }

    #[test]
    fn test_insertion_points() {
        let lines = sample();
        let id = |s: &str| BlockId::new(s);

        let between = lines.find_optimal_insertion_point(Some(&id("p5")), Some(&id("l4")));
        assert_eq!(between.position, InsertPosition::Before(id("p5")));
        assert!(between.warnings.is_empty());

        let apart = lines.find_optimal_insertion_point(Some(&id("p5")), Some(&id("p0")));
        assert_eq!(apart.position, InsertPosition::Before(id("p5")));
        assert_eq!(apart.warnings.len(), 1);

        let after_item = lines.find_optimal_insertion_point(None, Some(&id("l2")));
        assert_eq!(after_item.position, InsertPosition::After(id("l4")));

        let before_item = lines.find_optimal_insertion_point(Some(&id("l3")), None);
        assert_eq!(before_item.position, InsertPosition::Before(id("l1")));

        let plain = lines.find_optimal_insertion_point(None, Some(&id("p0")));
        assert_eq!(plain.position, InsertPosition::After(id("p0")));
        assert!(plain.warnings.is_empty());

        let none = lines.find_optimal_insertion_point(None, None);
        assert_eq!(none.position, InsertPosition::End);
    }

    #[test]
    fn test_resolve_selectors() {
        let lines = sample();
        let by_search = lines.resolve(&LineSelector::Content {
            search: "apple".into(),
            case_sensitive: false,
            exact_match: false,
            occurrence: 1,
        });
        assert_eq!(by_search.line.unwrap().block_id, BlockId::new("l3"));

        let missing = lines.resolve(&LineSelector::Position { line_number: 99 });
        assert!(missing.line.is_none());
        assert_eq!(missing.warnings.len(), 1);
    }
}
