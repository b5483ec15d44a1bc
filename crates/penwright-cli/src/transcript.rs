//! Transcript and document file loading.
//!
//! A transcript is JSONL: each non-empty line is one delta, either a single
//! tool-call event object or an array of them. Lines may repeat earlier
//! calls (streamed snapshots); the dispatcher skips ids it has seen.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use penwright_doc::BlockDocument;
use penwright_types::{Block, ToolCallEvent};

/// Parse one transcript line into the events of a delta.
///
/// Message-shaped lines (`{"toolCalls": [...]}`) are accepted too.
pub fn parse_delta(line: &str) -> Result<Vec<ToolCallEvent>> {
    let value: Value = serde_json::from_str(line).context("transcript line is not JSON")?;
    let events = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        Value::Object(ref map) if map.contains_key("toolCalls") => {
            serde_json::from_value(map["toolCalls"].clone())?
        }
        Value::Object(_) => vec![serde_json::from_value(value)?],
        other => bail!("unexpected transcript entry: {}", other),
    };
    Ok(events)
}

/// Read a whole transcript. Errors carry the 1-based line number.
pub fn read_transcript(path: &Path) -> Result<Vec<Vec<ToolCallEvent>>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| parse_delta(line).with_context(|| format!("{}:{}", path.display(), n + 1)))
        .collect()
}

/// Document id for a file: its stem.
pub fn document_id(path: &Path) -> Result<String> {
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) if !stem.is_empty() => Ok(stem.to_string()),
        _ => bail!("cannot derive a document id from {}", path.display()),
    }
}

/// Load a block-array JSON file. A missing or empty file is a blank document.
pub fn load_document(path: &Path) -> Result<BlockDocument> {
    let id = document_id(path)?;
    let blocks: Vec<Block> = match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Vec::new(),
        Ok(text) => serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "document not found; starting blank");
            Vec::new()
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    if blocks.is_empty() {
        return Ok(BlockDocument::new(id));
    }
    Ok(BlockDocument::from_blocks(id, blocks)?)
}
