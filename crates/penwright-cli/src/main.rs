//! Penwright command-line tool.
//!
//! Replays an assistant tool-call transcript against a document and saves
//! the result through the autosave controller, or prints a document's line
//! view for checking line selectors.
//!
//! Usage:
//!   penwright replay --document notes.json --transcript calls.jsonl
//!   penwright replay --document notes.json --transcript calls.jsonl \
//!       --config engine.ron --out out/ --surface exclusive --auto-confirm
//!   penwright lines --document notes.json --find budget
//!
//! Records are printed to stdout as JSON lines; logs go to stderr
//! (`RUST_LOG=debug` for routing detail).

mod transcript;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use penwright_kernel::{
    AutosaveController, ContentSearchOptions, DispatchRecord, DispatchReport, DocumentLines, EngineConfig,
    FileDocumentStore, NoticeLevel, Surface, SurfaceMode, ToolCallDispatcher, load_engine_config, shared_document,
};

/// Tool-call mediated document editing.
#[derive(Parser, Debug)]
#[command(name = "penwright")]
#[command(about = "Apply assistant tool calls to block documents")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a JSONL tool-call transcript to a document and save it.
    Replay {
        /// Block-array JSON document (created if missing)
        #[arg(long)]
        document: PathBuf,

        /// JSONL transcript; one delta per line
        #[arg(long)]
        transcript: PathBuf,

        /// RON engine config (defaults when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory (defaults to the document's directory)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Confirm replaceAllContent calls instead of declining them
        #[arg(long)]
        auto_confirm: bool,

        /// Surface layout to simulate: split or exclusive
        #[arg(long, default_value = "split", value_parser = parse_surface_mode)]
        surface: SurfaceMode,
    },

    /// Print the line view of a document.
    Lines {
        #[arg(long)]
        document: PathBuf,

        /// Only lines containing this text (case-insensitive)
        #[arg(long)]
        find: Option<String>,

        /// RON engine config (defaults when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_surface_mode(s: &str) -> Result<SurfaceMode, String> {
    SurfaceMode::from_str(s).ok_or_else(|| format!("unknown surface mode {:?} (split, exclusive)", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Replay {
            document,
            transcript,
            config,
            out,
            auto_confirm,
            surface,
        } => {
            let config = engine_config(config.as_deref())?;
            replay(&document, &transcript, &config, out, auto_confirm, surface).await
        }
        Command::Lines { document, find, config } => {
            let config = engine_config(config.as_deref())?;
            print_lines(&document, find.as_deref(), &config)
        }
    }
}

fn engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => load_engine_config(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

// ============================================================================
// replay
// ============================================================================

async fn replay(
    document: &Path,
    transcript: &Path,
    config: &EngineConfig,
    out: Option<PathBuf>,
    auto_confirm: bool,
    surface: SurfaceMode,
) -> Result<()> {
    let deltas = transcript::read_transcript(transcript)?;
    let doc = shared_document(transcript::load_document(document)?);
    let document_id = doc.read().document_id().to_string();

    let out = out.unwrap_or_else(|| document.parent().map(Path::to_path_buf).unwrap_or_default());
    let store = Arc::new(FileDocumentStore::new(out));
    let autosave = AutosaveController::new(doc.clone(), store.clone(), config.autosave.clone());

    let initial = match surface {
        SurfaceMode::Split => Surface::Document,
        SurfaceMode::Exclusive => Surface::Chat,
    };
    let mut dispatcher = ToolCallDispatcher::new(doc, config)
        .with_autosave(autosave.clone())
        .with_surface(surface, initial);

    tracing::info!(document = %document_id, deltas = deltas.len(), ?surface, "replaying transcript");

    for events in &deltas {
        let report = dispatcher.process_delta(events).await;
        emit(&report)?;

        if report.surface_request == Some(Surface::Document) {
            emit(&dispatcher.surface_ready(Surface::Document).await)?;
            dispatcher.surface_ready(Surface::Chat).await;
        }

        let pending: Vec<String> = dispatcher.pending_confirmations().into_iter().map(String::from).collect();
        for id in pending {
            let record = if auto_confirm {
                dispatcher.confirm(&id).await
            } else {
                dispatcher.decline(&id)
            };
            if let Some(record) = record {
                emit_record(&record)?;
            }
        }
    }

    match autosave.flush().await {
        Ok(Some(receipt)) => {
            let path = store.json_path(&document_id)?;
            tracing::info!(path = %path.display(), modified_at = receipt.modified_at, "document saved");
        }
        Ok(None) => tracing::info!("no changes to save"),
        Err(e) => return Err(e).context("saving document"),
    }
    Ok(())
}

fn emit(report: &DispatchReport) -> Result<()> {
    report.records.iter().try_for_each(emit_record)
}

fn emit_record(record: &DispatchRecord) -> Result<()> {
    if let Some(notice) = &record.notice {
        match notice.level {
            NoticeLevel::Info => tracing::info!(id = %record.tool_call_id, "{}", notice.message),
            NoticeLevel::Warning => tracing::warn!(id = %record.tool_call_id, "{}", notice.message),
            NoticeLevel::Error => tracing::error!(id = %record.tool_call_id, "{}", notice.message),
        }
    }
    println!("{}", serde_json::to_string(record)?);
    Ok(())
}

// ============================================================================
// lines
// ============================================================================

fn print_lines(document: &Path, find: Option<&str>, config: &EngineConfig) -> Result<()> {
    let doc = transcript::load_document(document)?;
    let lines = DocumentLines::analyze(doc.blocks(), &config.resolver);

    let selected: Vec<_> = match find {
        Some(text) => lines.find_lines_by_content(
            text,
            &ContentSearchOptions {
                max_results: usize::MAX,
                ..ContentSearchOptions::default()
            },
        ),
        None => lines.lines().iter().collect(),
    };

    for line in selected {
        let unit = line
            .unit
            .as_ref()
            .map(|u| format!("{} {}/{}", u.unit_id, u.position_in_unit + 1, u.total_in_unit))
            .unwrap_or_default();
        println!(
            "{:>4}  {}{:<16} {:<40} {}",
            line.line_number,
            "  ".repeat(line.level),
            line.block_type.as_str(),
            line.content,
            unit
        );
    }
    Ok(())
}
