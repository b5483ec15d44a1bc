//! Tool-call dispatcher.
//!
//! Consumes tool-call events from the assistant transcript and drives each
//! new call through the pipeline exactly once:
//!
//! ```text
//! ToolCallEvent ─▶ dedup ─▶ parse (ToolCall) ─▶ surface / confirmation gates
//!                                                   │
//!            resolve targets ◀──────────────────────┘
//!                  │
//!                  ▼
//!               guard ── blocked ──▶ notice
//!                  │ allowed
//!                  ▼
//!          parse content (await) ─▶ executor ─▶ autosave
//! ```
//!
//! All state (processed ids, deferred queue, pending confirmations, surface)
//! belongs to one dispatcher instance, which lives as long as the document
//! session. A call id is recorded as processed before anything can suspend,
//! so a transcript snapshot that repeats it while the call is still running
//! is skipped. Failed calls stay processed; assistant calls are never
//! retried automatically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use penwright_doc::{BlockDocument, ContentParser, MarkdownParser, render_markdown};
use penwright_types::{
    AddContentArgs, Block, BlockId, DeleteContentArgs, LineSelector, ModifyContentArgs, ModifyTableArgs,
    ReplaceAllContentArgs, ToolCall, ToolCallError, ToolCallEvent, ToolCallState, ToolName,
};
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::SharedDocument;
use crate::analysis::DocumentLines;
use crate::autosave::AutosaveController;
use crate::config::{EngineConfig, ResolverConfig};
use crate::edit_tools::{AddAnchor, DocumentExecutor, EditError, EditReport, Result};
use crate::guard::{ContentGuard, PreservationResult};

// ============================================================================
// Surfaces
// ============================================================================

/// How the consuming UI shows the document and the chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SurfaceMode {
    /// Both visible; calls always run immediately.
    #[default]
    Split,
    /// One view at a time (mobile); document calls wait for the document view.
    Exclusive,
}

impl SurfaceMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }
}

/// Which view is in front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Document,
    Chat,
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Document content handed back for `requestEditorContent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorContext {
    pub blocks: Vec<Block>,
    pub markdown: String,
}

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DispatchOutcome {
    Applied(EditReport),
    Blocked(PreservationResult),
    /// Queued until the document surface is ready.
    Deferred,
    AwaitingConfirmation,
    ContextProvided(EditorContext),
    /// Completed in an earlier session; not executed again.
    AlreadyFinalized,
    Declined,
    Failed { error: String },
}

impl DispatchOutcome {
    /// User notice for this outcome, if it warrants one.
    pub fn notice(&self, tool: Option<ToolName>) -> Option<Notice> {
        let tool = tool.map(|t| t.as_str()).unwrap_or("tool call");
        match self {
            DispatchOutcome::Applied(report) if !report.warnings.is_empty() => {
                Some(Notice::new(NoticeLevel::Warning, report.warnings.join(" ")))
            }
            DispatchOutcome::Blocked(result) => {
                let mut message = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("{} was blocked.", tool));
                if let Some(action) = result.suggested_action {
                    message.push_str(&format!(" Try to {}.", action));
                }
                Some(Notice::new(NoticeLevel::Error, message))
            }
            DispatchOutcome::Deferred => Some(Notice::new(
                NoticeLevel::Info,
                format!("Opening the document to apply {}.", tool),
            )),
            DispatchOutcome::AwaitingConfirmation => Some(Notice::new(
                NoticeLevel::Info,
                "Waiting for confirmation before replacing the whole document.",
            )),
            DispatchOutcome::Declined => Some(Notice::new(
                NoticeLevel::Info,
                "Replacement declined; the document was not changed.",
            )),
            DispatchOutcome::Failed { error } => {
                Some(Notice::new(NoticeLevel::Error, format!("{} failed: {}", tool, error)))
            }
            DispatchOutcome::Applied(_) | DispatchOutcome::ContextProvided(_) | DispatchOutcome::AlreadyFinalized => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, DispatchOutcome::Applied(_))
    }
}

/// One handled call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    pub tool_call_id: String,
    pub tool: Option<ToolName>,
    pub outcome: DispatchOutcome,
    pub notice: Option<Notice>,
}

impl DispatchRecord {
    fn new(tool_call_id: &str, tool: Option<ToolName>, outcome: DispatchOutcome) -> Self {
        let notice = outcome.notice(tool);
        Self {
            tool_call_id: tool_call_id.to_string(),
            tool,
            outcome,
            notice,
        }
    }
}

/// Everything a delta (or a surface / confirmation signal) produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub records: Vec<DispatchRecord>,
    /// Set when the UI should bring this surface to the front.
    pub surface_request: Option<Surface>,
}

impl DispatchReport {
    pub fn applied(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_applied()).count()
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.records.iter().filter_map(|r| r.notice.as_ref())
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Per-session tool-call consumer.
pub struct ToolCallDispatcher {
    document: SharedDocument,
    parser: Arc<dyn ContentParser>,
    guard: ContentGuard,
    executor: DocumentExecutor,
    resolver: ResolverConfig,
    autosave: Option<AutosaveController>,

    processed: HashSet<String>,
    deferred: VecDeque<(String, ToolCall)>,
    pending_confirmations: HashMap<String, ReplaceAllContentArgs>,
    surface_mode: SurfaceMode,
    active_surface: Surface,
    context_requested: bool,
}

impl ToolCallDispatcher {
    pub fn new(document: SharedDocument, config: &EngineConfig) -> Self {
        Self {
            document,
            parser: Arc::new(MarkdownParser::new()),
            guard: ContentGuard::new(config.preservation.clone()),
            executor: DocumentExecutor::new(config.resolver.clone()),
            resolver: config.resolver.clone(),
            autosave: None,
            processed: HashSet::new(),
            deferred: VecDeque::new(),
            pending_confirmations: HashMap::new(),
            surface_mode: SurfaceMode::Split,
            active_surface: Surface::Document,
            context_requested: false,
        }
    }

    /// Use a different content parser (e.g. the editor surface's own).
    pub fn with_parser(mut self, parser: Arc<dyn ContentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Notify this controller after every applied mutation.
    pub fn with_autosave(mut self, autosave: AutosaveController) -> Self {
        self.autosave = Some(autosave);
        self
    }

    pub fn with_surface(mut self, mode: SurfaceMode, active: Surface) -> Self {
        self.surface_mode = mode;
        self.active_surface = active;
        self
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn is_processed(&self, tool_call_id: &str) -> bool {
        self.processed.contains(tool_call_id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Ids of replaceAllContent calls waiting for the user.
    pub fn pending_confirmations(&self) -> Vec<&str> {
        self.pending_confirmations.keys().map(String::as_str).collect()
    }

    pub fn active_surface(&self) -> Surface {
        self.active_surface
    }

    /// Whether the assistant asked for the editor content; clears the flag.
    pub fn take_context_request(&mut self) -> bool {
        std::mem::take(&mut self.context_requested)
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Handle the tool-call events of one transcript delta.
    ///
    /// Events whose id was already processed are skipped, so the same
    /// snapshot can be fed repeatedly.
    pub async fn process_delta(&mut self, events: &[ToolCallEvent]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in events {
            if self.processed.contains(&event.tool_call_id) {
                tracing::debug!(id = %event.tool_call_id, "skipping processed tool call");
                continue;
            }
            self.processed.insert(event.tool_call_id.clone());

            if event.state == ToolCallState::Result {
                tracing::debug!(id = %event.tool_call_id, tool = %event.tool_name, "tool call already finalized");
                let tool = ToolName::from_str(&event.tool_name);
                report
                    .records
                    .push(DispatchRecord::new(&event.tool_call_id, tool, DispatchOutcome::AlreadyFinalized));
                continue;
            }

            let call = match ToolCall::from_event(event) {
                Ok(call) => call,
                Err(e) => {
                    tracing::warn!(id = %event.tool_call_id, tool = %event.tool_name, error = %e, "malformed tool call");
                    let tool = ToolName::from_str(&event.tool_name);
                    report.records.push(DispatchRecord::new(
                        &event.tool_call_id,
                        tool,
                        DispatchOutcome::Failed { error: e.to_string() },
                    ));
                    continue;
                }
            };

            let record = self.route(&event.tool_call_id, call, &mut report).await;
            report.records.push(record);
        }
        report
    }

    /// The UI switched surfaces. When the document view becomes ready,
    /// deferred calls run in arrival order.
    pub async fn surface_ready(&mut self, surface: Surface) -> DispatchReport {
        self.active_surface = surface;
        let mut report = DispatchReport::default();
        if surface != Surface::Document {
            return report;
        }
        while let Some((id, call)) = self.deferred.pop_front() {
            tracing::debug!(id = %id, tool = %call.name(), "running deferred tool call");
            let record = self.route(&id, call, &mut report).await;
            report.records.push(record);
        }
        report
    }

    /// User confirmed a pending replaceAllContent. `None` for unknown ids.
    pub async fn confirm(&mut self, tool_call_id: &str) -> Option<DispatchRecord> {
        let args = self.pending_confirmations.remove(tool_call_id)?;
        tracing::info!(id = %tool_call_id, "replacement confirmed");
        let outcome = self
            .run(ToolCall::ReplaceAllContent(args))
            .await
            .unwrap_or_else(|e| self.failed(tool_call_id, e));
        Some(self.finish(tool_call_id, ToolName::ReplaceAllContent, outcome))
    }

    /// User declined a pending replaceAllContent. Never touches the document.
    pub fn decline(&mut self, tool_call_id: &str) -> Option<DispatchRecord> {
        self.pending_confirmations.remove(tool_call_id)?;
        tracing::info!(id = %tool_call_id, "replacement declined");
        Some(DispatchRecord::new(
            tool_call_id,
            Some(ToolName::ReplaceAllContent),
            DispatchOutcome::Declined,
        ))
    }

    // ========================================================================
    // Routing
    // ========================================================================

    async fn route(&mut self, id: &str, call: ToolCall, report: &mut DispatchReport) -> DispatchRecord {
        let tool = call.name();

        if call.targets_document() && self.surface_mode == SurfaceMode::Exclusive && self.active_surface != Surface::Document {
            tracing::debug!(id, %tool, "deferring until document surface is ready");
            self.deferred.push_back((id.to_string(), call));
            report.surface_request = Some(Surface::Document);
            return DispatchRecord::new(id, Some(tool), DispatchOutcome::Deferred);
        }

        let outcome = match call {
            ToolCall::RequestEditorContent => {
                self.context_requested = true;
                let doc = self.document.read();
                DispatchOutcome::ContextProvided(EditorContext {
                    blocks: doc.snapshot(),
                    markdown: render_markdown(doc.blocks()),
                })
            }
            ToolCall::ReplaceAllContent(args) if args.require_confirmation => {
                tracing::info!(id, "replacement awaiting confirmation");
                self.pending_confirmations.insert(id.to_string(), args);
                DispatchOutcome::AwaitingConfirmation
            }
            call => self.run(call).await.unwrap_or_else(|e| self.failed(id, e)),
        };
        self.finish(id, tool, outcome)
    }

    fn failed(&self, id: &str, error: EditError) -> DispatchOutcome {
        tracing::warn!(id, error = %error, "tool call failed");
        DispatchOutcome::Failed {
            error: error.to_string(),
        }
    }

    fn finish(&self, id: &str, tool: ToolName, outcome: DispatchOutcome) -> DispatchRecord {
        if outcome.is_applied() {
            if let Some(autosave) = &self.autosave {
                autosave.notify_change();
            }
        }
        DispatchRecord::new(id, Some(tool), outcome)
    }

    /// Resolve, guard, parse and execute one document call.
    async fn run(&self, call: ToolCall) -> Result<DispatchOutcome> {
        match call {
            ToolCall::AddContent(args) => self.add_content(args).await,
            ToolCall::ModifyContent(args) => self.modify_content(args).await,
            ToolCall::DeleteContent(args) => self.delete_content(args),
            ToolCall::ModifyTable(args) => self.modify_table(args).await,
            ToolCall::ReplaceAllContent(args) => self.replace_all(args).await,
            ToolCall::RequestEditorContent => Err(EditError::unresolved(
                ToolName::RequestEditorContent,
                "not a document edit",
            )),
        }
    }

    /// Resolve an explicit id or a line selector to an existing block.
    fn resolve_target(
        &self,
        doc: &BlockDocument,
        tool: ToolName,
        block_id: Option<&BlockId>,
        line: Option<&LineSelector>,
    ) -> Result<(BlockId, Vec<String>)> {
        if let Some(id) = block_id {
            return if doc.contains(id) {
                Ok((id.clone(), Vec::new()))
            } else {
                Err(EditError::BlockNotFound(id.clone()))
            };
        }
        let Some(selector) = line else {
            return Err(ToolCallError::MissingTarget(tool).into());
        };
        let resolution = DocumentLines::analyze(doc.blocks(), &self.resolver).resolve(selector);
        match resolution.line {
            Some(line) => Ok((line.block_id, resolution.warnings)),
            None => Err(EditError::unresolved(tool, resolution.warnings.join("; "))),
        }
    }

    async fn parse(&self, content: &str) -> Result<Vec<Block>> {
        Ok(self.parser.parse_blocks(content).await?)
    }

    async fn add_content(&self, args: AddContentArgs) -> Result<DispatchOutcome> {
        let (anchor, mut warnings) = {
            let doc = self.document.read();
            let verdict = self.guard.validate_insertion(&doc, &args.markdown_content);
            if !verdict.is_allowed {
                return Ok(DispatchOutcome::Blocked(verdict));
            }
            let mut warnings: Vec<String> = verdict.warning_message.into_iter().collect();

            let mut after = args.target_block_id.clone();
            if after.is_none() {
                if let Some(selector) = &args.target_line {
                    let resolution = DocumentLines::analyze(doc.blocks(), &self.resolver).resolve(selector);
                    warnings.extend(resolution.warnings);
                    after = resolution.line.map(|l| l.block_id);
                }
            }
            (
                AddAnchor {
                    after,
                    before: args.before_block_id.clone(),
                },
                warnings,
            )
        };

        let blocks = self.parse(&args.markdown_content).await?;
        let mut doc = self.document.write();
        let report = self.executor.add_content(&mut doc, blocks, &args.markdown_content, &anchor)?;
        warnings.extend(report.warnings.iter().cloned());
        Ok(DispatchOutcome::Applied(EditReport { warnings, ..report }))
    }

    async fn modify_content(&self, args: ModifyContentArgs) -> Result<DispatchOutcome> {
        let tool = ToolName::ModifyContent;
        let (targets, mut warnings) = {
            let doc = self.document.read();
            let (target, warnings) =
                self.resolve_target(&doc, tool, args.target_block_id.as_ref(), args.target_line.as_ref())?;
            let targets = match &args.target_text {
                Some(_) => vec![target],
                None => DocumentExecutor::modification_targets(&doc, &target),
            };
            let verdict = self.guard.validate_modification(
                &doc,
                &targets,
                args.target_text.as_deref(),
                &args.new_markdown_content,
            );
            if !verdict.is_allowed {
                return Ok(DispatchOutcome::Blocked(verdict));
            }
            let mut warnings = warnings;
            warnings.extend(verdict.warning_message);
            (targets, warnings)
        };

        let blocks = self.parse(&args.new_markdown_content).await?;
        let mut doc = self.document.write();
        let report = match &args.target_text {
            Some(text) => {
                let replacement = replacement_text(&blocks, &args.new_markdown_content);
                self.executor.modify_text(&mut doc, &targets[0], text, &replacement)?
            }
            None => self.executor.modify_blocks(&mut doc, &targets, blocks, &args.new_markdown_content)?,
        };
        warnings.extend(report.warnings.iter().cloned());
        Ok(DispatchOutcome::Applied(EditReport { warnings, ..report }))
    }

    fn delete_content(&self, args: DeleteContentArgs) -> Result<DispatchOutcome> {
        let tool = ToolName::DeleteContent;
        let mut doc = self.document.write();

        let (targets, mut warnings) = match args.target_block_id {
            Some(ids) => {
                let ids = ids.into_vec();
                if let Some(missing) = ids.iter().find(|id| !doc.contains(id)) {
                    return Err(EditError::BlockNotFound(missing.clone()));
                }
                (ids, Vec::new())
            }
            None => {
                let (id, warnings) = self.resolve_target(&doc, tool, None, args.target_line.as_ref())?;
                (vec![id], warnings)
            }
        };

        let verdict = self.guard.validate_deletion(&doc, &targets, args.target_text.as_deref());
        if !verdict.is_allowed {
            return Ok(DispatchOutcome::Blocked(verdict));
        }
        warnings.extend(verdict.warning_message);

        let report = match &args.target_text {
            Some(text) => self.executor.delete_text(&mut doc, &targets[0], text)?,
            None => self.executor.delete_blocks(&mut doc, &targets)?,
        };
        Ok(DispatchOutcome::Applied(report.with_warnings(warnings)))
    }

    async fn modify_table(&self, args: ModifyTableArgs) -> Result<DispatchOutcome> {
        let warnings = {
            let doc = self.document.read();
            if !doc.contains(&args.table_block_id) {
                return Err(EditError::BlockNotFound(args.table_block_id.clone()));
            }
            let verdict = self.guard.validate_modification(
                &doc,
                std::slice::from_ref(&args.table_block_id),
                None,
                &args.new_table_markdown,
            );
            if !verdict.is_allowed {
                return Ok(DispatchOutcome::Blocked(verdict));
            }
            verdict.warning_message
        };

        let blocks = self.parse(&args.new_table_markdown).await?;
        let mut doc = self.document.write();
        let report = self.executor.modify_table(&mut doc, &args.table_block_id, blocks)?;
        Ok(DispatchOutcome::Applied(report.with_warnings(warnings)))
    }

    async fn replace_all(&self, args: ReplaceAllContentArgs) -> Result<DispatchOutcome> {
        let warnings = {
            let doc = self.document.read();
            let verdict = self.guard.validate_insertion(&doc, &args.new_markdown_content);
            if !verdict.is_allowed {
                return Ok(DispatchOutcome::Blocked(verdict));
            }
            verdict.warning_message
        };

        let blocks = self.parse(&args.new_markdown_content).await?;
        let mut doc = self.document.write();
        let report = self.executor.replace_all(&mut doc, blocks, &args.new_markdown_content)?;
        Ok(DispatchOutcome::Applied(report.with_warnings(warnings)))
    }
}

/// Inline replacement text for a substring edit: the parsed content's plain
/// text, or the raw input when parsing produced nothing.
fn replacement_text(blocks: &[Block], raw: &str) -> String {
    let text: Vec<String> = blocks.iter().map(Block::plain_text).filter(|t| !t.is_empty()).collect();
    if text.is_empty() {
        raw.trim().to_string()
    } else {
        text.join("\n")
    }
}
