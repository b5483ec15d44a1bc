//! End-to-end tests for the tool-call pipeline.
//!
//! Each test drives a [`ToolCallDispatcher`] with wire-shaped events, the
//! same JSON the assistant transcript carries, and checks the resulting
//! document (and, for autosave, the store).

use std::sync::Arc;
use std::time::Duration;

use penwright_kernel::{
    AutosaveConfig, AutosaveController, AutosaveStatus, BlockDocument, DispatchOutcome, DocumentLines, DocumentStore,
    EngineConfig, MemoryDocumentStore, ResolverConfig, SharedDocument, ToolCallDispatcher, shared_document,
};
use penwright_types::{Block, BlockId, BlockKind, Direction, LineSelector, ToolCallEvent};
use serde_json::{Value, json};

// ============================================================================
// Shared test setup
// ============================================================================

fn doc_with(blocks: Vec<Block>) -> SharedDocument {
    shared_document(BlockDocument::from_blocks("doc", blocks).unwrap())
}

fn dispatcher(blocks: Vec<Block>) -> ToolCallDispatcher {
    ToolCallDispatcher::new(doc_with(blocks), &EngineConfig::default())
}

fn paragraphs(count: usize) -> Vec<Block> {
    (0..count).map(|i| Block::paragraph(format!("paragraph {i}")).id(format!("p{i}"))).collect()
}

fn bullets(prefix: &str, count: usize) -> Vec<Block> {
    (0..count)
        .map(|i| Block::with_text(BlockKind::BulletListItem, format!("item {i}")).id(format!("{prefix}{i}")))
        .collect()
}

fn ids(d: &ToolCallDispatcher) -> Vec<String> {
    d.document().read().blocks().iter().map(|b| b.id.as_str().to_string()).collect()
}

fn texts(d: &ToolCallDispatcher) -> Vec<String> {
    d.document().read().blocks().iter().map(|b| b.plain_text()).collect()
}

async fn run_one(d: &mut ToolCallDispatcher, id: &str, tool: &str, args: Value) -> DispatchOutcome {
    let report = d.process_delta(&[ToolCallEvent::call(id, tool, args)]).await;
    assert_eq!(report.records.len(), 1);
    report.records.into_iter().next().unwrap().outcome
}

fn delete_ids(count: usize) -> Value {
    let ids: Vec<String> = (0..count).map(|i| format!("p{i}")).collect();
    json!({ "targetBlockId": ids })
}

// ============================================================================
// Guard properties
// ============================================================================

#[tokio::test]
async fn deletion_blocked_only_above_batch_limit_or_when_emptying() {
    // 5 of 10 is exactly the 50% limit: allowed
    let mut d = dispatcher(paragraphs(10));
    let outcome = run_one(&mut d, "c", "deleteContent", delete_ids(5)).await;
    assert!(outcome.is_applied(), "{outcome:?}");
    assert_eq!(d.document().read().block_count(), 5);

    // 6 of 10 exceeds it
    let mut d = dispatcher(paragraphs(10));
    let outcome = run_one(&mut d, "c", "deleteContent", delete_ids(6)).await;
    assert!(matches!(outcome, DispatchOutcome::Blocked(_)));
    assert_eq!(d.document().read().block_count(), 10);

    // everything
    let mut d = dispatcher(paragraphs(1));
    let outcome = run_one(&mut d, "c", "deleteContent", json!({ "targetBlockId": "p0" })).await;
    match outcome {
        DispatchOutcome::Blocked(result) => {
            assert!(!result.is_allowed);
            assert!(result.error_message.is_some());
        }
        other => panic!("expected block, got {other:?}"),
    }
    assert_eq!(ids(&d), vec!["p0"]);

    // a blank document's lone empty paragraph
    let blank = shared_document(BlockDocument::new("doc"));
    let only = blank.read().blocks()[0].id.clone();
    let mut d = ToolCallDispatcher::new(blank, &EngineConfig::default());
    let outcome = run_one(&mut d, "c", "deleteContent", json!({ "targetBlockId": only.as_str() })).await;
    assert!(matches!(outcome, DispatchOutcome::Blocked(_)));
    assert_eq!(d.document().read().block_count(), 1);
}

#[tokio::test]
async fn modification_blocked_only_for_large_disproportionate_replacements() {
    let cases = [
        // (existing chars, new chars, blocked)
        (100, 9, true),
        (100, 10, false),
        (99, 1, false),
        (400, 10, true),
        (400, 400, false),
    ];
    for (existing, new, blocked) in cases {
        let mut d = dispatcher(vec![Block::paragraph("a".repeat(existing)).id("p"), Block::paragraph("tail")]);
        let outcome = run_one(
            &mut d,
            "m",
            "modifyContent",
            json!({ "targetBlockId": "p", "newMarkdownContent": "b".repeat(new) }),
        )
        .await;
        assert_eq!(
            matches!(outcome, DispatchOutcome::Blocked(_)),
            blocked,
            "{existing} -> {new}: {outcome:?}"
        );
        let first = texts(&d).remove(0);
        if blocked {
            assert_eq!(first, "a".repeat(existing));
        } else {
            assert_eq!(first, "b".repeat(new));
        }
    }
}

#[tokio::test]
async fn target_text_edits_escape_the_ratio_rule() {
    let long = format!("{} the budget is 10 dollars.", "context ".repeat(60));
    let mut d = dispatcher(vec![Block::paragraph(long.clone()).id("p")]);
    let outcome = run_one(
        &mut d,
        "m",
        "modifyContent",
        json!({ "targetBlockId": "p", "targetText": "10", "newMarkdownContent": "12" }),
    )
    .await;
    assert!(outcome.is_applied(), "{outcome:?}");
    assert_eq!(texts(&d), vec![long.replace("10 dollars", "12 dollars")]);
}

#[tokio::test]
async fn emptying_a_parent_item_keeps_its_children() {
    let mut blocks = paragraphs(10);
    blocks.push(
        Block::with_text(BlockKind::BulletListItem, "Groceries").id("g").children(vec![
            Block::with_text(BlockKind::BulletListItem, "milk").id("c1"),
            Block::with_text(BlockKind::BulletListItem, "eggs").id("c2"),
        ]),
    );
    let mut d = dispatcher(blocks);

    let outcome = run_one(
        &mut d,
        "d",
        "deleteContent",
        json!({ "targetBlockId": "g", "targetText": "Groceries" }),
    )
    .await;
    assert!(outcome.is_applied(), "{outcome:?}");

    let doc = d.document().read();
    let parent = doc.get(&BlockId::new("g")).unwrap();
    assert!(parent.plain_text().is_empty());
    assert!(doc.contains(&BlockId::new("c1")));
    assert!(doc.contains(&BlockId::new("c2")));
    assert_eq!(doc.block_count(), 13);
}

// ============================================================================
// Dispatch properties
// ============================================================================

#[tokio::test]
async fn repeated_snapshots_apply_each_call_once() {
    let mut d = dispatcher(vec![Block::paragraph("X").id("x")]);
    let mut snapshot = vec![ToolCallEvent::call("c1", "addContent", json!({ "markdownContent": "Y" }))];

    d.process_delta(&snapshot).await;
    snapshot.push(ToolCallEvent::call("c2", "addContent", json!({ "markdownContent": "Z" })));
    let report = d.process_delta(&snapshot).await;
    d.process_delta(&snapshot).await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].tool_call_id, "c2");
    assert_eq!(texts(&d), vec!["X", "Y", "Z"]);
    assert_eq!(d.processed_count(), 2);
}

#[tokio::test]
async fn add_to_single_block_appends() {
    let mut d = dispatcher(vec![Block::paragraph("X").id("x")]);
    let outcome = run_one(&mut d, "a", "addContent", json!({ "markdownContent": "Y" })).await;
    assert!(outcome.is_applied());
    assert_eq!(texts(&d), vec!["X", "Y"]);
    assert_eq!(ids(&d)[0], "x");
}

#[tokio::test]
async fn modifying_one_list_item_replaces_the_whole_list() {
    let mut blocks = vec![Block::heading(2, "Groceries").id("h")];
    blocks.extend(bullets("li", 10));
    blocks.push(Block::paragraph("After the list").id("after"));
    let mut d = dispatcher(blocks);

    let outcome = run_one(
        &mut d,
        "m",
        "modifyContent",
        json!({ "targetBlockId": "li4", "newMarkdownContent": "- milk\n- eggs\n- bread" }),
    )
    .await;
    let DispatchOutcome::Applied(report) = outcome else {
        panic!("expected applied, got {outcome:?}");
    };
    assert_eq!(report.removed, 10);

    let now = ids(&d);
    assert!(now.iter().all(|id| !id.starts_with("li")), "{now:?}");
    assert_eq!(texts(&d), vec!["Groceries", "milk", "eggs", "bread", "After the list"]);
}

#[tokio::test]
async fn declined_replacement_leaves_blocks_untouched() {
    let mut d = dispatcher(paragraphs(3));
    let before = d.document().read().snapshot();
    let version = d.document().read().version();

    let outcome = run_one(
        &mut d,
        "r",
        "replaceAllContent",
        json!({ "newMarkdownContent": "# Fresh start", "requireConfirmation": true }),
    )
    .await;
    assert_eq!(outcome, DispatchOutcome::AwaitingConfirmation);
    assert_eq!(d.decline("r").unwrap().outcome, DispatchOutcome::Declined);

    assert_eq!(d.document().read().snapshot(), before);
    assert_eq!(d.document().read().version(), version);
    assert!(d.pending_confirmations().is_empty());
}

#[tokio::test]
async fn replacement_without_confirmation_can_be_undone() {
    let mut d = dispatcher(paragraphs(3));
    let before = d.document().read().snapshot();
    let outcome = run_one(&mut d, "r", "replaceAllContent", json!({ "newMarkdownContent": "# Fresh start" })).await;
    assert!(outcome.is_applied());
    assert_eq!(texts(&d), vec!["Fresh start"]);

    assert!(d.document().write().undo());
    assert_eq!(d.document().read().snapshot(), before);
}

// ============================================================================
// Line targeting
// ============================================================================

#[test]
fn relative_positions_stay_in_bounds() {
    let mut blocks = vec![Block::paragraph("intro").id("p0")];
    blocks.extend(bullets("l", 3));
    blocks.push(Block::paragraph("outro").id("p4"));
    let lines = DocumentLines::analyze(&blocks, &ResolverConfig::default());
    let count = lines.line_count();

    for reference in ["p0", "l0", "l1", "l2", "p4"] {
        for direction in [Direction::Before, Direction::After] {
            for offset in 0..8 {
                for respect in [false, true] {
                    let selector = LineSelector::Relative {
                        reference_block_id: BlockId::new(reference),
                        direction,
                        offset,
                        respect_unit_boundaries: respect,
                    };
                    let line = lines.resolve(&selector).line.unwrap();
                    assert!(line.line_number < count);
                    if respect && reference.starts_with('l') {
                        assert!(line.block_id.as_str().starts_with('l'), "{reference} {direction:?} {offset}");
                    }
                }
            }
        }
    }

    let far = LineSelector::Relative {
        reference_block_id: BlockId::new("l0"),
        direction: Direction::After,
        offset: 10,
        respect_unit_boundaries: true,
    };
    let resolution = lines.resolve(&far);
    assert_eq!(resolution.line.unwrap().block_id, BlockId::new("l2"));
    assert!(!resolution.warnings.is_empty());
}

#[tokio::test]
async fn line_selectors_drive_edits() {
    let mut d = dispatcher(vec![
        Block::heading(1, "Plan").id("h"),
        Block::paragraph("Ship it on Friday").id("p1"),
        Block::paragraph("Remove me").id("p2"),
    ]);
    let events = vec![
        ToolCallEvent::call(
            "m",
            "modifyContent",
            json!({ "targetLine": { "search": "FRIDAY" }, "targetText": "Friday", "newMarkdownContent": "Monday" }),
        ),
        ToolCallEvent::call("d", "deleteContent", json!({ "targetLine": { "lineNumber": 2 } })),
    ];
    let report = d.process_delta(&events).await;
    assert_eq!(report.applied(), 2, "{:?}", report.records);
    assert_eq!(texts(&d), vec!["Plan", "Ship it on Monday"]);
}

// ============================================================================
// Autosave
// ============================================================================

#[tokio::test(start_paused = true)]
async fn edits_during_debounce_produce_one_save_with_latest_content() {
    let store = Arc::new(MemoryDocumentStore::new());
    let doc = doc_with(vec![Block::paragraph("X")]);
    let autosave = AutosaveController::new(doc.clone(), store.clone(), AutosaveConfig::default());
    let mut d = ToolCallDispatcher::new(doc, &EngineConfig::default()).with_autosave(autosave.clone());

    for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
        run_one(&mut d, &format!("c{i}"), "addContent", json!({ "markdownContent": text })).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(store.save_count(), 0);
    assert_eq!(autosave.status(), AutosaveStatus::Unsaved);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(store.save_count(), 1);
    let saved = store.load("doc").await.unwrap().unwrap();
    let saved: Vec<String> = saved.iter().map(|b| b.plain_text()).collect();
    assert_eq!(saved, vec!["X", "one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn failed_save_keeps_content_until_flushed() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.fail_next(1);
    let doc = doc_with(vec![Block::paragraph("X")]);
    let autosave = AutosaveController::new(doc.clone(), store.clone(), AutosaveConfig::default());
    let mut d = ToolCallDispatcher::new(doc, &EngineConfig::default()).with_autosave(autosave.clone());

    run_one(&mut d, "c", "addContent", json!({ "markdownContent": "keep" })).await;
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(autosave.status(), AutosaveStatus::Error);
    assert!(autosave.has_pending_changes());
    assert!(store.get("doc").is_none());
    assert_eq!(texts(&d), vec!["X", "keep"]);

    autosave.flush().await.unwrap();
    assert_eq!(autosave.status(), AutosaveStatus::Saved);
    assert!(store.get("doc").unwrap().markdown.ends_with("keep"));
}
