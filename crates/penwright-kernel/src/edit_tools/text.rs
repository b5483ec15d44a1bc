//! Substring edits over styled inline spans.
//!
//! A block's text is spread across spans with different styles. These
//! helpers find the first occurrence of a literal in the concatenated text
//! and rewrite only the spans it covers, leaving everything around it as it
//! was. The replacement takes the style of the span where the match begins.

use penwright_types::{InlineSpan, SpanStyles, spans_text};

/// Replace the first occurrence of `needle`. `None` when it does not occur.
pub fn replace_first(spans: &[InlineSpan], needle: &str, replacement: &str) -> Option<Vec<InlineSpan>> {
    if needle.is_empty() {
        return None;
    }
    let full = spans_text(spans);
    let start = full.find(needle)?;
    let end = start + needle.len();

    let mut out: Vec<InlineSpan> = Vec::with_capacity(spans.len() + 1);
    let mut offset = 0;
    for span in spans {
        let (span_start, span_end) = (offset, offset + span.text.len());
        offset = span_end;

        if span_start < start {
            let cut = start.min(span_end) - span_start;
            push(&mut out, &span.text[..cut], &span.styles);
        }
        if (span_start..span_end).contains(&start) {
            push(&mut out, replacement, &span.styles);
        }
        if span_end > end {
            let from = end.max(span_start) - span_start;
            push(&mut out, &span.text[from..], &span.styles);
        }
    }
    Some(out)
}

/// Remove the first occurrence of `needle`.
pub fn remove_first(spans: &[InlineSpan], needle: &str) -> Option<Vec<InlineSpan>> {
    replace_first(spans, needle, "")
}

/// Append text, merging into the previous span when styles match.
fn push(out: &mut Vec<InlineSpan>, text: &str, styles: &SpanStyles) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if &last.styles == styles => last.text.push_str(text),
        _ => out.push(InlineSpan::styled(text, styles.clone())),
    }
}
