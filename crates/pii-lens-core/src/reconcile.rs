use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::catalog::CategoryId;
use crate::document::SourceDocument;
use crate::validate::ValidatedSpan;

/// One contiguous slice of the document for a single render pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderSegment {
    Plain { text: String },
    Annotated { text: String, category: CategoryId },
}

impl RenderSegment {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Annotated { text, .. } => text,
        }
    }

    #[must_use]
    pub fn category(&self) -> Option<&CategoryId> {
        match self {
            Self::Plain { .. } => None,
            Self::Annotated { category, .. } => Some(category),
        }
    }
}

// Start ascending; on equal start the longer span sorts first. Sorting is stable, so
// spans identical in both keys keep input order.
fn span_order(lhs: &ValidatedSpan, rhs: &ValidatedSpan) -> Ordering {
    lhs.start.cmp(&rhs.start).then_with(|| rhs.end.cmp(&lhs.end))
}

/// Sort spans into reconciliation order.
pub fn sort_spans(spans: &mut [ValidatedSpan]) {
    spans.sort_by(span_order);
}

/// Partition `doc` into plain and annotated segments.
///
/// Overlapping spans are resolved first-start-wins: a span starting before the end of the
/// previously emitted annotation is dropped. Spans that do not fit `doc` are skipped.
/// Concatenating the segment texts always reproduces `doc`.
#[must_use]
pub fn reconcile(spans: &[ValidatedSpan], doc: &SourceDocument) -> Vec<RenderSegment> {
    let mut ordered = spans
        .iter()
        .filter(|span| span.start < span.end && span.end <= doc.len())
        .collect::<Vec<_>>();
    ordered.sort_by(|lhs, rhs| span_order(lhs, rhs));

    let mut segments = Vec::with_capacity(ordered.len() * 2 + 1);
    let mut last_index = 0_usize;
    let mut dropped = 0_usize;
    for span in ordered {
        if span.start < last_index {
            dropped += 1;
            continue;
        }
        if span.start > last_index {
            push_plain(&mut segments, doc, last_index, span.start);
        }
        if let Some(text) = doc.slice(span.start, span.end) {
            segments.push(RenderSegment::Annotated {
                text: text.to_string(),
                category: span.category.clone(),
            });
        }
        last_index = span.end;
    }

    if last_index < doc.len() {
        push_plain(&mut segments, doc, last_index, doc.len());
    }

    if dropped > 0 {
        tracing::debug!(dropped, "overlapping spans dropped during reconciliation");
    }

    segments
}

fn push_plain(segments: &mut Vec<RenderSegment>, doc: &SourceDocument, start: usize, end: usize) {
    if let Some(text) = doc.slice(start, end) {
        segments.push(RenderSegment::Plain { text: text.to_string() });
    }
}
