//! Span extraction and reconciliation engine for oracle-proposed PII.
//!
//! The pipeline is `Catalog -> Normalizer -> SpanValidator -> reconcile / summarize`.
//! Every stage is a pure function over immutable inputs; nothing is retained between scans.

mod candidate;
mod catalog;
mod document;
mod normalize;
mod reconcile;
mod scan;
mod summary;
mod validate;

pub use candidate::{candidates_from_response, CandidateSpan, Confidence};
pub use catalog::{Catalog, Category, CategoryId, DEFAULT_CATEGORIES};
pub use document::SourceDocument;
pub use normalize::{fold_label, CorrectionTable, Normalizer, DEFAULT_CORRECTIONS};
pub use reconcile::{reconcile, sort_spans, RenderSegment};
pub use scan::{Engine, ScanReport, ScanResult};
pub use summary::{summarize, CategoryCounts};
pub use validate::{
    MatchKind, RejectionReason, SpanValidator, ValidatedSpan, ValidationDiagnostics,
    DEFAULT_FUZZY_PADDING,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}
