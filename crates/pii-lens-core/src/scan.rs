use std::collections::BTreeSet;

use serde::Serialize;

use crate::candidate::CandidateSpan;
use crate::catalog::{Catalog, CategoryId};
use crate::document::SourceDocument;
use crate::normalize::{CorrectionTable, Normalizer};
use crate::reconcile::{reconcile, sort_spans, RenderSegment};
use crate::summary::{summarize, CategoryCounts};
use crate::validate::{
    SpanValidator, ValidatedSpan, ValidationDiagnostics, DEFAULT_FUZZY_PADDING,
};
use crate::KernelError;

/// Accepted spans sorted by start, plus per-category counts.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScanResult {
    pub spans: Vec<ValidatedSpan>,
    pub category_counts: CategoryCounts,
}

impl ScanResult {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub result: ScanResult,
    pub diagnostics: ValidationDiagnostics,
}

/// Catalog, correction table and fuzzy padding for one deployment. Holds no per-scan state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    normalizer: Normalizer,
    fuzzy_padding: usize,
}

impl Engine {
    #[must_use]
    pub fn new(catalog: Catalog, corrections: CorrectionTable, fuzzy_padding: usize) -> Self {
        Self { normalizer: Normalizer::new(catalog, corrections), fuzzy_padding }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        self.normalizer.catalog()
    }

    #[must_use]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    #[must_use]
    pub fn fuzzy_padding(&self) -> usize {
        self.fuzzy_padding
    }

    #[must_use]
    pub fn validator(&self) -> SpanValidator<'_> {
        SpanValidator::new(&self.normalizer, self.fuzzy_padding)
    }

    /// # Errors
    /// Returns [`KernelError::UnknownCategory`] for a requested label outside the catalog.
    pub fn resolve_requested<S>(
        &self,
        labels: Option<&[S]>,
    ) -> Result<BTreeSet<CategoryId>, KernelError>
    where
        S: AsRef<str>,
    {
        self.normalizer.resolve_requested(labels)
    }

    /// Validate candidates and aggregate. An empty `requested` set short-circuits to an
    /// empty result without looking at the candidates.
    #[must_use]
    pub fn scan(
        &self,
        doc: &SourceDocument,
        candidates: &[CandidateSpan],
        requested: &BTreeSet<CategoryId>,
    ) -> ScanReport {
        if requested.is_empty() {
            return ScanReport {
                result: ScanResult::empty(),
                diagnostics: ValidationDiagnostics::default(),
            };
        }

        let (mut spans, diagnostics) = self.validator().validate_all(candidates, doc, requested);
        sort_spans(&mut spans);
        let category_counts = summarize(&spans, self.catalog());

        ScanReport { result: ScanResult { spans, category_counts }, diagnostics }
    }

    #[must_use]
    pub fn render(&self, result: &ScanResult, doc: &SourceDocument) -> Vec<RenderSegment> {
        reconcile(&result.spans, doc)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Catalog::default(), CorrectionTable::default(), DEFAULT_FUZZY_PADDING)
    }
}
