use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateSpan, Confidence};
use crate::catalog::{Category, CategoryId};
use crate::document::SourceDocument;
use crate::normalize::Normalizer;

/// Characters added on each side of the proposed window before fuzzy recovery gives up.
pub const DEFAULT_FUZZY_PADDING: usize = 2;

/// Why a candidate was dropped. Checks run in declaration order; the first failure wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MissingField,
    OutOfBounds,
    CategoryNotRequested,
    IndexMismatch,
}

impl RejectionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::OutOfBounds => "out_of_bounds",
            Self::CategoryNotRequested => "category_not_requested",
            Self::IndexMismatch => "index_mismatch",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// `doc[start..end] == value`.
    Exact,
    /// `value` was found inside the padded window; offsets are the oracle's, unchanged.
    Fuzzy,
}

/// A span that passed [`SpanValidator::validate`] against its document.
///
/// This is also the wire type for `/v1/reconcile` and `pii-lens reconcile --spans`, so a
/// deserialized value carries no guarantee: its offsets may not fit the document and `value`
/// may not match the text. [`crate::reconcile`] drops spans whose range does not fit and always
/// renders the document's own characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatedSpan {
    pub category: CategoryId,
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub confidence: Confidence,
    pub match_kind: MatchKind,
}

/// Per-scan counters for the diagnostics channel. Never shown to end users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationDiagnostics {
    pub candidates: usize,
    pub accepted: usize,
    pub fuzzy_recovered: usize,
    pub rejected: BTreeMap<RejectionReason, usize>,
}

impl ValidationDiagnostics {
    #[must_use]
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    #[must_use]
    pub fn rejected_for(&self, reason: RejectionReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpanValidator<'a> {
    normalizer: &'a Normalizer,
    fuzzy_padding: usize,
}

impl<'a> SpanValidator<'a> {
    #[must_use]
    pub fn new(normalizer: &'a Normalizer, fuzzy_padding: usize) -> Self {
        Self { normalizer, fuzzy_padding }
    }

    /// Accept or reject one candidate against `doc` and the requested categories.
    ///
    /// # Errors
    /// Returns the first [`RejectionReason`] that applies. Rejections are expected
    /// outcomes and carry no further detail.
    pub fn validate(
        &self,
        candidate: &CandidateSpan,
        doc: &SourceDocument,
        requested: &BTreeSet<CategoryId>,
    ) -> Result<ValidatedSpan, RejectionReason> {
        let value = candidate.value.as_deref().filter(|value| !value.is_empty());
        let (Some(value), Some(start), Some(end)) = (value, candidate.start, candidate.end) else {
            return Err(RejectionReason::MissingField);
        };
        if end <= start {
            return Err(RejectionReason::MissingField);
        }

        let (Ok(start), Ok(end)) = (usize::try_from(start), usize::try_from(end)) else {
            return Err(RejectionReason::OutOfBounds);
        };
        if end > doc.len() {
            return Err(RejectionReason::OutOfBounds);
        }

        let label = candidate.raw_category_label.as_deref().unwrap_or_default();
        let Category::Known(category) = self.normalizer.normalize(label) else {
            return Err(RejectionReason::CategoryNotRequested);
        };
        if !requested.contains(&category) {
            return Err(RejectionReason::CategoryNotRequested);
        }

        let match_kind =
            self.match_kind(doc, value, start, end).ok_or(RejectionReason::IndexMismatch)?;

        Ok(ValidatedSpan {
            category,
            value: value.to_string(),
            start,
            end,
            confidence: candidate.confidence,
            match_kind,
        })
    }

    /// Validate every candidate, keeping accepted spans in input order.
    #[must_use]
    pub fn validate_all(
        &self,
        candidates: &[CandidateSpan],
        doc: &SourceDocument,
        requested: &BTreeSet<CategoryId>,
    ) -> (Vec<ValidatedSpan>, ValidationDiagnostics) {
        let mut accepted = Vec::with_capacity(candidates.len());
        let mut diagnostics = ValidationDiagnostics {
            candidates: candidates.len(),
            ..ValidationDiagnostics::default()
        };

        for (index, candidate) in candidates.iter().enumerate() {
            match self.validate(candidate, doc, requested) {
                Ok(span) => {
                    if span.match_kind == MatchKind::Fuzzy {
                        diagnostics.fuzzy_recovered += 1;
                        tracing::debug!(
                            index,
                            start = span.start,
                            end = span.end,
                            category = %span.category,
                            "candidate span accepted via fuzzy recovery"
                        );
                    }
                    diagnostics.accepted += 1;
                    accepted.push(span);
                }
                Err(reason) => {
                    tracing::debug!(
                        index,
                        reason = reason.as_str(),
                        label = candidate.raw_category_label.as_deref().unwrap_or_default(),
                        "candidate span rejected"
                    );
                    *diagnostics.rejected.entry(reason).or_insert(0) += 1;
                }
            }
        }

        (accepted, diagnostics)
    }

    fn match_kind(
        &self,
        doc: &SourceDocument,
        value: &str,
        start: usize,
        end: usize,
    ) -> Option<MatchKind> {
        if doc.slice(start, end)? == value {
            return Some(MatchKind::Exact);
        }

        let window_start = start.saturating_sub(self.fuzzy_padding);
        let window_end = end.saturating_add(self.fuzzy_padding).min(doc.len());
        doc.slice(window_start, window_end)?.contains(value).then_some(MatchKind::Fuzzy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(ids: &[&str]) -> BTreeSet<CategoryId> {
        ids.iter()
            .map(|id| {
                CategoryId::parse(id).unwrap_or_else(|err| panic!("fixture id {id} invalid: {err}"))
            })
            .collect()
    }

    fn candidate(label: &str, value: &str, start: i64, end: i64) -> CandidateSpan {
        CandidateSpan {
            raw_category_label: Some(label.to_string()),
            value: Some(value.to_string()),
            start: Some(start),
            end: Some(end),
            confidence: Confidence::High,
        }
    }

    // `\n` is two literal characters here; the offsets below depend on it.
    fn fixture_doc() -> SourceDocument {
        SourceDocument::new(r"name,email\nAlice,alice@web.com")
    }

    // Test IDs: TVAL-001
    #[test]
    fn exact_substring_is_accepted_with_normalized_category() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let span = validator
            .validate(
                &candidate("emails", "alice@web.com", 18, 31),
                &fixture_doc(),
                &requested(&["NAME", "EMAIL"]),
            )
            .unwrap_or_else(|reason| panic!("candidate should validate: {reason:?}"));

        assert_eq!(span.category.as_str(), "EMAIL");
        assert_eq!(span.match_kind, MatchKind::Exact);
        assert_eq!(fixture_doc().slice(span.start, span.end), Some(span.value.as_str()));
    }

    // Test IDs: TVAL-002
    #[test]
    fn drifted_offsets_are_recovered_without_being_corrected() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let span = validator
            .validate(
                &candidate("NAME", "Alice", 13, 18),
                &fixture_doc(),
                &requested(&["NAME"]),
            )
            .unwrap_or_else(|reason| panic!("drift of one should be recovered: {reason:?}"));

        assert_eq!(span.match_kind, MatchKind::Fuzzy);
        assert_eq!((span.start, span.end), (13, 18));
        assert_ne!(fixture_doc().slice(span.start, span.end), Some("Alice"));
    }

    #[test]
    fn drift_beyond_padding_is_index_mismatch() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let result = validator.validate(
            &candidate("NAME", "Alice", 20, 25),
            &fixture_doc(),
            &requested(&["NAME"]),
        );
        assert_eq!(result, Err(RejectionReason::IndexMismatch));

        let strict = SpanValidator::new(&normalizer, 0);
        let result = strict.validate(
            &candidate("NAME", "Alice", 13, 18),
            &fixture_doc(),
            &requested(&["NAME"]),
        );
        assert_eq!(result, Err(RejectionReason::IndexMismatch));
    }

    #[test]
    fn fuzzy_window_is_clamped_to_document_bounds() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, 5);
        let doc = SourceDocument::new("Bob");
        let span = validator
            .validate(&candidate("NAME", "Bob", 1, 3), &doc, &requested(&["NAME"]))
            .unwrap_or_else(|reason| panic!("clamped window should still match: {reason:?}"));
        assert_eq!(span.match_kind, MatchKind::Fuzzy);
    }

    #[test]
    fn missing_or_inverted_fields_are_missing_field() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let doc = fixture_doc();
        let wanted = requested(&["NAME"]);

        let mut no_value = candidate("NAME", "Alice", 12, 17);
        no_value.value = None;
        assert_eq!(
            validator.validate(&no_value, &doc, &wanted),
            Err(RejectionReason::MissingField)
        );

        let empty_value = candidate("NAME", "", 12, 17);
        assert_eq!(
            validator.validate(&empty_value, &doc, &wanted),
            Err(RejectionReason::MissingField)
        );

        let mut no_end = candidate("NAME", "Alice", 12, 17);
        no_end.end = None;
        assert_eq!(validator.validate(&no_end, &doc, &wanted), Err(RejectionReason::MissingField));

        let inverted = candidate("NAME", "Alice", 17, 12);
        assert_eq!(
            validator.validate(&inverted, &doc, &wanted),
            Err(RejectionReason::MissingField)
        );

        let zero_width = candidate("NAME", "Alice", 12, 12);
        assert_eq!(
            validator.validate(&zero_width, &doc, &wanted),
            Err(RejectionReason::MissingField)
        );
    }

    #[test]
    fn negative_start_or_overlong_end_is_out_of_bounds() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let doc = fixture_doc();
        let wanted = requested(&["EMAIL"]);

        assert_eq!(
            validator.validate(&candidate("EMAIL", "name", -1, 4), &doc, &wanted),
            Err(RejectionReason::OutOfBounds)
        );
        assert_eq!(
            validator.validate(&candidate("EMAIL", "alice@web.com", 18, 32), &doc, &wanted),
            Err(RejectionReason::OutOfBounds)
        );

        for end in [
            serde_json::json!(18_446_744_073_709_551_615_u64),
            serde_json::json!(1e20),
            serde_json::json!("99999999999999999999"),
        ] {
            let oversized = CandidateSpan::from_value(&serde_json::json!({
                "category": "EMAIL",
                "value": "name",
                "start": 0,
                "end": end
            }));
            assert_eq!(
                validator.validate(&oversized, &doc, &wanted),
                Err(RejectionReason::OutOfBounds)
            );
        }
    }

    #[test]
    fn unrecognized_or_unrequested_category_is_rejected() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let doc = fixture_doc();
        let wanted = requested(&["NAME"]);

        assert_eq!(
            validator.validate(&candidate("XYZ_UNKNOWN", "Alice", 12, 17), &doc, &wanted),
            Err(RejectionReason::CategoryNotRequested)
        );
        assert_eq!(
            validator.validate(&candidate("EMAIL", "alice@web.com", 18, 31), &doc, &wanted),
            Err(RejectionReason::CategoryNotRequested)
        );

        let mut unlabeled = candidate("NAME", "Alice", 12, 17);
        unlabeled.raw_category_label = None;
        assert_eq!(
            validator.validate(&unlabeled, &doc, &wanted),
            Err(RejectionReason::CategoryNotRequested)
        );
    }

    #[test]
    fn check_order_reports_first_failure() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let doc = fixture_doc();
        // Out of bounds, unknown category and mismatched value at once.
        let result =
            validator.validate(&candidate("XYZ", "nowhere", 25, 99), &doc, &requested(&["NAME"]));
        assert_eq!(result, Err(RejectionReason::OutOfBounds));
    }

    #[test]
    fn validate_all_counts_outcomes_per_reason() {
        let normalizer = Normalizer::default();
        let validator = SpanValidator::new(&normalizer, DEFAULT_FUZZY_PADDING);
        let candidates = vec![
            candidate("NAME", "Alice", 12, 17),
            candidate("NAME", "Alice", 13, 18),
            candidate("EMAIL", "alice@web.com", 18, 31),
            candidate("NAME", "Bob", 0, 3),
            CandidateSpan::default(),
        ];

        let (accepted, diagnostics) =
            validator.validate_all(&candidates, &fixture_doc(), &requested(&["NAME"]));

        assert_eq!(accepted.len(), 2);
        assert_eq!(diagnostics.candidates, 5);
        assert_eq!(diagnostics.accepted, 2);
        assert_eq!(diagnostics.fuzzy_recovered, 1);
        assert_eq!(diagnostics.rejected_total(), 3);
        assert_eq!(diagnostics.rejected_for(RejectionReason::CategoryNotRequested), 1);
        assert_eq!(diagnostics.rejected_for(RejectionReason::IndexMismatch), 1);
        assert_eq!(diagnostics.rejected_for(RejectionReason::MissingField), 1);
    }
}
