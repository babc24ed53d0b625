//! Shared types for the triage pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::dedup::Fingerprint;

// ── Email record ────────────────────────────────────────────────────

/// One parsed email document.
///
/// Built from the parser output plus the driver's file bookkeeping.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailRecord {
    /// Raw `From` header value.
    pub from: String,
    /// Raw `To` header value.
    pub to: String,
    /// Raw `Cc` header value, `None` when the header is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    /// Plain-text body, exactly as decoded.
    pub body: String,
    /// File name the record was read from.
    pub source_name: String,
    /// Zero-based position in the folder listing.
    pub sequence_index: usize,
}

impl EmailRecord {
    /// `Cc` as text, empty when absent.
    pub fn cc_text(&self) -> &str {
        self.cc.as_deref().unwrap_or("")
    }
}

// ── Per-file outcome ────────────────────────────────────────────────

/// What happened to one file.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The classifier returned a ticket (opaque text, trimmed).
    Classified { result: String },
    /// Content already seen in this run; classifier not called.
    Duplicate,
    /// Parsing, reading or classification failed for this file.
    Failed { error: String },
}

impl OutcomeKind {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Classified { .. } => "classified",
            Self::Duplicate => "duplicate",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of processing a single email document.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub source_name: String,
    pub sequence_index: usize,
    /// Present once the gate has fingerprinted the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(flatten)]
    pub kind: OutcomeKind,
    pub processed_at: DateTime<Utc>,
}

impl FileOutcome {
    pub fn new(
        source_name: impl Into<String>,
        sequence_index: usize,
        fingerprint: Option<Fingerprint>,
        kind: OutcomeKind,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            sequence_index,
            fingerprint,
            kind,
            processed_at: Utc::now(),
        }
    }

    /// Console line for this outcome.
    ///
    /// Duplicates print the skip notice, tickets print verbatim, failures
    /// name the file and the error.
    pub fn console_line(&self) -> String {
        match &self.kind {
            OutcomeKind::Classified { result } => result.clone(),
            OutcomeKind::Duplicate => format!("Skipping duplicate email: {}", self.source_name),
            OutcomeKind::Failed { error } => {
                format!("Failed to process email {}: {}", self.source_name, error)
            }
        }
    }
}

// ── Batch report ────────────────────────────────────────────────────

/// Outcomes of one batch run, in enumeration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: FileOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn classified(&self) -> usize {
        self.count(|k| matches!(k, OutcomeKind::Classified { .. }))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|k| matches!(k, OutcomeKind::Duplicate))
    }

    pub fn failed(&self) -> usize {
        self.count(|k| matches!(k, OutcomeKind::Failed { .. }))
    }

    /// Failed outcomes, for the final report.
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.kind, OutcomeKind::Failed { .. }))
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} email(s): {} classified, {} duplicate(s) skipped, {} failed",
            self.total(),
            self.classified(),
            self.duplicates(),
            self.failed()
        )
    }

    fn count(&self, pred: impl Fn(&OutcomeKind) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.kind)).count()
    }
}
