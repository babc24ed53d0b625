//! Email triage pipeline.
//!
//! Every email document in a folder flows through:
//! 1. `parser::parse_email()`: raw bytes to `From`/`To`/`Cc`/plain body
//! 2. `DedupGate::admit()`: content fingerprint, repeats are dropped here
//! 3. `Classifier::classify()`: LLM call producing a JSON ticket (new content only)
//! 4. `BatchDriver`: folder enumeration, per-file outcomes, console output
//!
//! **A fingerprint reaches the classifier at most once per dedup store.**

pub mod batch;
pub mod classifier;
pub mod dedup;
pub mod parser;
pub mod types;

pub use batch::BatchDriver;
pub use classifier::{Classifier, TicketClassifier};
pub use dedup::{DedupGate, DedupStore, Fingerprint, FingerprintScheme, GateDecision, ProcessedSet};
pub use parser::{ParsedEmail, parse_email};
pub use types::{BatchReport, EmailRecord, FileOutcome, OutcomeKind};
