//! Batch driver: runs every email document in a folder through
//! parse → dedup gate → classify, one file at a time.
//!
//! A failure on one file is recorded in the report and the batch continues.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::dedup::{DedupGate, GateDecision};
use crate::pipeline::parser::parse_email;
use crate::pipeline::types::{BatchReport, EmailRecord, FileOutcome, OutcomeKind};

/// Destination for per-file ticket and skip lines.
type ConsoleSink = Mutex<Box<dyn Write + Send>>;

fn sink(writer: impl Write + Send + 'static) -> ConsoleSink {
    let boxed: Box<dyn Write + Send> = Box::new(writer);
    Mutex::new(boxed)
}

/// Drives a folder of email documents through the pipeline.
pub struct BatchDriver {
    gate: DedupGate,
    classifier: Arc<dyn Classifier>,
    extension: String,
    console: Option<ConsoleSink>,
}

impl BatchDriver {
    /// `extension` is matched against the file name suffix, without the dot.
    pub fn new(gate: DedupGate, classifier: Arc<dyn Classifier>, extension: &str) -> Self {
        Self {
            gate,
            classifier,
            extension: extension.trim_start_matches('.').to_string(),
            console: Some(sink(std::io::stdout())),
        }
    }

    /// Toggle printing of per-file lines to stdout.
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console.then(|| sink(std::io::stdout()));
        self
    }

    /// Send per-file lines to `writer` instead of stdout.
    pub fn with_console_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.console = Some(sink(writer));
        self
    }

    pub fn gate(&self) -> &DedupGate {
        &self.gate
    }

    /// Whether a directory entry name is an email document.
    pub fn is_email_document(&self, name: &str) -> bool {
        name.ends_with(&format!(".{}", self.extension))
    }

    /// Process every email document in `folder`, in listing order.
    ///
    /// Every directory entry takes a sequence index, including the ones that
    /// are skipped. Only a failure to list the folder aborts the run.
    pub async fn run(&self, folder: &Path) -> Result<BatchReport, Error> {
        let io_err = |source| Error::Io {
            path: folder.display().to_string(),
            source,
        };

        let mut entries = tokio::fs::read_dir(folder).await.map_err(io_err)?;
        let mut report = BatchReport::default();
        let mut index = 0usize;

        info!(folder = %folder.display(), "Scanning for email documents");

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let sequence_index = index;
            index += 1;

            let name = entry.file_name().to_string_lossy().to_string();
            if !self.is_email_document(&name) {
                debug!(name = %name, "Skipping non-email entry");
                continue;
            }

            let path = entry.path();
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    debug!(name = %name, "Skipping non-file entry");
                    continue;
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Cannot stat entry, skipping");
                    continue;
                }
            }

            let outcome = match tokio::fs::read(&path).await {
                Ok(raw) => self.process_file(&name, sequence_index, &raw).await,
                Err(e) => FileOutcome::new(
                    &name,
                    sequence_index,
                    None,
                    OutcomeKind::Failed {
                        error: format!("read failed: {e}"),
                    },
                ),
            };

            self.emit(&outcome);
            report.push(outcome);
        }

        info!(
            total = report.total(),
            classified = report.classified(),
            duplicates = report.duplicates(),
            failed = report.failed(),
            "Batch processing complete"
        );
        Ok(report)
    }

    /// Run one raw email document through parse → gate → classify.
    pub async fn process_file(&self, name: &str, sequence_index: usize, raw: &[u8]) -> FileOutcome {
        let parsed = match parse_email(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                return FileOutcome::new(
                    name,
                    sequence_index,
                    None,
                    OutcomeKind::Failed {
                        error: Error::from(e).to_string(),
                    },
                );
            }
        };

        let record = EmailRecord {
            from: parsed.from,
            to: parsed.to,
            cc: parsed.cc,
            body: parsed.body,
            source_name: name.to_string(),
            sequence_index,
        };

        let fingerprint = match self.gate.admit(&record) {
            GateDecision::Duplicate(fp) => {
                return FileOutcome::new(name, sequence_index, Some(fp), OutcomeKind::Duplicate);
            }
            GateDecision::New(fp) => fp,
        };

        info!(
            name = %name,
            index = sequence_index,
            fingerprint = %fingerprint,
            "Classifying email"
        );

        let kind = match self.classifier.classify(&record.body).await {
            Ok(result) => OutcomeKind::Classified { result },
            // The fingerprint stays recorded: identical content later in
            // this run is skipped, not retried.
            Err(e) => OutcomeKind::Failed {
                error: Error::from(e).to_string(),
            },
        };

        FileOutcome::new(name, sequence_index, Some(fingerprint), kind)
    }

    fn emit(&self, outcome: &FileOutcome) {
        match &outcome.kind {
            OutcomeKind::Failed { error } => {
                error!(
                    name = %outcome.source_name,
                    index = outcome.sequence_index,
                    error = %error,
                    "Failed to process email"
                );
            }
            _ => {
                if let Some(console) = &self.console {
                    let mut out = console.lock().unwrap_or_else(|p| p.into_inner());
                    if let Err(e) = writeln!(out, "{}", outcome.console_line()) {
                        warn!(error = %e, "Failed to write console line");
                    }
                }
            }
        }
    }
}
