use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use ticket_triage::config::AppConfig;
use ticket_triage::llm::create_provider;
use ticket_triage::pipeline::{BatchDriver, DedupGate, ProcessedSet, TicketClassifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries ticket output only.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Fail fast on missing credentials, before any file is read.
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export GROQ_API_KEY=gsk_...");
        std::process::exit(1);
    });

    let email_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.email_dir.clone());

    eprintln!("📨 Ticket Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.llm.backend.label());
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Folder: {}", email_dir.display());
    eprintln!("   Extension: .{}", config.email_extension);
    eprintln!("   Fingerprint: {:?}", config.fingerprint_scheme);
    eprintln!("   Retries: {}\n", config.retry.max_retries);

    let llm = create_provider(&config.llm).context("failed to create LLM provider")?;
    let classifier = TicketClassifier::new(llm, config.system_prompt.clone()).with_retry(config.retry);

    let gate = DedupGate::new(Arc::new(ProcessedSet::new()), config.fingerprint_scheme);
    let driver = BatchDriver::new(gate, Arc::new(classifier), &config.email_extension);

    let report = driver
        .run(&email_dir)
        .await
        .with_context(|| format!("failed to process folder {}", email_dir.display()))?;

    eprintln!("\n   {}", report.summary());
    for failure in report.failures() {
        eprintln!("   ✗ {}", failure.console_line());
    }

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
