//! Ticket triage: dedup-gated LLM classification of banking support emails.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
