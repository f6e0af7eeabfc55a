//! Bitcoin Analyst
//!
//! Answers questions about Bitcoin by chaining four model prompts over live
//! market data:
//! - Collects spot price, the last day's chart and trending assets
//! - Runs Market, Technical, News and Synthesis stages in sequence
//! - Records every stage output in a per-run conversation ledger
//! - Renders the synthesis as HTML and plain text
//! - Optionally relays the result to a Telegram chat
//!
//! UNIFIED LOOP:
//! QUERY → COLLECT → MARKET → TECHNICAL → NEWS → SYNTHESIS → FORMAT → RELAY?

pub mod api;
pub mod config;
pub mod error;
pub mod formatter;
pub mod gemini;
pub mod http;
pub mod ledger;
pub mod market;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod relay;
pub mod retry;
pub mod stages;

#[cfg(test)]
mod testing;

pub use error::{AnalystError, Result};

// Re-export common types
pub use models::*;
pub use config::AppConfig;
pub use pipeline::{AnalysisPipeline, AnalysisReport, PipelinePhase};
