//! Conversation ledger
//!
//! Append-only record of one analysis run: the user's query followed by
//! each stage's output. Every stage reads the whole ledger as context.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Author of a ledger entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerRole {
    User,
    MarketAgent,
    TechnicalAgent,
    NewsAgent,
    SynthesisAgent,
}

impl fmt::Display for LedgerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LedgerRole::User => "user",
            LedgerRole::MarketAgent => "market_agent",
            LedgerRole::TechnicalAgent => "technical_agent",
            LedgerRole::NewsAgent => "news_agent",
            LedgerRole::SynthesisAgent => "synthesis_agent",
        };
        write!(f, "{}", s)
    }
}

/// A single entry; never mutated after it is appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub role: LedgerRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Snapshot of the input that produced this entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_analyzed: Option<String>,
}

impl LedgerEntry {
    /// ISO-8601 timestamp with millisecond precision
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Ledger owned by exactly one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLedger {
    pub run_id: Uuid,
    entries: Vec<LedgerEntry>,
}

impl ConversationLedger {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entries: Vec::new(),
        }
    }

    /// Append an entry. Timestamps never go backwards even if the wall
    /// clock does.
    pub fn append(
        &mut self,
        role: LedgerRole,
        content: String,
        data_analyzed: Option<String>,
    ) -> &LedgerEntry {
        let now = Utc::now();
        let timestamp = match self.entries.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        self.entries.push(LedgerEntry {
            role,
            content,
            timestamp,
            data_analyzed,
        });

        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub fn roles(&self) -> Vec<LedgerRole> {
        self.entries.iter().map(|e| e.role).collect()
    }

    /// `role: content` per line
    pub fn render_plain(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `[role at timestamp]: content` per line
    pub fn render_timestamped(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("[{} at {}]: {}", e.role, e.timestamp_iso(), e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Full history with the data each entry analyzed, `---` separated
    pub fn render_with_data(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "[{} at {}]:\n{}\nData Analyzed: {}\n---",
                    e.role,
                    e.timestamp_iso(),
                    e.content,
                    e.data_analyzed.as_deref().unwrap_or("none")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ConversationLedger {
    fn default() -> Self {
        Self::new()
    }
}
