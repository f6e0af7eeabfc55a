//! Analysis stages
//!
//! A stage is a descriptor: which agent it is, which input it needs, and a
//! prompt template. Executing a stage renders the template against the
//! ledger, asks the model, and appends the answer to the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::gemini::CompletionModel;
use crate::ledger::{ConversationLedger, LedgerRole};
use crate::pipeline::PipelinePhase;
use crate::Result;

pub mod prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Market,
    Technical,
    News,
    Synthesis,
}

impl StageKind {
    pub fn role(self) -> LedgerRole {
        match self {
            StageKind::Market => LedgerRole::MarketAgent,
            StageKind::Technical => LedgerRole::TechnicalAgent,
            StageKind::News => LedgerRole::NewsAgent,
            StageKind::Synthesis => LedgerRole::SynthesisAgent,
        }
    }

    pub fn phase(self) -> PipelinePhase {
        match self {
            StageKind::Market => PipelinePhase::MarketStage,
            StageKind::Technical => PipelinePhase::TechnicalStage,
            StageKind::News => PipelinePhase::NewsStage,
            StageKind::Synthesis => PipelinePhase::SynthesisStage,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageKind::Market => "Market Analysis Agent",
            StageKind::Technical => "Technical Analysis Agent",
            StageKind::News => "News Analysis Agent",
            StageKind::Synthesis => "Synthesis Agent",
        };
        write!(f, "{}", s)
    }
}

/// Which collector feeds a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// The run's market snapshot
    MarketData,
    /// A fresh historical chart pull
    FreshChart,
    /// Trending items standing in for news
    TrendingNews,
    /// Nothing beyond the ledger itself
    Ledger,
}

/// Everything a template may read
pub struct StageContext<'a> {
    pub query: &'a str,
    pub previous_output: Option<&'a str>,
    pub data: &'a str,
    pub ledger: &'a ConversationLedger,
}

pub type PromptTemplate = fn(&StageContext<'_>) -> String;

#[derive(Clone, Copy)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub input: StageInput,
    pub template: PromptTemplate,
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("kind", &self.kind)
            .field("input", &self.input)
            .finish()
    }
}

impl StageDescriptor {
    pub fn prompt(&self, ctx: &StageContext<'_>) -> String {
        (self.template)(ctx)
    }

    /// Run this stage and append its output to `ledger`.
    pub async fn execute(
        &self,
        model: &dyn CompletionModel,
        ledger: &mut ConversationLedger,
        query: &str,
        previous_output: Option<&str>,
        data: &str,
        data_analyzed: Option<String>,
    ) -> Result<String> {
        let prompt = self.prompt(&StageContext {
            query,
            previous_output,
            data,
            ledger,
        });

        info!(run_id = %ledger.run_id, stage = %self.kind, prompt_chars = prompt.len(), "Running stage");

        let output = model.complete(&prompt).await?;
        ledger.append(self.kind.role(), output.clone(), data_analyzed);

        info!(run_id = %ledger.run_id, stage = %self.kind, "Stage complete");

        Ok(output)
    }
}

/// The fixed Market → Technical → News → Synthesis sequence
pub fn default_stages() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor {
            kind: StageKind::Market,
            input: StageInput::MarketData,
            template: prompts::market_prompt,
        },
        StageDescriptor {
            kind: StageKind::Technical,
            input: StageInput::FreshChart,
            template: prompts::technical_prompt,
        },
        StageDescriptor {
            kind: StageKind::News,
            input: StageInput::TrendingNews,
            template: prompts::news_prompt,
        },
        StageDescriptor {
            kind: StageKind::Synthesis,
            input: StageInput::Ledger,
            template: prompts::synthesis_prompt,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedModel, MARKET_OUTPUT, TECHNICAL_OUTPUT};

    #[test]
    fn test_default_stage_order() {
        let kinds: Vec<StageKind> = default_stages().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![StageKind::Market, StageKind::Technical, StageKind::News, StageKind::Synthesis]
        );

        let roles: Vec<LedgerRole> = default_stages().iter().map(|s| s.kind.role()).collect();
        assert_eq!(roles[3], LedgerRole::SynthesisAgent);
    }

    #[tokio::test]
    async fn test_execute_appends_entry() {
        let model = ScriptedModel::new();
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerRole::User, "Should I buy BTC today?".into(), None);

        let stage = default_stages()[0];
        let output = stage
            .execute(&model, &mut ledger, "Should I buy BTC today?", None, "Current Market Data:", Some("Current Market Data:".into()))
            .await
            .unwrap();

        assert_eq!(output, MARKET_OUTPUT);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.last().unwrap().role, LedgerRole::MarketAgent);
        assert_eq!(ledger.last().unwrap().data_analyzed.as_deref(), Some("Current Market Data:"));

        let prompts = model.prompts();
        assert!(prompts[0].contains("User Query: Should I buy BTC today?"));
    }

    #[tokio::test]
    async fn test_technical_stage_in_isolation() {
        let model = ScriptedModel::new();
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerRole::User, "q".into(), None);
        ledger.append(LedgerRole::MarketAgent, MARKET_OUTPUT.into(), None);

        let stage = default_stages()[1];
        let output = stage
            .execute(&model, &mut ledger, "q", Some(MARKET_OUTPUT), "Historical Price Data (24h):", None)
            .await
            .unwrap();

        assert_eq!(output, TECHNICAL_OUTPUT);
        let prompt = &model.prompts()[0];
        assert!(prompt.contains("Previous Market Analysis:\nQUESTION TYPE: Yes/No"));
        assert!(prompt.contains("Technical Data:\nHistorical Price Data (24h):"));
    }

    #[tokio::test]
    async fn test_failed_stage_leaves_ledger_untouched() {
        let model = ScriptedModel::new().failing_on("Synthesis Agent");
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerRole::User, "q".into(), None);

        let stage = default_stages()[3];
        let result = stage.execute(&model, &mut ledger, "q", None, "", None).await;

        assert!(result.is_err());
        assert_eq!(ledger.len(), 1);
    }
}
