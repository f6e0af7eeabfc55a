//! Analysis pipeline
//!
//! UNIFIED LOOP:
//! QUERY → COLLECT MARKET DATA → MARKET → TECHNICAL → NEWS → SYNTHESIS → FORMAT → RELAY?
//!
//! Stages run strictly in sequence; each reads the ledger built so far.
//! Every run owns a fresh ledger, so overlapping runs cannot interleave.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::AnalystError;
use crate::formatter::{FormattedResponse, ResponseFormatter};
use crate::gemini::{CompletionModel, GeminiClient};
use crate::http::Transport;
use crate::ledger::{ConversationLedger, LedgerRole};
use crate::market::CoinGeckoClient;
use crate::models::{format_news, MarketSnapshot, NewsItem};
use crate::monitor::{self, ThresholdSuggestion};
use crate::relay::TelegramRelay;
use crate::retry::RetryableFetcher;
use crate::stages::{default_stages, StageDescriptor, StageInput};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    CollectingMarketData,
    MarketStage,
    TechnicalStage,
    NewsStage,
    SynthesisStage,
    Formatted,
    Relayed,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::CollectingMarketData => "collecting market data",
            PipelinePhase::MarketStage => "market stage",
            PipelinePhase::TechnicalStage => "technical stage",
            PipelinePhase::NewsStage => "news stage",
            PipelinePhase::SynthesisStage => "synthesis stage",
            PipelinePhase::Formatted => "formatted",
            PipelinePhase::Relayed => "relayed",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub query: String,
    pub snapshot: MarketSnapshot,
    pub news: Vec<NewsItem>,
    pub synthesis: String,
    pub formatted: FormattedResponse,
    pub ledger: ConversationLedger,
    pub phase: PipelinePhase,
}

impl AnalysisReport {
    /// Send the plain-text rendering through the relay. Single attempt.
    pub async fn relay(&mut self, relay: &TelegramRelay) -> Result<()> {
        relay.relay(&self.formatted.plain).await?;
        self.phase = PipelinePhase::Relayed;
        info!(run_id = %self.ledger.run_id, "Analysis relayed");
        Ok(())
    }
}

/// Per-run state: the phase and the run's own ledger
struct AnalysisRun {
    phase: PipelinePhase,
    ledger: ConversationLedger,
}

impl AnalysisRun {
    fn start(query: &str) -> Self {
        let mut ledger = ConversationLedger::new();
        ledger.append(LedgerRole::User, query.to_string(), None);

        info!(run_id = %ledger.run_id, query = %query, "Analysis started");

        Self {
            phase: PipelinePhase::Idle,
            ledger,
        }
    }

    fn advance(&mut self, phase: PipelinePhase) {
        info!(run_id = %self.ledger.run_id, from = %self.phase, to = %phase, "Pipeline phase");
        self.phase = phase;
    }

    fn fail_in(&self, phase: PipelinePhase, cause: AnalystError) -> AnalystError {
        error!(run_id = %self.ledger.run_id, %phase, error = %cause, "Analysis failed");
        AnalystError::analysis_failed(phase, cause)
    }

    fn fail(&self, cause: AnalystError) -> AnalystError {
        self.fail_in(self.phase, cause)
    }
}

/// Orchestrates collectors and stages for one query at a time per call
pub struct AnalysisPipeline {
    market: Arc<CoinGeckoClient>,
    model: Arc<dyn CompletionModel>,
    stages: Vec<StageDescriptor>,
    formatter: ResponseFormatter,
}

impl AnalysisPipeline {
    pub fn new(market: Arc<CoinGeckoClient>, model: Arc<dyn CompletionModel>) -> Self {
        Self::with_stages(market, model, default_stages())
    }

    /// Wire the CoinGecko collectors and Gemini client over one transport
    pub fn from_config(config: &AppConfig, transport: Arc<dyn Transport>) -> Self {
        let fetcher = RetryableFetcher::new(transport, config.retry);
        let market = Arc::new(CoinGeckoClient::new(fetcher.clone(), &config.coingecko_base_url));
        let model = Arc::new(GeminiClient::new(
            fetcher,
            config.gemini_api_key.clone(),
            &config.gemini_base_url,
            &config.gemini_model,
        ));

        Self::new(market, model)
    }

    pub fn with_stages(
        market: Arc<CoinGeckoClient>,
        model: Arc<dyn CompletionModel>,
        stages: Vec<StageDescriptor>,
    ) -> Self {
        Self {
            market,
            model,
            stages,
            formatter: ResponseFormatter::new(),
        }
    }

    pub fn market(&self) -> &Arc<CoinGeckoClient> {
        &self.market
    }

    /// Run the full analysis for `query`.
    ///
    /// Collector failures abort in `CollectingMarketData`; completion
    /// failures abort in the failing stage's phase. The trending collector
    /// never aborts a run.
    pub async fn run_analysis(&self, query: &str) -> Result<AnalysisReport> {
        let mut run = AnalysisRun::start(query);

        run.advance(PipelinePhase::CollectingMarketData);
        let price = self.market.current_price().await.map_err(|e| run.fail(e))?;
        let chart = self.market.historical_chart().await.map_err(|e| run.fail(e))?;
        let snapshot = MarketSnapshot::from_chart(price, &chart);
        let market_text = snapshot.to_prompt_text();

        let mut news: Vec<NewsItem> = Vec::new();
        let mut previous: Option<String> = None;

        for stage in &self.stages {
            run.advance(stage.kind.phase());

            let (data, data_analyzed) = match stage.input {
                StageInput::MarketData => (market_text.clone(), Some(market_text.clone())),
                StageInput::FreshChart => {
                    let fresh = self.market.historical_chart().await.map_err(|e| {
                        run.fail_in(PipelinePhase::CollectingMarketData, e)
                    })?;
                    let summary = fresh.technical_summary();
                    (summary.clone(), Some(summary))
                }
                StageInput::TrendingNews => {
                    news = self.market.trending_news().await;
                    if news.is_empty() {
                        warn!(run_id = %run.ledger.run_id, "No trending items, news stage runs without news");
                    }
                    (format_news(&news), Some(serde_json::to_string(&news)?))
                }
                StageInput::Ledger => (String::new(), None),
            };

            let result = stage
                .execute(
                    self.model.as_ref(),
                    &mut run.ledger,
                    query,
                    previous.as_deref(),
                    &data,
                    data_analyzed,
                )
                .await;
            let output = result.map_err(|e| run.fail(e))?;

            previous = Some(output);
        }

        let synthesis = previous.unwrap_or_default();
        let formatted = self.formatter.format(&synthesis);
        run.advance(PipelinePhase::Formatted);

        info!(
            run_id = %run.ledger.run_id,
            entries = run.ledger.len(),
            title = %formatted.title,
            "Analysis complete"
        );

        Ok(AnalysisReport {
            query: query.to_string(),
            snapshot,
            news,
            synthesis,
            formatted,
            ledger: run.ledger,
            phase: run.phase,
        })
    }

    /// Spot price for quick display, outside any run
    pub async fn current_price(&self) -> Result<Decimal> {
        self.market.current_price().await
    }

    /// Ask the model for a price-alert threshold, outside any run
    pub async fn suggest_threshold(&self) -> Result<ThresholdSuggestion> {
        monitor::suggest_threshold(&self.market, self.model.as_ref()).await
    }
}
