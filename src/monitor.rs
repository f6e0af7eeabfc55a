//! Price-alert monitor
//!
//! Holds the last observed price and turns each new observation into zero
//! or more alerts. Polling and delivery live with the caller. The model can
//! also be asked to suggest an alert threshold from current market data.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::gemini::CompletionModel;
use crate::market::CoinGeckoClient;
use crate::models::{format_usd, MarketChart, PricePoint};
use crate::Result;

/// Chart points included in the suggestion prompt
const SUGGESTION_HISTORY_POINTS: usize = 5;

const SUGGESTION_KEYWORDS: [&str; 2] = ["threshold", "suggested"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriceAlert {
    SignificantMove {
        previous: Decimal,
        current: Decimal,
        /// Signed change in percent, two decimals
        change_pct: Decimal,
    },
    ThresholdCrossed {
        price: Decimal,
        threshold: Decimal,
    },
}

impl PriceAlert {
    /// Text sent to the relay
    pub fn message(&self) -> String {
        match self {
            PriceAlert::SignificantMove {
                previous,
                current,
                change_pct,
            } => format!(
                "Significant Bitcoin price change detected!\nPrevious price: {}\nCurrent price: {}\nChange: {:.2}%",
                format_usd(previous.round_dp(2)),
                format_usd(current.round_dp(2)),
                change_pct
            ),
            PriceAlert::ThresholdCrossed { price, threshold } => format!(
                "Bitcoin price has crossed the threshold!\nCurrent price: {}\nThreshold: {}",
                format_usd(price.round_dp(2)),
                format_usd(threshold.round_dp(2))
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceMonitor {
    threshold: Decimal,
    /// Fractional move (0.05 = 5%) that counts as significant
    significant_change: Decimal,
    last_price: Option<Decimal>,
}

impl PriceMonitor {
    pub fn new(threshold: Decimal, significant_change: Decimal) -> Self {
        Self {
            threshold,
            significant_change,
            last_price: None,
        }
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: Decimal) {
        self.threshold = threshold;
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    pub fn observe(&mut self, price: Decimal) -> Vec<PriceAlert> {
        let mut alerts = Vec::new();

        if let Some(previous) = self.last_price.filter(|p| !p.is_zero()) {
            match fractional_change(price, previous) {
                Some((change, change_pct)) if change.abs() >= self.significant_change => {
                    alerts.push(PriceAlert::SignificantMove {
                        previous,
                        current: price,
                        change_pct,
                    });
                }
                Some(_) => {}
                None => warn!(%previous, %price, "Price change overflowed, skipping move check"),
            }
        }

        if price >= self.threshold {
            alerts.push(PriceAlert::ThresholdCrossed {
                price,
                threshold: self.threshold,
            });
        }

        debug!(%price, alerts = alerts.len(), "Price observed");
        self.last_price = Some(price);
        alerts
    }
}

/// Fractional change and its percent form, `None` on overflow
fn fractional_change(price: Decimal, previous: Decimal) -> Option<(Decimal, Decimal)> {
    let change = price.checked_sub(previous)?.checked_div(previous)?;
    let pct = change
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    Some((change, pct))
}

//
// ================= Threshold Suggestion =================
//

/// Model-suggested alert threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSuggestion {
    /// The model's full answer
    pub analysis: String,
    /// First `$N` following "threshold" or "suggested" on the same line
    pub threshold: Option<Decimal>,
}

pub fn threshold_prompt(price: Decimal, chart: &MarketChart) -> String {
    let skip = chart.prices.len().saturating_sub(SUGGESTION_HISTORY_POINTS);
    let history: Vec<String> = chart.prices[skip..]
        .iter()
        .map(|p| format_usd(p.value))
        .collect();
    let latest = |series: &[PricePoint]| {
        series
            .last()
            .map(|p| format_usd(p.value))
            .unwrap_or_else(|| "N/A".to_string())
    };

    format!(
        r#"Analyze the following Bitcoin market data and suggest an appropriate price threshold for alerts:

Current Price: {price}
Price History (last {points} points): {history}
Market Cap: {market_cap}
Volume: {volume}

Please format your response as follows:

📊 Quick Summary
[2-3 sentences about the suggested threshold]

💡 Key Points
• Suggested threshold price
• Reasoning behind the suggestion
• Risk level (conservative/aggressive)

📈 Market Analysis
[2-3 sentences about current market conditions]

⚠️ Considerations
• Technical factors
• Market sentiment
• Risk factors

💭 Recommendation
[1-2 sentences with final recommendation]

Keep the response concise and easy to read."#,
        price = format_usd(price),
        points = history.len(),
        history = history.join(", "),
        market_cap = latest(&chart.market_caps),
        volume = latest(&chart.total_volumes),
    )
}

/// Extract the suggested price from a model answer.
///
/// Looks for a keyword ("threshold" or "suggested", any case) followed later
/// on the same line by `$` and digits; commas are dropped and any fraction
/// after the digits is ignored.
pub fn parse_suggested_threshold(text: &str) -> Option<Decimal> {
    text.lines().find_map(threshold_in_line)
}

fn threshold_in_line(line: &str) -> Option<Decimal> {
    let lower = line.to_ascii_lowercase();
    let after_keyword = SUGGESTION_KEYWORDS
        .iter()
        .filter_map(|k| lower.find(k).map(|start| (start, start + k.len())))
        .min_by_key(|(start, _)| *start)
        .map(|(_, end)| end)?;

    let rest = &line[after_keyword..];
    let amount = rest.match_indices('$').find_map(|(i, _)| {
        let run: String = rest[i + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == ',')
            .collect();
        (!run.is_empty()).then_some(run)
    })?;

    Decimal::from_str(&amount.replace(',', "")).ok()
}

/// Ask the model for an alert threshold based on the current market
pub async fn suggest_threshold(
    market: &CoinGeckoClient,
    model: &dyn CompletionModel,
) -> Result<ThresholdSuggestion> {
    let price = market.current_price().await?;
    let chart = market.historical_chart().await?;

    let analysis = model.complete(&threshold_prompt(price, &chart)).await?;
    let analysis = analysis.trim().to_string();
    let threshold = parse_suggested_threshold(&analysis);

    match threshold {
        Some(value) => info!(%value, "Model suggested a threshold"),
        None => warn!("Could not parse a suggested threshold from the model answer"),
    }

    Ok(ThresholdSuggestion {
        analysis,
        threshold,
    })
}
