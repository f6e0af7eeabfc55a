//! Core data models for the analyst

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Market Data =================
//

/// One `[timestamp_ms, value]` pair from a market chart series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp_ms: i64,
    pub value: Decimal,
}

/// Historical series for the last day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketChart {
    pub prices: Vec<PricePoint>,
    pub market_caps: Vec<PricePoint>,
    pub total_volumes: Vec<PricePoint>,
}

impl MarketChart {
    /// Latest and previous price, when the series has at least two points
    pub fn last_two_prices(&self) -> Option<(Decimal, Decimal)> {
        match self.prices.as_slice() {
            [.., previous, latest] => Some((latest.value, previous.value)),
            _ => None,
        }
    }

    /// Text block handed to the technical stage
    pub fn technical_summary(&self) -> String {
        let Some(first) = self.prices.first() else {
            return "Historical Price Data (24h):\nNo price points available.".to_string();
        };
        let last = self.prices[self.prices.len() - 1];

        let high = self.prices.iter().map(|p| p.value).max().unwrap_or(first.value);
        let low = self.prices.iter().map(|p| p.value).min().unwrap_or(first.value);

        let recent: Vec<String> = self
            .prices
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|p| format_usd(p.value))
            .collect();

        [
            "Historical Price Data (24h):".to_string(),
            format!("• Data points: {}", self.prices.len()),
            format!("• Open: {}", format_usd(first.value)),
            format!("• Latest: {}", format_usd(last.value)),
            format!("• High: {}", format_usd(high)),
            format!("• Low: {}", format_usd(low)),
            format!("• Range change: {}%", display_pct(percent_change(last.value, first.value))),
            format!("• Recent prices: {}", recent.join(", ")),
        ]
        .join("\n")
    }
}

/// Snapshot computed once per run from the spot price and the chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: Decimal,
    pub price_change_pct: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl MarketSnapshot {
    pub fn from_chart(price: Decimal, chart: &MarketChart) -> Self {
        let price_change_pct = chart
            .last_two_prices()
            .and_then(|(latest, previous)| percent_change(latest, previous));

        Self {
            price,
            price_change_pct,
            market_cap: chart.market_caps.last().map(|p| p.value),
            volume: chart.total_volumes.last().map(|p| p.value),
        }
    }

    /// Change with exactly two decimals, or `N/A`
    pub fn price_change_display(&self) -> String {
        display_pct(self.price_change_pct)
    }

    /// Text block handed to the market stage
    pub fn to_prompt_text(&self) -> String {
        [
            "Current Market Data:".to_string(),
            format!("• Price: {}", format_usd(self.price)),
            format!("• 24h Change: {}%", self.price_change_display()),
            format!("• Market Cap: {}", self.market_cap.map(format_usd).unwrap_or_else(na)),
            format!("• 24h Volume: {}", self.volume.map(format_usd).unwrap_or_else(na)),
        ]
        .join("\n")
    }
}

fn na() -> String {
    "N/A".to_string()
}

/// `(latest - previous) / previous * 100` rounded half-to-even at two places.
///
/// `None` when `previous` is zero or any step overflows.
pub fn percent_change(latest: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }

    let change = latest
        .checked_sub(previous)?
        .checked_div(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)?;
    Some(change.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
}

fn display_pct(value: Option<Decimal>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(na)
}

/// Dollar amount with thousands separators, at most three fraction digits
pub fn format_usd(value: Decimal) -> String {
    let rounded = value
        .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let text = rounded.abs().to_string();

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };

    match frac_part {
        Some(frac) => format!("{}${}.{}", sign, grouped, frac),
        None => format!("{}${}", sign, grouped),
    }
}

//
// ================= News =================
//

/// Trending-asset entry standing in for a news headline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub url: String,
}

impl fmt::Display for NewsItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Title: {}\nSource: {}\nURL: {}", self.title, self.source, self.url)
    }
}

/// Text block handed to the news stage
pub fn format_news(items: &[NewsItem]) -> String {
    if items.is_empty() {
        return "No recent trending data available.".to_string();
    }

    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}
