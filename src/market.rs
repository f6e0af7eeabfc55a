//! CoinGecko market-data collectors
//!
//! Price and historical chart failures propagate. The trending collector is
//! the one degraded path: when it exhausts its retries it yields an empty
//! list so the analysis keeps going without news.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::AnalystError;
use crate::http::{HttpRequest, HttpResponse};
use crate::models::{MarketChart, NewsItem, PricePoint};
use crate::retry::RetryableFetcher;
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Trending coins used as news items per run
pub const MAX_NEWS_ITEMS: usize = 3;

const TRENDS_SOURCE: &str = "CoinGecko Trends";

pub struct CoinGeckoClient {
    fetcher: RetryableFetcher,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(fetcher: RetryableFetcher, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Spot BTC price in USD
    pub async fn current_price(&self) -> Result<Decimal> {
        let request = HttpRequest::get(format!(
            "{}/simple/price?ids=bitcoin&vs_currencies=usd",
            self.base_url
        ));

        let price = self
            .fetcher
            .fetch("coingecko price", &request, parse_price)
            .await?;

        info!(%price, "Fetched Bitcoin price");
        Ok(price)
    }

    /// Last day of prices, market caps and volumes
    pub async fn historical_chart(&self) -> Result<MarketChart> {
        let request = HttpRequest::get(format!(
            "{}/coins/bitcoin/market_chart?vs_currency=usd&days=1",
            self.base_url
        ));

        let chart = self
            .fetcher
            .fetch("coingecko market chart", &request, parse_chart)
            .await?;

        info!(points = chart.prices.len(), "Fetched historical data");
        Ok(chart)
    }

    /// Trending coins formatted as news items.
    ///
    /// CoinGecko has no news feed, so trending assets stand in for headlines.
    /// Never fails: exhaustion degrades to an empty list.
    pub async fn trending_news(&self) -> Vec<NewsItem> {
        let request = HttpRequest::get(format!("{}/search/trending", self.base_url));

        match self
            .fetcher
            .fetch("coingecko trending", &request, parse_trending)
            .await
        {
            Ok(items) => {
                info!(count = items.len(), "Fetched trending items");
                items
            }
            Err(e) => {
                warn!(error = %e, "Trending data unavailable, continuing without news");
                Vec::new()
            }
        }
    }
}

fn parse_price(response: &HttpResponse) -> Result<Decimal> {
    let json = response.json()?;

    json.get("bitcoin")
        .and_then(|b| b.get("usd"))
        .and_then(decimal_from_json)
        .filter(|price| price.is_sign_positive() && !price.is_zero())
        .ok_or_else(|| {
            AnalystError::MalformedResponse("missing bitcoin.usd in price response".to_string())
        })
}

fn parse_chart(response: &HttpResponse) -> Result<MarketChart> {
    let json = response.json()?;

    let prices = json
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AnalystError::MalformedResponse("missing prices array in market chart".to_string())
        })?;

    Ok(MarketChart {
        prices: parse_series("prices", prices)?,
        market_caps: optional_series(&json, "market_caps")?,
        total_volumes: optional_series(&json, "total_volumes")?,
    })
}

fn optional_series(json: &Value, key: &str) -> Result<Vec<PricePoint>> {
    match json.get(key).and_then(Value::as_array) {
        Some(series) => parse_series(key, series),
        None => Ok(Vec::new()),
    }
}

fn parse_series(key: &str, series: &[Value]) -> Result<Vec<PricePoint>> {
    series
        .iter()
        .map(|entry| {
            let pair = entry.as_array().filter(|p| p.len() >= 2);
            let point = pair.and_then(|p| {
                let timestamp_ms = p[0].as_i64().or_else(|| p[0].as_f64().map(|t| t as i64))?;
                let value = decimal_from_json(&p[1])?;
                Some(PricePoint {
                    timestamp_ms,
                    value,
                })
            });

            point.ok_or_else(|| {
                AnalystError::MalformedResponse(format!("bad [timestamp, value] pair in {}", key))
            })
        })
        .collect()
}

fn parse_trending(response: &HttpResponse) -> Result<Vec<NewsItem>> {
    let json = response.json()?;

    let coins = json
        .get("coins")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AnalystError::MalformedResponse("missing coins array in trending response".to_string())
        })?;

    coins
        .iter()
        .take(MAX_NEWS_ITEMS)
        .map(|coin| -> Result<NewsItem> {
            let item = coin.get("item").ok_or_else(|| {
                AnalystError::MalformedResponse("trending coin without item".to_string())
            })?;

            let field = |name: &str| {
                item.get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AnalystError::MalformedResponse(format!("trending item missing {}", name))
                    })
            };

            let id = field("id")?;
            let name = field("name")?;
            let symbol = field("symbol")?;
            let price_btc = match item.get("price_btc") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "N/A".to_string(),
                Some(other) => other.to_string(),
            };

            Ok(NewsItem {
                title: format!(
                    "{} ({}) is trending with price_btc: {}",
                    name,
                    symbol.to_uppercase(),
                    price_btc
                ),
                source: TRENDS_SOURCE.to_string(),
                url: format!("https://www.coingecko.com/en/coins/{}", id),
            })
        })
        .collect()
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    if let Some(i) = value.as_i64() {
        return Some(Decimal::from(i));
    }
    value.as_f64().and_then(Decimal::from_f64)
}
