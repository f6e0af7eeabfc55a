//! Environment configuration
//!
//! Everything comes from environment variables, optionally seeded from a
//! `.env` file. Numeric values that fail to parse are configuration errors.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::AnalystError;
use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
use crate::{gemini, market, relay, Result};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PRICE_THRESHOLD: Decimal = dec!(50000);
const DEFAULT_SIGNIFICANT_CHANGE: Decimal = dec!(0.05);
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub coingecko_base_url: String,
    /// Present only when both token and chat id are set
    pub telegram: Option<TelegramConfig>,
    pub retry: RetryPolicy,
    pub api_port: u16,
    pub price_threshold: Decimal,
    pub significant_change: Decimal,
    pub price_check_interval: Duration,
}

impl AppConfig {
    /// Load from the process environment after reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gemini_api_key = get("GEMINI_API_KEY").unwrap_or_default();
        if gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set, analysis requests will fail");
        }

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                bot_token,
                chat_id,
                base_url: get("TELEGRAM_BASE_URL")
                    .unwrap_or_else(|| relay::DEFAULT_BASE_URL.to_string()),
            }),
            (None, None) => None,
            _ => {
                warn!("Only one of TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID is set, relay disabled");
                None
            }
        };

        let max_attempts: u32 = parse_or(&get, "FETCH_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(AnalystError::ConfigError(
                "FETCH_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        let backoff_ms: u64 = parse_or(&get, "FETCH_BACKOFF_BASE_MS", DEFAULT_BASE_DELAY_MS)?;

        let api_port = match get("PORT") {
            Some(_) => parse_or(&get, "PORT", DEFAULT_PORT)?,
            None => parse_or(&get, "API_PORT", DEFAULT_PORT)?,
        };

        Ok(Self {
            gemini_api_key,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
            coingecko_base_url: get("COINGECKO_BASE_URL")
                .unwrap_or_else(|| market::DEFAULT_BASE_URL.to_string()),
            telegram,
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(backoff_ms)),
            api_port,
            price_threshold: parse_or(&get, "PRICE_THRESHOLD", DEFAULT_PRICE_THRESHOLD)?,
            significant_change: parse_or(&get, "SIGNIFICANT_CHANGE", DEFAULT_SIGNIFICANT_CHANGE)?,
            price_check_interval: Duration::from_secs(parse_or(
                &get,
                "PRICE_CHECK_INTERVAL_SECS",
                DEFAULT_CHECK_INTERVAL_SECS,
            )?),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AnalystError::ConfigError(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
