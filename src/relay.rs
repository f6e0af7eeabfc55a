//! Telegram relay
//!
//! Posts a finished analysis to one chat. Relaying is a single attempt:
//! a delivery failure is reported, never retried.

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::TelegramConfig;
use crate::error::AnalystError;
use crate::formatter::escape_html;
use crate::http::{HttpRequest, Transport};
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

pub struct TelegramRelay {
    transport: Arc<dyn Transport>,
    bot_token: String,
    chat_id: String,
    base_url: String,
}

impl TelegramRelay {
    pub fn new(
        transport: Arc<dyn Transport>,
        bot_token: String,
        chat_id: String,
        base_url: &str,
    ) -> Self {
        Self {
            transport,
            bot_token,
            chat_id,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &TelegramConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            transport,
            config.bot_token.clone(),
            config.chat_id.clone(),
            &config.base_url,
        )
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token)
    }

    /// Send `message` to the configured chat with HTML parse mode.
    ///
    /// The text is escaped first, so model output cannot inject markup.
    pub async fn relay(&self, message: &str) -> Result<()> {
        let request = HttpRequest::post_json(
            self.endpoint(),
            json!({
                "chat_id": self.chat_id,
                "text": escape_html(message),
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        );

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| AnalystError::RelayFailed(e.to_string()))?;

        let body = response.json().ok();
        let accepted = body
            .as_ref()
            .and_then(|b| b.get("ok"))
            .and_then(|ok| ok.as_bool())
            .unwrap_or(false);

        if response.is_success() && accepted {
            info!(chat_id = %self.chat_id, chars = message.len(), "Message relayed");
            return Ok(());
        }

        let description = body
            .as_ref()
            .and_then(|b| b.get("description"))
            .and_then(|d| d.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| response.body.clone());

        error!(chat_id = %self.chat_id, status = response.status, %description, "Relay rejected");

        Err(AnalystError::RelayFailed(format!(
            "Telegram returned {}: {}",
            response.status, description
        )))
    }
}
