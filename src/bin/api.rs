use bitcoin_analyst::{
    api::start_server,
    config::AppConfig,
    http::ReqwestTransport,
    pipeline::AnalysisPipeline,
    relay::TelegramRelay,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    if config.gemini_api_key.is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
    }

    info!("🚀 Bitcoin Analyst - API Server");
    info!("📍 Port: {}", config.api_port);

    let transport = Arc::new(ReqwestTransport::new()?);
    let pipeline = Arc::new(AnalysisPipeline::from_config(&config, transport.clone()));

    let relay = match config.telegram.as_ref() {
        Some(telegram) => {
            info!("✅ Telegram relay enabled for chat {}", telegram.chat_id);
            Some(Arc::new(TelegramRelay::from_config(telegram, transport)))
        }
        None => {
            warn!("Telegram relay not configured, /api/relay will answer 503");
            None
        }
    };

    info!("📡 Starting API server...");

    start_server(pipeline, relay, config.api_port).await?;

    Ok(())
}
