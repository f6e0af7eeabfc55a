use bitcoin_analyst::{
    config::AppConfig,
    http::ReqwestTransport,
    models::format_usd,
    monitor::PriceMonitor,
    pipeline::AnalysisPipeline,
    relay::TelegramRelay,
};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "analyst", about = "Bitcoin market analysis over Gemini and CoinGecko")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the four-stage analysis for a question
    Analyze {
        query: String,
        /// Also send the result to the configured Telegram chat
        #[arg(long)]
        relay: bool,
        /// Print plain text instead of HTML
        #[arg(long)]
        plain: bool,
    },
    /// Print the current BTC price
    Price,
    /// Poll the price and relay alerts
    Monitor {
        #[arg(long)]
        threshold: Option<Decimal>,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Ask the model for an alert threshold
    SuggestThreshold {
        /// Start monitoring with the suggested threshold
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let transport = Arc::new(ReqwestTransport::new()?);
    let pipeline = AnalysisPipeline::from_config(&config, transport.clone());
    let relay = config
        .telegram
        .as_ref()
        .map(|telegram| TelegramRelay::from_config(telegram, transport.clone()));

    match cli.command {
        Command::Analyze { query, relay: send, plain } => {
            let mut report = pipeline.run_analysis(&query).await?;

            if plain {
                println!("{}", report.formatted.plain);
            } else {
                println!("{}", report.formatted.html);
            }

            if send {
                match relay.as_ref() {
                    Some(relay) => report.relay(relay).await?,
                    None => warn!("--relay given but Telegram is not configured"),
                }
            }
        }

        Command::Price => {
            let price = pipeline.current_price().await?;
            println!("Current Bitcoin Price: {}", format_usd(price));
        }

        Command::Monitor {
            threshold,
            interval_secs,
        } => {
            let monitor = PriceMonitor::new(
                threshold.unwrap_or(config.price_threshold),
                config.significant_change,
            );
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(config.price_check_interval);

            run_monitor(&pipeline, relay.as_ref(), monitor, interval).await;
        }

        Command::SuggestThreshold {
            apply,
            interval_secs,
        } => {
            let suggestion = pipeline.suggest_threshold().await?;
            println!("AI Analysis:\n{}\n", suggestion.analysis);

            match suggestion.threshold {
                Some(threshold) if apply => {
                    println!("Monitoring with suggested threshold {}", format_usd(threshold));
                    let monitor = PriceMonitor::new(threshold, config.significant_change);
                    let interval = interval_secs
                        .map(Duration::from_secs)
                        .unwrap_or(config.price_check_interval);

                    run_monitor(&pipeline, relay.as_ref(), monitor, interval).await;
                }
                Some(threshold) => println!(
                    "Suggested threshold: {}. Run `analyst monitor --threshold {}` to use it.",
                    format_usd(threshold),
                    threshold
                ),
                None => println!(
                    "Could not parse a suggested threshold. Set one manually with `analyst monitor --threshold <price>`."
                ),
            }
        }
    }

    Ok(())
}

/// Poll the price forever, relaying each alert. Failures are logged, never fatal.
async fn run_monitor(
    pipeline: &AnalysisPipeline,
    relay: Option<&TelegramRelay>,
    mut monitor: PriceMonitor,
    interval: Duration,
) {
    info!(threshold = %monitor.threshold(), interval_secs = interval.as_secs(), "Price monitor started");

    if relay.is_none() {
        warn!("Telegram is not configured, alerts will only be logged");
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let price = match pipeline.current_price().await {
            Ok(price) => price,
            Err(e) => {
                error!(error = %e, "Price check failed");
                continue;
            }
        };

        for alert in monitor.observe(price) {
            let message = alert.message();
            info!(%message, "Price alert");

            if let Some(relay) = relay {
                if let Err(e) = relay.relay(&message).await {
                    error!(error = %e, "Failed to relay price alert");
                }
            }
        }
    }
}
