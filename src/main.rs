mod allowlist;
mod config;
mod llm;
mod platform;
mod relay;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::LlmClient;
use crate::platform::telegram::{self, TelegramSink};
use crate::relay::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gptbridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Telegram GPT bridge...");

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.llm.model);
    info!("  Completion API: {}", config.llm.base_url);
    info!(
        "  Allowed users ({}): {:?}",
        config.allowed_users.len(),
        config.allowed_users.sorted()
    );

    let bot = telegram::connect(&config.telegram.bot_token)?;
    telegram::verify(&bot).await?;

    let llm = LlmClient::new(config.llm.clone());
    info!("Completion client ready (model {})", llm.model());

    let relay = Relay::new(config.allowed_users, llm, TelegramSink::new(bot.clone()));
    relay.run(telegram::updates(bot)).await;

    Ok(())
}
