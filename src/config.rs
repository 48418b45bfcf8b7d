use anyhow::{Context, Result};

use crate::allowlist::AllowList;

pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const OPENAI_TOKEN_VAR: &str = "OPENAI_TOKEN";
pub const ALLOWED_USERS_VAR: &str = "WHITE_LISTED_USERS";
pub const MODEL_VAR: &str = "OPENAI_MODEL";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub allowed_users: AllowList,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Fetch a variable that must be present and non-blank.
fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} is not set", name))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = required(&lookup, TELEGRAM_TOKEN_VAR)?;
        let api_key = required(&lookup, OPENAI_TOKEN_VAR)?;

        let raw_users = lookup(ALLOWED_USERS_VAR).unwrap_or_default();
        let allowed_users = AllowList::parse(&raw_users)
            .with_context(|| format!("{} must list at least one user", ALLOWED_USERS_VAR))?;

        let model = optional(&lookup, MODEL_VAR).unwrap_or_else(default_model);
        let base_url = optional(&lookup, BASE_URL_VAR)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(default_base_url);

        Ok(Config {
            telegram: TelegramConfig { bot_token },
            llm: LlmConfig {
                model,
                base_url,
                api_key,
            },
            allowed_users,
        })
    }
}
