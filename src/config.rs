//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a partial (or missing) file still yields a
//! usable configuration. Secrets are referenced by env-var name in the
//! config and resolved at runtime into `SecretString`s.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::GameSettings;
use crate::price::binance::DEFAULT_BASE_URL;
use crate::price::{DEFAULT_PAIR, DEFAULT_SYMBOL};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub price: PriceConfig,
    pub storage: StorageConfig,
    pub telegram: TelegramConfig,
    pub payments: PaymentsConfig,
    pub auto_resolve: AutoResolveConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    /// Balance gifted to new accounts.
    pub starting_balance: Decimal,
    /// Display currency for balances.
    pub currency: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::ONE_HUNDRED,
            currency: "EUR".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriceConfig {
    pub base_url: String,
    pub symbol: String,
    pub pair: String,
    /// Upper bound for one price sample, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            pair: DEFAULT_PAIR.to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Env var holding a `sqlite://` URL. Unset → in-memory store.
    pub database_url_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url_env: "DATABASE_URL".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token_env: String,
    pub webapp_url_env: String,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token_env: "BOT_TOKEN".to_string(),
            webapp_url_env: "WEBAPP_URL".to_string(),
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaymentsConfig {
    pub enabled: bool,
    pub secret_key_env: String,
    pub webhook_secret_env: String,
    pub currency: String,
    /// Deposit amounts offered in the chat menu.
    pub deposit_options: Vec<u32>,
    pub signature_tolerance_secs: i64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_key_env: "STRIPE_SECRET_KEY".to_string(),
            webhook_secret_env: "STRIPE_WEBHOOK_SECRET".to_string(),
            currency: "eur".to_string(),
            deposit_options: vec![10, 25, 50, 100],
            signature_tolerance_secs: crate::payments::stripe::DEFAULT_TOLERANCE_SECS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutoResolveConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for AutoResolveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 2,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.game.starting_balance < Decimal::ZERO {
            anyhow::bail!("game.starting_balance must not be negative");
        }
        if self.price.timeout_ms == 0 {
            anyhow::bail!("price.timeout_ms must be positive");
        }
        if self.payments.deposit_options.iter().any(|&a| a == 0) {
            anyhow::bail!("payments.deposit_options must be positive");
        }
        if self.auto_resolve.enabled && self.auto_resolve.interval_secs == 0 {
            anyhow::bail!("auto_resolve.interval_secs must be positive");
        }
        Ok(())
    }

    /// Listen port; the `PORT` environment variable wins over the file.
    pub fn listen_port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.server.port)
    }

    /// Engine settings derived from the `[game]` and `[price]` sections.
    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            starting_balance: self.game.starting_balance,
            symbol: self.price.symbol.clone(),
            pair: self.price.pair.clone(),
            price_timeout: Duration::from_millis(self.price.timeout_ms),
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Like `resolve_env`, but `None` when unset or empty.
    pub fn optional_env(env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Resolve a secret-bearing environment variable.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
