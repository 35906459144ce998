//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (Kalshi login, Telegram token, SMTP password) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::platforms::{kalshi, polymarket, predictit};
use crate::strategy::ScanParams;
use crate::types::{is_fee_rate, ArbError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub matching: MatchingConfig,
    pub arbitrage: ArbitrageConfig,
    pub platforms: PlatformsConfig,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    /// Source whose markets are "A" in every pair.
    pub source_a: String,
    /// Source whose markets are "B" in every pair.
    pub source_b: String,
    /// Maximum markets fetched per source per scan.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

fn default_fetch_limit() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Inclusive 0–100 similarity threshold.
    pub threshold: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArbitrageConfig {
    pub total_budget_usd: Decimal,
    pub min_profit_usd: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformsConfig {
    pub polymarket: PolymarketConfig,
    pub kalshi: KalshiConfig,
    pub predictit: PredictItConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolymarketConfig {
    #[serde(default = "default_polymarket_url")]
    pub api_url: String,
    /// Fee rate on net winnings.
    pub fee: Decimal,
}

fn default_polymarket_url() -> String {
    polymarket::DEFAULT_API_URL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct KalshiConfig {
    #[serde(default = "default_kalshi_url")]
    pub api_url: String,
    pub fee: Decimal,
    #[serde(default)]
    pub email_env: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
}

fn default_kalshi_url() -> String {
    kalshi::DEFAULT_API_URL.to_string()
}

impl KalshiConfig {
    /// Resolve login credentials. Missing variables mean "no login".
    pub fn credentials(&self) -> Result<Option<kalshi::KalshiCredentials>> {
        let (Some(email_env), Some(password_env)) = (&self.email_env, &self.password_env) else {
            return Ok(None);
        };
        match (std::env::var(email_env), std::env::var(password_env)) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                Ok(Some(kalshi::KalshiCredentials {
                    email,
                    password: Secret::new(password),
                }))
            }
            _ => {
                warn!(email_env = %email_env, password_env = %password_env, "Kalshi credentials not set");
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictItConfig {
    #[serde(default = "default_predictit_url")]
    pub api_url: String,
    pub fee: Decimal,
}

fn default_predictit_url() -> String {
    predictit::DEFAULT_API_URL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default = "default_true")]
    pub log_enabled: bool,
    #[serde(default)]
    pub telegram_enabled: bool,
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub email_smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub email_smtp_port: u16,
    #[serde(default)]
    pub email_from: Option<String>,
    #[serde(default)]
    pub email_to: Option<String>,
    /// Env var holding the SMTP password; the login user is `email_from`.
    #[serde(default)]
    pub email_password_env: Option<String>,
    /// Send one digest mail per scan instead of one mail per opportunity.
    #[serde(default = "default_true")]
    pub email_digest: bool,
}

fn default_true() -> bool {
    true
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// JSON-lines file every emitted opportunity is appended to.
    pub opportunity_log: PathBuf,
    /// JSON file holding already-alerted fingerprints.
    pub dedup_path: PathBuf,
    #[serde(default = "default_dedup_window")]
    pub dedup_window_hours: i64,
}

fn default_dedup_window() -> i64 {
    24
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.matching.threshold > 100 {
            bail!(ArbError::Config(format!("matching.threshold {} exceeds 100", self.matching.threshold)));
        }
        if self.arbitrage.total_budget_usd <= Decimal::ZERO {
            bail!(ArbError::Config("arbitrage.total_budget_usd must be positive".into()));
        }
        if self.arbitrage.min_profit_usd < Decimal::ZERO {
            bail!(ArbError::Config("arbitrage.min_profit_usd must not be negative".into()));
        }
        if self.scanner.source_a == self.scanner.source_b {
            bail!(ArbError::Config("scanner.source_a and scanner.source_b must differ".into()));
        }
        if self.scanner.scan_interval_secs == 0 {
            bail!(ArbError::Config("scanner.scan_interval_secs must be positive".into()));
        }
        for source in [&self.scanner.source_a, &self.scanner.source_b] {
            let fee = self.fee_for(source)?;
            if !is_fee_rate(fee) {
                bail!(ArbError::Config(format!("platforms.{source}.fee {fee} outside [0, 1)")));
            }
        }
        if self.alerts.telegram_enabled
            && (self.alerts.telegram_bot_token_env.is_none()
                || self.alerts.telegram_chat_id_env.is_none())
        {
            bail!(ArbError::Config(
                "alerts.telegram_enabled requires telegram_bot_token_env and telegram_chat_id_env".into()
            ));
        }
        if self.alerts.email_enabled
            && (self.alerts.email_from.is_none()
                || self.alerts.email_to.is_none()
                || self.alerts.email_password_env.is_none())
        {
            bail!(ArbError::Config(
                "alerts.email_enabled requires email_from, email_to and email_password_env".into()
            ));
        }
        Ok(())
    }

    /// Fee rate configured for a source.
    pub fn fee_for(&self, source: &str) -> Result<Decimal> {
        match source {
            polymarket::PLATFORM_NAME => Ok(self.platforms.polymarket.fee),
            kalshi::PLATFORM_NAME => Ok(self.platforms.kalshi.fee),
            predictit::PLATFORM_NAME => Ok(self.platforms.predictit.fee),
            other => bail!(ArbError::Config(format!("Unknown market source: {other}"))),
        }
    }

    /// Immutable parameters for one scan.
    pub fn scan_params(&self) -> Result<ScanParams> {
        Ok(ScanParams {
            match_threshold: self.matching.threshold,
            fee_a: self.fee_for(&self.scanner.source_a)?,
            fee_b: self.fee_for(&self.scanner.source_b)?,
            min_profit_usd: self.arbitrage.min_profit_usd,
            total_budget_usd: self.arbitrage.total_budget_usd,
        })
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an environment variable holding a secret.
    pub fn resolve_secret(env_name: &str) -> Result<Secret<String>> {
        Self::resolve_env(env_name).map(Secret::new)
    }
}
