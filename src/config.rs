//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The database URL may be overridden by the variable named in
//! `storage.database_url_env` (default `DATABASE_URL`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::RetryPolicy;
use crate::rules::RuleTables;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub name: String,
    pub poll_interval_secs: u64,
    pub currency: String,
}

/// Where the rule tables come from. Both paths unset means the built-in
/// single-zero layout.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RulesConfig {
    pub coverage_path: Option<String>,
    pub payouts_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,
    /// Directory for the settlement journal. Disabled when unset.
    #[serde(default)]
    pub journal_dir: Option<String>,
}

fn default_database_url_env() -> String {
    "DATABASE_URL".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
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

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Database URL, preferring the environment override when set.
    pub fn database_url(&self) -> String {
        Self::resolve_env(&self.storage.database_url_env)
            .unwrap_or_else(|_| self.storage.database_url.clone())
    }

    /// Build the rule tables this configuration points at.
    pub fn rule_tables(&self) -> Result<RuleTables> {
        match (&self.rules.coverage_path, &self.rules.payouts_path) {
            (Some(coverage), Some(payouts)) => RuleTables::load(coverage, payouts),
            (None, None) => Ok(RuleTables::single_zero()),
            _ => anyhow::bail!(
                "rules.coverage_path and rules.payouts_path must be set together"
            ),
        }
    }
}
