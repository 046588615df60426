//! ============================================================================
//! Access Config - Session-scoped settings for store access
//! ============================================================================
//! Loaded from `SUBPASS_*` environment variables and passed explicitly into
//! store, resolver and rental constructors.
//! ============================================================================

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::Account;

pub const ENV_RPC_URL: &str = "SUBPASS_RPC_URL";
pub const ENV_CONTRACT_ADDRESS: &str = "SUBPASS_CONTRACT_ADDRESS";
pub const ENV_ACCOUNT: &str = "SUBPASS_ACCOUNT";
pub const ENV_RPC_TIMEOUT_SECS: &str = "SUBPASS_RPC_TIMEOUT_SECS";
pub const ENV_SCAN_CONCURRENCY: &str = "SUBPASS_SCAN_CONCURRENCY";
pub const ENV_CONFIRM_POLL_MS: &str = "SUBPASS_CONFIRM_POLL_MS";
pub const ENV_CONFIRM_MAX_POLLS: &str = "SUBPASS_CONFIRM_MAX_POLLS";

/// Default local development node
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SCAN_CONCURRENCY: usize = 1;
pub const DEFAULT_CONFIRM_POLL_MS: u64 = 1000;
pub const DEFAULT_CONFIRM_MAX_POLLS: u32 = 60;

/// Upper bound on parallel token reads per scan
const MAX_SCAN_CONCURRENCY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub rpc_url: String,
    pub contract_address: Account,
    /// Caller account; when absent it is obtained from the node
    pub account: Option<Account>,
    pub rpc_timeout_secs: u64,
    pub scan_concurrency: usize,
    pub confirm_poll_ms: u64,
    pub confirm_max_polls: u32,
}

impl AccessConfig {
    /// Config with defaults for everything but the contract
    pub fn new(contract_address: Account) -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract_address,
            account: None,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            confirm_poll_ms: DEFAULT_CONFIRM_POLL_MS,
            confirm_max_polls: DEFAULT_CONFIRM_MAX_POLLS,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let contract = get(ENV_CONTRACT_ADDRESS)
            .ok_or_else(|| anyhow!("{} is not set", ENV_CONTRACT_ADDRESS))?;

        let mut config = Self::new(parse_account(ENV_CONTRACT_ADDRESS, &contract)?);

        if let Some(url) = get(ENV_RPC_URL) {
            config.rpc_url = url;
        }
        if let Some(account) = get(ENV_ACCOUNT) {
            config.account = Some(parse_account(ENV_ACCOUNT, &account)?);
        }
        if let Some(v) = get(ENV_RPC_TIMEOUT_SECS) {
            config.rpc_timeout_secs = parse_num(ENV_RPC_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = get(ENV_SCAN_CONCURRENCY) {
            config.scan_concurrency = parse_num(ENV_SCAN_CONCURRENCY, &v)?;
        }
        if let Some(v) = get(ENV_CONFIRM_POLL_MS) {
            config.confirm_poll_ms = parse_num(ENV_CONFIRM_POLL_MS, &v)?;
        }
        if let Some(v) = get(ENV_CONFIRM_MAX_POLLS) {
            config.confirm_max_polls = parse_num(ENV_CONFIRM_MAX_POLLS, &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check ranges and the RPC URL
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.rpc_url)
            .with_context(|| format!("Invalid RPC URL '{}'", self.rpc_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(anyhow!(
                "RPC URL must be http(s), got scheme '{}'",
                url.scheme()
            ));
        }
        if self.rpc_timeout_secs == 0 {
            return Err(anyhow!("{} must be positive", ENV_RPC_TIMEOUT_SECS));
        }
        if self.scan_concurrency == 0 || self.scan_concurrency > MAX_SCAN_CONCURRENCY {
            return Err(anyhow!(
                "{} must be between 1 and {}, got {}",
                ENV_SCAN_CONCURRENCY,
                MAX_SCAN_CONCURRENCY,
                self.scan_concurrency
            ));
        }
        if self.confirm_max_polls == 0 {
            return Err(anyhow!("{} must be positive", ENV_CONFIRM_MAX_POLLS));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_ms)
    }
}

fn parse_account(key: &str, value: &str) -> Result<Account> {
    Account::parse_address(value).map_err(|_| anyhow!("{} is not a valid address: '{}'", key, value))
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| anyhow!("{} must be a non-negative integer, got '{}'", key, value))
}
