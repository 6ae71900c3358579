//! Configuration management for the bridge engine
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    pub relay: RelayConfig,
    pub pair: PairConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a fee quote
    #[serde(default = "default_quote_ttl_secs")]
    pub quote_ttl_secs: u64,
    #[serde(default)]
    pub bridge_fee_bps: u32,
    #[serde(default)]
    pub relayer_fee_bps: u32,
    /// How far back the on-chain history fallback scans
    #[serde(default = "default_history_lookback_blocks")]
    pub history_lookback_blocks: u64,
    /// Gas limit used when simulation of a bridge call reverts
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    #[serde(default = "default_gas_limit_buffer_percent")]
    pub gas_limit_buffer_percent: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub base_url: String,
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

/// The two chains bridged by this engine
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    /// Lock side: deposits originate here and exits land here
    pub root_chain_id: u64,
    /// Mint/burn side: withdrawals originate here
    pub child_chain_id: u64,
    /// Withdrawals need a second exit transaction once checkpointed
    #[serde(default)]
    pub checkpointed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub bridge_address: String,
    #[serde(default = "default_gas_price_strategy")]
    pub gas_price_strategy: GasPriceStrategy,
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    Eip1559,
}

/// Per-token transfer limits, keyed by the root-chain token address
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub root_address: String,
    /// Smallest-unit decimal string
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    #[serde(default)]
    pub native: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: Option<String>,
}

fn default_quote_ttl_secs() -> u64 {
    60
}

fn default_history_lookback_blocks() -> u64 {
    50_000
}

fn default_gas_limit() -> u64 {
    250_000
}

fn default_gas_limit_buffer_percent() -> u64 {
    20
}

fn default_relay_timeout_ms() -> u64 {
    10_000
}

fn default_gas_price_strategy() -> GasPriceStrategy {
    GasPriceStrategy::Eip1559
}

fn default_max_gas_price_gwei() -> u64 {
    500
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: default_quote_ttl_secs(),
            bridge_fee_bps: 0,
            relayer_fee_bps: 0,
            history_lookback_blocks: default_history_lookback_blocks(),
            default_gas_limit: default_gas_limit(),
            gas_limit_buffer_percent: default_gas_limit_buffer_percent(),
        }
    }
}

/// Parsed transfer limits for one token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenLimits {
    pub min_amount: Option<U256>,
    pub max_amount: Option<U256>,
    pub native: bool,
}

impl Settings {
    /// Load settings from the file named by `BRIDGE_ENGINE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("BRIDGE_ENGINE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.relay.base_url.is_empty() {
            anyhow::bail!("Relay base URL must be configured");
        }

        if self.pair.root_chain_id == self.pair.child_chain_id {
            anyhow::bail!("Root and child chain must differ");
        }

        for chain_id in [self.pair.root_chain_id, self.pair.child_chain_id] {
            let chain = self
                .get_chain_by_id(chain_id)
                .with_context(|| format!("Chain {} is part of the pair but not configured", chain_id))?;
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", chain.name);
            }
            Address::from_str(&chain.bridge_address).with_context(|| {
                format!("Chain {} has an invalid bridge address", chain.name)
            })?;
        }

        for token in &self.tokens {
            Address::from_str(&token.root_address)
                .with_context(|| format!("Invalid token address {}", token.root_address))?;
            token.limits()?;
        }

        Ok(())
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// Token limits keyed by lower-cased root token address
    pub fn token_limits(&self) -> Result<HashMap<String, TokenLimits>> {
        self.tokens
            .iter()
            .map(|t| {
                let root = Address::from_str(&t.root_address)
                    .with_context(|| format!("Invalid token address {}", t.root_address))?;
                Ok((format!("{:?}", root), t.limits()?))
            })
            .collect()
    }
}

impl TokenConfig {
    fn limits(&self) -> Result<TokenLimits> {
        let parse = |value: &Option<String>| -> Result<Option<U256>> {
            value
                .as_deref()
                .map(|v| {
                    U256::from_dec_str(v)
                        .with_context(|| format!("Invalid amount limit {} for {}", v, self.root_address))
                })
                .transpose()
        };

        Ok(TokenLimits {
            min_amount: parse(&self.min_amount)?,
            max_amount: parse(&self.max_amount)?,
            native: self.native,
        })
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
