use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Helius RPC / enhanced-transaction API configuration
    pub helius: HeliusConfig,

    /// Solscan historical price API configuration
    pub solscan: SolscanConfig,

    /// Analysis window settings
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeliusConfig {
    /// Helius API key
    pub api_key: String,

    /// JSON-RPC endpoint (the api-key query parameter is appended)
    pub rpc_url: String,

    /// Enhanced transaction parsing endpoint
    pub parse_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Signatures fetched per wallet when building transfer history
    pub history_signature_limit: u32,

    /// Signatures inspected when resolving a token account's owner
    pub owner_signature_limit: u32,

    /// Holder accounts kept per token, largest balances first
    pub top_holder_limit: usize,

    /// Accounts excluded from holder analysis (bonding-curve / escrow)
    pub exclude_accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolscanConfig {
    /// Solscan Pro API key, sent as the `token` header
    pub api_key: String,

    /// Solscan API base URL
    pub api_base_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Trailing observation window, in days
    pub window_days: i64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            helius: HeliusConfig {
                api_key: "".to_string(), // Must be set in config.toml or env
                rpc_url: "https://mainnet.helius-rpc.com".to_string(),
                parse_url: "https://api.helius.xyz/v0/transactions".to_string(),
                request_timeout_seconds: 30,
                history_signature_limit: 100,
                owner_signature_limit: 10,
                top_holder_limit: 10,
                exclude_accounts: Vec::new(),
            },
            solscan: SolscanConfig {
                api_key: "".to_string(), // Must be set in config.toml or env
                api_base_url: "https://pro-api.solscan.io/v2.0".to_string(),
                request_timeout_seconds: 30,
            },
            analysis: AnalysisConfig { window_days: 7 },
        }
    }
}

impl HeliusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Helius API key is required".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.history_signature_limit == 0 || self.owner_signature_limit == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Signature limits must be greater than 0".to_string(),
            ));
        }
        if self.top_holder_limit == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Top holder limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl SolscanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Solscan API key is required".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_days <= 0 {
            return Err(ConfigurationError::InvalidValue(
                "Analysis window must be at least one day".to_string(),
            ));
        }
        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from file and environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        // Add config file if it exists
        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        // Add environment variables with prefix
        config_builder = config_builder.add_source(
            Environment::with_prefix("WINRATE")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let config = config_builder.build()?;
        let system_config: SystemConfig = config.try_deserialize()?;

        system_config.validate()?;

        Ok(system_config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.helius.validate()?;
        self.solscan.validate()?;
        self.analysis.validate()?;
        Ok(())
    }
}
