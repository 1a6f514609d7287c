use crate::error::IngestError;
use crate::event_decoder::KeyScheme;
use crate::types::conversions::string_to_address;
use crate::types::BlockRange;
use config::{Config, ConfigError, File, FileFormat};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    /// Used for historical `eth_getLogs` and `eth_blockNumber`
    pub http_url: String,
    /// Used for the live `eth_subscribe("logs")` feed
    pub ws_url: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractSettings {
    pub address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Backfill {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub from_block: u64,
    /// Unset means "up to the chain head at startup"
    #[serde(default)]
    pub to_block: Option<u64>,
    /// Max blocks per `eth_getLogs` call; providers cap the range
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_true() -> bool {
    true
}
fn default_chunk_size() -> u64 {
    2000
}

impl Default for Backfill {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            from_block: 0,
            to_block: None,
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_seconds() -> u64 {
    5
}
fn default_connect_attempts() -> u32 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Storage {
    #[serde(default)]
    pub key_scheme: KeyScheme,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Live {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for Live {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: Rpc,
    pub contract: ContractSettings,
    #[serde(default)]
    pub backfill: Backfill,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub live: Live,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Load `Config.toml` from the working directory, then apply env overrides
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    /// Load an explicit TOML file, then apply env overrides
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    /// Environment wins over the file for connection details and the target contract
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(url) = non_empty("LOT_INDEXER_RPC_HTTP_URL") {
            self.rpc.http_url = url;
        }
        if let Some(url) = non_empty("LOT_INDEXER_RPC_WS_URL") {
            self.rpc.ws_url = url;
        }
        if let Some(address) = non_empty("LOT_INDEXER_CONTRACT_ADDRESS") {
            self.contract.address = address;
        }
        if let Some(raw) = non_empty("LOT_INDEXER_BACKFILL_ENABLED") {
            match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.backfill.enabled = true,
                "0" | "false" | "no" => self.backfill.enabled = false,
                other => eprintln!(
                    "Ignoring LOT_INDEXER_BACKFILL_ENABLED={}: expected true/false",
                    other
                ),
            }
        }
    }

    /// Reject settings that would only fail later, mid-ingestion
    pub fn validate(&self) -> Result<(), IngestError> {
        self.contract_address()?;

        if self.rpc.http_url.trim().is_empty() {
            return Err(IngestError::Config("rpc.http_url is empty".to_string()));
        }
        if self.rpc.ws_url.trim().is_empty() {
            return Err(IngestError::Config("rpc.ws_url is empty".to_string()));
        }
        if self.backfill.chunk_size == 0 {
            return Err(IngestError::Config(
                "backfill.chunk_size must be greater than 0".to_string(),
            ));
        }
        if let Some(to) = self.backfill.to_block {
            if BlockRange::new(self.backfill.from_block, to).is_none() {
                return Err(IngestError::Config(format!(
                    "backfill.from_block {} is after backfill.to_block {}",
                    self.backfill.from_block, to
                )));
            }
        }
        if self.live.channel_capacity == 0 {
            return Err(IngestError::Config(
                "live.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.database.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(IngestError::Config(
                "database.url or DATABASE_URL must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address, IngestError> {
        string_to_address(&self.contract.address).map_err(|e| {
            IngestError::Config(format!("contract.address {}: {}", self.contract.address, e))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.request_timeout_seconds)
    }
}
