//! Configuration management for Monochain
//!
//! Settings live in `<data_path>/config.toml`. Missing keys fall back to
//! defaults, command-line overrides are applied on top, and the effective
//! configuration is written back so the file always reflects the last run.

use crate::error::{LedgerError, Result};
use crate::hdwallet::DEVNET_MNEMONIC;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Produces blocks and serves RPC
    #[default]
    Validator,
    /// Replicates blocks from a validator
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_mnemonic")]
    pub mnemonic: String,
    #[serde(default)]
    pub account_index: u32,
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    #[serde(default = "default_rpc_listen")]
    pub rpc_listen: String,
    #[serde(default)]
    pub role: NodeRole,
    #[serde(default = "default_block_interval")]
    pub block_interval_secs: u64,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            mnemonic: default_mnemonic(),
            account_index: 0,
            remote_url: default_remote_url(),
            rpc_listen: default_rpc_listen(),
            role: NodeRole::default(),
            block_interval_secs: default_block_interval(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub role: Option<NodeRole>,
    pub account_index: Option<u32>,
    pub remote_url: Option<String>,
    pub rpc_listen: Option<String>,
}

impl NodeConfig {
    pub fn config_file(&self) -> PathBuf {
        self.data_path.join(CONFIG_FILE_NAME)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_path.join("storage").join("chain.sqlite")
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_secs(self.block_interval_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn rpc_addr(&self) -> Result<SocketAddr> {
        self.rpc_listen.parse().map_err(|e| {
            LedgerError::Config(format!("rpc_listen {:?} is not a socket address: {}", self.rpc_listen, e))
        })
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(role) = overrides.role {
            self.role = role;
        }
        if let Some(index) = overrides.account_index {
            self.account_index = index;
        }
        if let Some(url) = &overrides.remote_url {
            self.remote_url = url.clone();
        }
        if let Some(listen) = &overrides.rpc_listen {
            self.rpc_listen = listen.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mnemonic.trim().is_empty() {
            return Err(LedgerError::Config("mnemonic must be set".to_string()));
        }
        if self.block_interval_secs == 0 || self.sync_interval_secs == 0 {
            return Err(LedgerError::Config(
                "block_interval_secs and sync_interval_secs must be positive".to_string(),
            ));
        }

        match self.role {
            NodeRole::Validator => {
                self.rpc_addr()?;
            }
            NodeRole::Client => {
                // Index 0 signs blocks.
                if self.account_index == 0 {
                    return Err(LedgerError::Config(
                        "client role requires account_index > 0".to_string(),
                    ));
                }
                if self.remote_url.trim().is_empty() {
                    return Err(LedgerError::Config(
                        "client role requires remote_url".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn write(&self) -> Result<()> {
        fs::create_dir_all(&self.data_path)?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| LedgerError::Config(format!("Failed to encode config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    /// Copy safe to log.
    pub fn redacted(&self) -> Self {
        Self {
            mnemonic: "<redacted>".to_string(),
            ..self.clone()
        }
    }
}

/// Reads `<data_path>/config.toml` (defaults when absent), applies
/// `overrides`, validates and writes the result back.
pub fn load_config(data_path: &Path, overrides: &ConfigOverrides) -> Result<NodeConfig> {
    let file = data_path.join(CONFIG_FILE_NAME);
    let mut config: NodeConfig = if file.exists() {
        let contents = fs::read_to_string(&file)?;
        toml::from_str(&contents)
            .map_err(|e| LedgerError::Config(format!("{}: {}", file.display(), e)))?
    } else {
        NodeConfig::default()
    };

    config.data_path = data_path.to_path_buf();
    config.apply(overrides);
    config.validate()?;
    config.write()?;
    Ok(config)
}

pub fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("monochain")
}

fn default_mnemonic() -> String {
    DEVNET_MNEMONIC.to_string()
}

fn default_remote_url() -> String {
    "http://127.0.0.1:12345".to_string()
}

fn default_rpc_listen() -> String {
    "0.0.0.0:12345".to_string()
}

fn default_block_interval() -> u64 {
    5
}

fn default_sync_interval() -> u64 {
    5
}
