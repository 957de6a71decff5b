//! Command line surface of the `monochain` binary.

use crate::config::{default_data_path, load_config, ConfigOverrides, NodeConfig, NodeRole};
use crate::crypto::{address_from_hex, address_to_hex};
use crate::economics::{format_amount, parse_amount};
use crate::error::LedgerError;
use crate::hdwallet::derive_keypair;
use crate::network::RpcClient;
use crate::node::{Node, NodeContext};
use crate::transaction::Transaction;
use clap::{Parser, Subcommand};
use num_bigint::BigUint;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "monochain", author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory holding config.toml, the ledger and the lock file
    #[arg(long, global = true)]
    pub data_path: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    pub role: Option<NodeRole>,

    /// Key index under the configured mnemonic
    #[arg(long, global = true)]
    pub account_index: Option<u32>,

    /// Validator RPC endpoint used by clients
    #[arg(long, global = true)]
    pub remote_url: Option<String>,

    #[arg(long, global = true)]
    pub rpc_listen: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Runs the node until interrupted (default)
    Run {
        /// Client role: skip the blocking sync pass at startup
        #[arg(long)]
        no_sync: bool,
    },
    /// Signs and submits a transfer to the validator
    Send {
        /// Recipient address (hex)
        to: String,
        /// Amount in MONO, e.g. 12.5
        amount: String,
    },
    /// Shows an account as seen by the validator
    Balance {
        /// Defaults to the configured account
        address: Option<String>,
    },
    /// Prints the version
    Version,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            role: self.role,
            account_index: self.account_index,
            remote_url: self.remote_url.clone(),
            rpc_listen: self.rpc_listen.clone(),
        }
    }

    fn load_config(&self) -> Result<NodeConfig, LedgerError> {
        let data_path = self.data_path.clone().unwrap_or_else(default_data_path);
        load_config(&data_path, &self.overrides())
    }
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn Error>> {
    let command = cli
        .command
        .clone()
        .unwrap_or(Commands::Run { no_sync: false });

    match command {
        Commands::Version => {
            println!("monochain {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run { no_sync } => run(cli.load_config()?, !no_sync).await,
        Commands::Send { to, amount } => send(&cli.load_config()?, &to, &amount).await,
        Commands::Balance { address } => balance(&cli.load_config()?, address.as_deref()).await,
    }
}

async fn run(config: NodeConfig, sync_on_start: bool) -> Result<(), Box<dyn Error>> {
    info!(config = ?config.redacted(), "Starting node");

    let ctx = NodeContext::open(config)?;
    let node = Node::start(ctx, sync_on_start).await?;
    if let Some(addr) = node.rpc_addr() {
        info!(%addr, "Validator ready");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    node.shutdown().await;
    Ok(())
}

async fn send(config: &NodeConfig, to: &str, amount: &str) -> Result<(), Box<dyn Error>> {
    let keypair = derive_keypair(&config.mnemonic, config.account_index)?;
    let to = address_from_hex(to)?;
    let value = parse_amount(amount)?;
    let remote = RpcClient::new(config.remote_url.clone())?;

    let account = remote.get_account_info(&keypair.address()).await?;
    let balance: BigUint = account
        .balance_raw
        .parse()
        .map_err(|e| LedgerError::Network(format!("Remote returned invalid balance: {}", e)))?;
    if balance < value {
        return Err(LedgerError::InsufficientBalance {
            balance,
            required: value,
        }
        .into());
    }

    let tx = Transaction::new_signed(&keypair, to, account.nonce, value)?;
    remote.send_transaction(&tx).await?;

    println!("Submitted {}", tx.hash_str());
    println!("  from:   {}", address_to_hex(&tx.from));
    println!("  to:     {}", address_to_hex(&tx.to));
    println!("  amount: {}", format_amount(&tx.value));
    println!("  nonce:  {}", tx.nonce);
    Ok(())
}

async fn balance(config: &NodeConfig, address: Option<&str>) -> Result<(), Box<dyn Error>> {
    let address = match address {
        Some(hex_str) => address_from_hex(hex_str)?,
        None => derive_keypair(&config.mnemonic, config.account_index)?.address(),
    };
    let remote = RpcClient::new(config.remote_url.clone())?;
    let info = remote.get_account_info(&address).await?;

    println!("Address: {}", info.address);
    println!("Balance: {}", info.balance);
    println!("Nonce:   {}", info.nonce);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["monochain"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "monochain",
            "send",
            "ab",
            "1.5",
            "--role",
            "client",
            "--account-index",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.role, Some(NodeRole::Client));
        assert_eq!(cli.account_index, Some(2));
        assert_eq!(
            cli.command,
            Some(Commands::Send {
                to: "ab".to_string(),
                amount: "1.5".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(Cli::try_parse_from(["monochain", "--role", "miner"]).is_err());
    }
}
