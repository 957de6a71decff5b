//! Process bootstrap: the data-directory lock, the node context and the
//! background tasks of each role.

use crate::api::{run_rpc_server, RpcService};
use crate::blockchain::Genesis;
use crate::config::{NodeConfig, NodeRole};
use crate::crypto::{Address, KeyPair};
use crate::error::{LedgerError, Result};
use crate::hdwallet::derive_keypair;
use crate::mempool::Mempool;
use crate::network::RpcClient;
use crate::persistence::Storage;
use crate::producer::BlockProducer;
use crate::sync::SyncClient;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const LOCK_FILE_NAME: &str = ".lock";

/// Exclusive advisory lock on a data directory, released on drop.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    pub fn acquire(data_path: &Path) -> Result<Self> {
        fs::create_dir_all(data_path)?;
        let path = data_path.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock() {
            Ok(()) => {
                info!(path = %path.display(), "Locked data directory");
                Ok(DataDirLock { file, path })
            }
            Err(TryLockError::WouldBlock) => {
                Err(LedgerError::LockContention(data_path.display().to_string()))
            }
            Err(TryLockError::Error(e)) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        match self.file.unlock() {
            Ok(()) => info!(path = %self.path.display(), "Released data directory lock"),
            Err(e) => error!(path = %self.path.display(), error = %e, "Failed to release data directory lock"),
        }
    }
}

/// Everything a running node owns, built once at startup.
pub struct NodeContext {
    pub config: NodeConfig,
    pub keypair: KeyPair,
    pub storage: Arc<Storage>,
    pub mempool: Arc<Mempool>,
    _lock: DataDirLock,
}

impl NodeContext {
    /// Locks the data directory first; any later failure drops the lock again.
    pub fn open(config: NodeConfig) -> Result<Self> {
        let lock = DataDirLock::acquire(&config.data_path)?;
        config.validate()?;

        let keypair = derive_keypair(&config.mnemonic, config.account_index)?;
        let storage = Arc::new(Storage::open(config.storage_path())?);
        storage.initialize_genesis(&Genesis::devnet()?)?;

        info!(
            role = ?config.role,
            address = %hex::encode(keypair.address()),
            height = storage.get_height()?,
            "Node context ready"
        );

        Ok(NodeContext {
            config,
            keypair,
            storage,
            mempool: Arc::new(Mempool::new()),
            _lock: lock,
        })
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }
}

pub struct Node {
    ctx: NodeContext,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    rpc_addr: Option<SocketAddr>,
}

impl Node {
    /// Spawns the role's background tasks. A client with `sync_on_start`
    /// completes one sync pass before returning and fails if it errors.
    pub async fn start(ctx: NodeContext, sync_on_start: bool) -> Result<Self> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut rpc_addr = None;

        match ctx.config.role {
            NodeRole::Validator => {
                let listener = TcpListener::bind(ctx.config.rpc_addr()?).await?;
                rpc_addr = Some(listener.local_addr()?);

                let service = Arc::new(RpcService::new(
                    Arc::clone(&ctx.storage),
                    Arc::clone(&ctx.mempool),
                ));
                let rpc_shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = run_rpc_server(service, listener, rpc_shutdown).await {
                        error!(error = %e, "RPC server failed");
                    }
                }));

                let producer = Arc::new(BlockProducer::new(
                    Arc::clone(&ctx.storage),
                    Arc::clone(&ctx.mempool),
                    ctx.keypair.clone(),
                    ctx.config.block_interval(),
                ));
                tasks.push(tokio::spawn(producer.run(shutdown_rx)));
            }
            NodeRole::Client => {
                let remote = RpcClient::new(ctx.config.remote_url.clone())?;
                let sync = Arc::new(SyncClient::new(
                    Arc::clone(&ctx.storage),
                    remote,
                    ctx.config.sync_interval(),
                ));

                if sync_on_start {
                    let committed = sync.sync_pass().await?;
                    info!(committed, remote = %ctx.config.remote_url, "Initial sync complete");
                }
                tasks.push(tokio::spawn(sync.run(shutdown_rx)));
            }
        }

        Ok(Node {
            ctx,
            shutdown,
            tasks,
            rpc_addr,
        })
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Bound RPC address (validator only).
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// Signals every task, waits for in-flight rounds to finish, then
    /// releases the data directory.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Node stopped");
    }
}
