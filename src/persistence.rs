//! Database persistence layer for Monochain
//!
//! A single `kv` table in SQLite holds accounts, transactions, blocks, the
//! height index and the height pointer (see [`keys`]). Block commits and the
//! genesis initialisation each run in one SQLite transaction.

pub mod keys;

use crate::blockchain::{
    Account, AccountOverlay, AccountReader, Block, BlockInfo, BlockInfoList, Genesis, Sha256Hash,
    ZERO_HASH,
};
use crate::crypto::Address;
use crate::error::{LedgerError, Result};
use crate::transaction::Transaction;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::Storage(format!("Failed to open database: {}", e)))?;
        info!(path = %path.display(), "Opened ledger database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LedgerError::Storage(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        debug!(journal_mode = %mode, "Configured SQLite");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| LedgerError::Storage(format!("Failed to create kv table: {}", e)))?;

        Ok(Storage {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` against one consistent view of the store.
    pub fn view<T>(&self, f: impl FnOnce(&StoreView<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&StoreView { conn: &conn })
    }

    pub fn get_account(&self, address: &Address) -> Result<Account> {
        self.view(|view| view.get_account(address))
    }

    pub fn get_transaction(&self, hash: &Sha256Hash) -> Result<Option<Transaction>> {
        self.view(|view| view.get_transaction(hash))
    }

    pub fn get_block_by_hash(&self, hash: &Sha256Hash) -> Result<Option<Block>> {
        self.view(|view| view.get_block_by_hash(hash))
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        self.view(|view| view.get_block_by_height(height))
    }

    /// Current height, 0 for an empty store.
    pub fn get_height(&self) -> Result<u64> {
        self.view(|view| Ok(view.get_height()?.unwrap_or(0)))
    }

    pub fn is_initialized(&self) -> Result<bool> {
        self.view(|view| Ok(view.get_height()?.is_some()))
    }

    /// The block at the current height.
    pub fn get_tip(&self) -> Result<Block> {
        self.view(|view| view.get_tip())
    }

    pub fn get_block_info_by_hash(&self, hash: &Sha256Hash) -> Result<Option<BlockInfo>> {
        self.view(|view| match view.get_block_by_hash(hash)? {
            Some(block) => Ok(Some(view.block_info(&block)?)),
            None => Ok(None),
        })
    }

    pub fn get_block_info_by_height(&self, height: u64) -> Result<Option<BlockInfo>> {
        self.view(|view| match view.get_block_by_height(height)? {
            Some(block) => Ok(Some(view.block_info(&block)?)),
            None => Ok(None),
        })
    }

    /// Blocks `left..=right` with their transactions, stopping at the first
    /// missing height.
    pub fn get_blocks_interval(&self, left: u64, right: u64) -> Result<BlockInfoList> {
        self.view(|view| {
            let mut blocks = Vec::new();
            for height in left..=right {
                match view.get_block_by_height(height)? {
                    Some(block) => blocks.push(view.block_info(&block)?),
                    None => break,
                }
            }
            Ok(BlockInfoList::new(blocks))
        })
    }

    /// Atomically appends `block` with its transactions and applies their
    /// balance and nonce effects.
    ///
    /// The block must extend the current tip and `transactions` must match
    /// `block.transactions` in order. Any failure leaves the store unchanged.
    pub fn commit_block(&self, block: &Block, transactions: &[Transaction]) -> Result<()> {
        let mut conn = self.conn.lock();
        let db_tx = conn.transaction()?;

        let view = StoreView { conn: &db_tx };
        view.check_extends_tip(block)?;
        check_transaction_list(block, transactions)?;

        let mut overlay = AccountOverlay::new();
        for tx in transactions {
            let sender = overlay.account(&view, &tx.from)?;
            if sender.balance < tx.value {
                return Err(LedgerError::InsufficientBalance {
                    balance: sender.balance.clone(),
                    required: tx.value.clone(),
                });
            }
            sender.balance -= &tx.value;
            sender.nonce = tx.nonce + 1;

            let recipient = overlay.account(&view, &tx.to)?;
            recipient.balance += &tx.value;
        }

        for tx in transactions {
            let mut stored = tx.clone();
            stored.block_height = block.height;
            put(&db_tx, &keys::transaction_key(&stored.hash), &keys::encode(&stored)?)?;
        }
        for account in overlay.into_accounts() {
            put(&db_tx, &keys::account_key(&account.address), &keys::encode(&account)?)?;
        }
        write_block(&db_tx, block)?;

        db_tx.commit()?;
        debug!(height = block.height, hash = %block.hash_str(), txs = transactions.len(), "Committed block");
        Ok(())
    }

    /// Writes the genesis block, its mint transactions and the seeded accounts
    /// unless the store already has a height pointer. Returns whether anything
    /// was written.
    pub fn initialize_genesis(&self, genesis: &Genesis) -> Result<bool> {
        let mut conn = self.conn.lock();
        let db_tx = conn.transaction()?;

        if (StoreView { conn: &db_tx }).get_height()?.is_some() {
            return Ok(false);
        }
        check_transaction_list(&genesis.block, &genesis.transactions)?;

        for tx in &genesis.transactions {
            put(&db_tx, &keys::transaction_key(&tx.hash), &keys::encode(tx)?)?;
        }
        for account in &genesis.accounts {
            put(&db_tx, &keys::account_key(&account.address), &keys::encode(account)?)?;
        }
        write_block(&db_tx, &genesis.block)?;

        db_tx.commit()?;
        info!(hash = %genesis.block.hash_str(), accounts = genesis.accounts.len(), "Initialized genesis state");
        Ok(true)
    }
}

impl AccountReader for Storage {
    fn get_account(&self, address: &Address) -> Result<Account> {
        Storage::get_account(self, address)
    }
}

/// Read access bound to one lock acquisition (or one open SQLite transaction).
pub struct StoreView<'a> {
    conn: &'a Connection,
}

impl StoreView<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn get_decoded<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(keys::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_account(&self, address: &Address) -> Result<Account> {
        Ok(self
            .get_decoded(&keys::account_key(address))?
            .unwrap_or_else(|| Account::empty(*address)))
    }

    pub fn get_transaction(&self, hash: &Sha256Hash) -> Result<Option<Transaction>> {
        self.get_decoded(&keys::transaction_key(hash))
    }

    pub fn get_block_by_hash(&self, hash: &Sha256Hash) -> Result<Option<Block>> {
        self.get_decoded(&keys::block_key(hash))
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        let hash: Option<Sha256Hash> = self.get_decoded(&keys::height_index_key(height))?;
        match hash {
            Some(hash) => {
                let block = self.get_block_by_hash(&hash)?.ok_or_else(|| {
                    LedgerError::Storage(format!(
                        "Height index points at missing block {}",
                        hex::encode(hash)
                    ))
                })?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// `None` until genesis has been written.
    pub fn get_height(&self) -> Result<Option<u64>> {
        self.get_decoded(&keys::height_key())
    }

    pub fn get_tip(&self) -> Result<Block> {
        let height = self
            .get_height()?
            .ok_or_else(|| LedgerError::NotFound("chain tip (store is empty)".to_string()))?;
        self.get_block_by_height(height)?
            .ok_or_else(|| LedgerError::Storage(format!("Missing block at height {}", height)))
    }

    /// RPC view of `block` including its transactions.
    pub fn block_info(&self, block: &Block) -> Result<BlockInfo> {
        let transactions = block
            .transactions
            .iter()
            .map(|hash| {
                self.get_transaction(hash)?.ok_or_else(|| {
                    LedgerError::Storage(format!(
                        "Block {} references missing transaction {}",
                        block.height,
                        hex::encode(hash)
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(block.to_info(&transactions))
    }

    fn check_extends_tip(&self, block: &Block) -> Result<()> {
        let (expected_height, expected_prev) = match self.get_height()? {
            Some(_) => {
                let tip = self.get_tip()?;
                (tip.height + 1, tip.hash)
            }
            None => (0, ZERO_HASH),
        };

        if block.height != expected_height {
            return Err(LedgerError::InvalidBlock(format!(
                "Expected height {}, got {}",
                expected_height, block.height
            )));
        }
        if block.prev_hash != expected_prev {
            return Err(LedgerError::InvalidBlock(format!(
                "Block {} does not extend tip {}",
                block.height,
                hex::encode(expected_prev)
            )));
        }
        Ok(())
    }
}

impl AccountReader for StoreView<'_> {
    fn get_account(&self, address: &Address) -> Result<Account> {
        StoreView::get_account(self, address)
    }
}

fn check_transaction_list(block: &Block, transactions: &[Transaction]) -> Result<()> {
    let matches = block.transactions.len() == transactions.len()
        && block
            .transactions
            .iter()
            .zip(transactions)
            .all(|(hash, tx)| *hash == tx.hash);
    if !matches {
        return Err(LedgerError::InvalidBlock(format!(
            "Block {} transaction list does not match the supplied transactions",
            block.height
        )));
    }
    Ok(())
}

fn put(conn: &Connection, key: &[u8], value: &[u8]) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn write_block(conn: &Connection, block: &Block) -> Result<()> {
    put(conn, &keys::block_key(&block.hash), &keys::encode(block)?)?;
    put(conn, &keys::height_index_key(block.height), &keys::encode(&block.hash)?)?;
    put(conn, &keys::height_key(), &keys::encode(&block.height)?)?;
    Ok(())
}
