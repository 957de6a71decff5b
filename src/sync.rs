//! Block replication for the client role
//!
//! A client polls the validator for fixed-size windows of blocks above its
//! local height and commits them in order. Blocks are checked for hash and
//! validator signature integrity but their transactions are not re-executed.

use crate::blockchain::BlockInfoList;
use crate::error::Result;
use crate::persistence::Storage;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Blocks requested per window.
pub const SYNC_WINDOW: u64 = 10;

/// Pause between consecutive windows of one pass.
pub const WINDOW_DELAY: Duration = Duration::from_millis(200);

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Remote that serves committed blocks by height range.
pub trait BlockSource: Send + Sync {
    /// Blocks `left..=right`, contiguous from `left` and possibly fewer than
    /// requested.
    fn get_blocks_interval(
        &self,
        left: u64,
        right: u64,
    ) -> impl Future<Output = Result<BlockInfoList>> + Send;
}

pub struct SyncClient<S> {
    storage: Arc<Storage>,
    source: S,
    interval: Duration,
    window_delay: Duration,
}

impl<S: BlockSource> SyncClient<S> {
    pub fn new(storage: Arc<Storage>, source: S, interval: Duration) -> Self {
        Self {
            storage,
            source,
            interval,
            window_delay: WINDOW_DELAY,
        }
    }

    pub fn with_window_delay(mut self, window_delay: Duration) -> Self {
        self.window_delay = window_delay;
        self
    }

    /// Pulls windows until the source has nothing above the local height.
    /// Returns the number of blocks committed; any error ends the pass.
    pub async fn sync_pass(&self) -> Result<u64> {
        let mut committed = 0u64;

        loop {
            let height = self.storage.get_height()?;
            let (left, right) = (height + 1, height + SYNC_WINDOW);
            let list = self.source.get_blocks_interval(left, right).await?;
            if list.blocks.is_empty() {
                break;
            }
            debug!(left, right, received = list.count, "Fetched block window");

            for info in &list.blocks {
                let (block, transactions) = info.to_parts()?;
                block.verify_integrity()?;
                self.storage.commit_block(&block, &transactions)?;
                committed += 1;
            }

            tokio::time::sleep(self.window_delay).await;
        }

        if committed > 0 {
            info!(committed, height = self.storage.get_height()?, "Synced blocks");
        }
        Ok(committed)
    }

    /// Runs a pass every interval until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        info!(interval_ms = self.interval.as_millis() as u64, "Sync client started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sync_pass().await {
                warn!(error = %e, "Sync pass aborted");
            }
        }

        info!("Sync client stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Genesis;
    use crate::crypto::KeyPair;
    use crate::error::LedgerError;
    use crate::mempool::Mempool;
    use crate::producer::BlockProducer;
    use crate::transaction::Transaction;
    use num_bigint::BigUint;

    struct LocalSource {
        storage: Arc<Storage>,
        tamper: bool,
    }

    impl BlockSource for LocalSource {
        async fn get_blocks_interval(&self, left: u64, right: u64) -> Result<BlockInfoList> {
            let mut list = self.storage.get_blocks_interval(left, right)?;
            if self.tamper {
                for block in &mut list.blocks {
                    block.timestamp += 1;
                }
            }
            Ok(list)
        }
    }

    /// Validator at height 9 with a transfer in most blocks, and a client
    /// holding the first five of them.
    fn validator_and_client() -> (Arc<Storage>, Arc<Storage>) {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let genesis = Genesis::with_allocations(&[(alice.address(), BigUint::from(1_000u32))]);

        let validator = Arc::new(Storage::open_in_memory().unwrap());
        validator.initialize_genesis(&genesis).unwrap();
        let mempool = Arc::new(Mempool::new());
        let producer = BlockProducer::new(
            Arc::clone(&validator),
            Arc::clone(&mempool),
            KeyPair::generate().unwrap(),
            Duration::from_secs(1),
        );
        for nonce in 0..9 {
            mempool.add(
                Transaction::new_signed(&alice, bob.address(), nonce, BigUint::from(10u32))
                    .unwrap(),
            );
            producer.produce_block().unwrap();
        }

        let client = Arc::new(Storage::open_in_memory().unwrap());
        client.initialize_genesis(&genesis).unwrap();
        for info in validator.get_blocks_interval(1, 5).unwrap().blocks {
            let (block, txs) = info.to_parts().unwrap();
            client.commit_block(&block, &txs).unwrap();
        }
        (validator, client)
    }

    #[tokio::test]
    async fn test_client_catches_up() {
        let (validator, client) = validator_and_client();
        assert_eq!(client.get_height().unwrap(), 5);
        assert_eq!(validator.get_height().unwrap(), 9);

        let sync = SyncClient::new(
            Arc::clone(&client),
            LocalSource {
                storage: Arc::clone(&validator),
                tamper: false,
            },
            DEFAULT_SYNC_INTERVAL,
        )
        .with_window_delay(Duration::ZERO);

        assert_eq!(sync.sync_pass().await.unwrap(), 4);
        assert_eq!(client.get_height().unwrap(), 9);
        assert_eq!(
            client.get_tip().unwrap().hash,
            validator.get_tip().unwrap().hash
        );

        // Nothing left to fetch.
        assert_eq!(sync.sync_pass().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replicated_accounts_match() {
        let (validator, client) = validator_and_client();
        let sync = SyncClient::new(
            Arc::clone(&client),
            LocalSource {
                storage: Arc::clone(&validator),
                tamper: false,
            },
            DEFAULT_SYNC_INTERVAL,
        )
        .with_window_delay(Duration::ZERO);
        sync.sync_pass().await.unwrap();

        let tip = validator.get_block_info_by_height(9).unwrap().unwrap();
        let tx = &tip.transactions[0];
        let from = crate::crypto::address_from_hex(&tx.from).unwrap();
        assert_eq!(
            client.get_account(&from).unwrap(),
            validator.get_account(&from).unwrap()
        );
    }

    #[tokio::test]
    async fn test_tampered_blocks_abort_pass() {
        let (validator, client) = validator_and_client();
        let sync = SyncClient::new(
            Arc::clone(&client),
            LocalSource {
                storage: validator,
                tamper: true,
            },
            DEFAULT_SYNC_INTERVAL,
        )
        .with_window_delay(Duration::ZERO);

        assert!(matches!(
            sync.sync_pass().await,
            Err(LedgerError::InvalidBlock(_))
        ));
        assert_eq!(client.get_height().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (validator, client) = validator_and_client();
        let sync = Arc::new(
            SyncClient::new(
                Arc::clone(&client),
                LocalSource {
                    storage: validator,
                    tamper: false,
                },
                Duration::from_millis(20),
            )
            .with_window_delay(Duration::ZERO),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sync.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while client.get_height().unwrap() < 9 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client should reach the validator height");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sync loop should stop")
            .unwrap();
    }
}
