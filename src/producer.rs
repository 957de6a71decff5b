//! Scheduled block assembly for the validator role.

use crate::blockchain::Block;
use crate::crypto::KeyPair;
use crate::error::Result;
use crate::mempool::Mempool;
use crate::persistence::Storage;
use crate::transaction::verify_transactions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub const DEFAULT_BLOCK_INTERVAL: Duration = Duration::from_secs(5);

pub struct BlockProducer {
    storage: Arc<Storage>,
    mempool: Arc<Mempool>,
    keypair: KeyPair,
    interval: Duration,
}

impl BlockProducer {
    pub fn new(
        storage: Arc<Storage>,
        mempool: Arc<Mempool>,
        keypair: KeyPair,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            mempool,
            keypair,
            interval,
        }
    }

    /// One assembly round: snapshot the mempool, keep what verifies against
    /// committed state, then sign and commit the next block.
    ///
    /// Snapshot hashes leave the mempool only after the commit succeeds, so a
    /// failed round changes nothing.
    pub fn produce_block(&self) -> Result<Block> {
        let snapshot = self.mempool.snapshot();

        let (tip, outcome) = self.storage.view(|view| {
            let tip = view.get_tip()?;
            Ok((tip, verify_transactions(&snapshot, view)?))
        })?;

        let mut accepted = outcome.accepted;
        let height = tip.height + 1;
        for tx in &mut accepted {
            tx.block_height = height;
        }

        let mut block = Block::new(
            height,
            tip.hash,
            self.keypair.address(),
            accepted.iter().map(|tx| tx.hash).collect(),
        );
        block.sign(&self.keypair)?;

        self.storage.commit_block(&block, &accepted)?;

        let staged: Vec<_> = snapshot.iter().map(|tx| tx.hash).collect();
        self.mempool.remove(&staged);

        info!(
            height = block.height,
            hash = %block.hash_str(),
            included = accepted.len(),
            rejected = outcome.rejected.len(),
            "Produced block"
        );
        Ok(block)
    }

    /// Produces a block every interval until `shutdown` flips to `true`.
    /// Rounds run inline, so a slow round delays the next tick instead of
    /// overlapping it.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately.
        ticker.tick().await;

        info!(interval_ms = self.interval.as_millis() as u64, "Block producer started");

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

            let producer = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || producer.produce_block()).await {
                Ok(Ok(block)) => debug!(height = block.height, "Block round complete"),
                Ok(Err(e)) => error!(error = %e, "Block round failed"),
                Err(e) => error!(error = %e, "Block round panicked"),
            }
        }

        info!("Block producer stopped");
    }
}
