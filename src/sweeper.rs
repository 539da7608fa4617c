// src/sweeper.rs

// periodic expiry, bucket pruning and persistence

// dependencies
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::errors::GatewayError;
use crate::ledger::Ledger;
use crate::persist::SnapshotFile;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub buckets_pruned: usize,
    pub saved: bool,
}

/// Evicts expired records, prunes old buckets and writes the snapshot.
#[derive(Debug)]
pub struct Sweeper<C>
where
    C: Clock,
{
    ledger: Arc<Ledger<C>>,
    store: SnapshotFile,
    period: Duration,
}

impl<C> Sweeper<C>
where
    C: Clock + 'static,
{
    pub fn new(ledger: Arc<Ledger<C>>, store: SnapshotFile, period: Duration) -> Self {
        Self {
            ledger,
            store,
            period,
        }
    }

    /// Run one pass.
    ///
    /// The snapshot is written when records were removed or the ledger
    /// changed since the last successful save. A failed save is logged and
    /// retried on the next pass.
    pub fn sweep_once(&self) -> Result<SweepReport, GatewayError> {
        let now = self.ledger.clock().now()?;
        let removed = self.ledger.remove_expired(now);
        let buckets_pruned = self.ledger.prune_buckets(now);

        if removed > 0 {
            info!(removed, "cleanup: removed expired ip(s)");
        }
        if buckets_pruned > 0 {
            debug!(buckets_pruned, "pruned old access buckets");
        }

        let saved = self.flush();
        Ok(SweepReport {
            removed,
            buckets_pruned,
            saved,
        })
    }

    /// Save the snapshot if the ledger is dirty. Returns whether a save succeeded.
    pub fn flush(&self) -> bool {
        if !self.ledger.take_dirty() {
            return false;
        }
        match self.store.save(&self.ledger.snapshot()) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to save snapshot");
                self.ledger.mark_dirty();
                false
            }
        }
    }

    /// Sweep every period until `shutdown` fires, then flush once more.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once() {
                        error!(error = %e, "sweep failed");
                    }
                }
            }
        }

        self.flush();
        info!("sweeper stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
