//! Optional out-of-band lease sweeper.
//!
//! Disabled unless explicitly constructed and spawned. Never started by the
//! facade itself — a caller that wants expiry reclamation owns this task
//! and its cancellation token; it spawns auxiliary background work
//! alongside, never inside, request handling.

use crate::facade::StorageFacade;
use crate::model::Bag;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Periodically reclaims `processing` entries that have outlived their TTL,
/// requeuing them to `available` with a bumped version.
pub struct LeaseSweeper {
    handle: JoinHandle<()>,
    cancellation: CancellationToken,
}

impl LeaseSweeper {
    /// Spawns the sweeper loop. The returned handle owns the background
    /// task; dropping it does not stop the task — call [`Self::stop`] or
    /// [`Self::stop_and_wait`] for that.
    pub fn spawn(facade: Arc<StorageFacade>, bag: Bag, ttl: Duration, poll_interval: Duration) -> Self {
        let cancellation = CancellationToken::new();
        let token = cancellation.clone();
        let handle = tokio::spawn(async move {
            let ttl_secs = ttl.as_secs() as i64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        log::debug!("lease sweeper for bag {} stopping", bag.citation);
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        match facade.reclaim_expired_leases(&bag, ttl_secs).await {
                            Ok(0) => {}
                            Ok(n) => log::warn!("lease sweeper reclaimed {n} expired message(s) in bag {}", bag.citation),
                            Err(e) => log::warn!("lease sweeper failed for bag {}: {e}", bag.citation),
                        }
                    }
                }
            }
        });
        Self { handle, cancellation }
    }

    /// Signals the sweeper loop to stop after its current iteration.
    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    /// Signals and waits for the sweeper task to finish.
    pub async fn stop_and_wait(self) {
        self.cancellation.cancel();
        let _ = self.handle.await;
    }
}
