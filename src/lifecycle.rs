//! Lifecycle Controller: startup ordering, readiness, and the idempotent
//! shutdown sequence (spec.md §4.F).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::ClusterApi;
use crate::config::ClusterConfig;
use crate::connector::Connector;
use crate::consensus::{wait_ready, Consensus};
use crate::error::{ClusterError, ClusterResult};
use crate::membership::Membership;
use crate::peer_manager::PeerManager;
use crate::reconciler;
use crate::tracker::PinTracker;

/// Owns the background workers and the once-only shutdown sequence
/// (spec.md §4.F).
pub struct Lifecycle {
    cancel: CancellationToken,
    shutdown_lock: Mutex<()>,
    shut_down: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    leave_on_shutdown: bool,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(leave_on_shutdown: bool) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            shutdown_lock: Mutex::new(()),
            shut_down: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            leave_on_shutdown,
            ready_tx,
            ready_rx,
            done_tx,
            done_rx,
        }
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Fires once startup has completed (spec.md §3: Lifecycle Signals).
    #[must_use]
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    /// Closed after the shutdown sequence completes (spec.md §3: Lifecycle
    /// Signals), whether it ended in success or a fail-fast error.
    #[must_use]
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }

    /// Block until consensus reports a leader, or fail after
    /// `config.consensus_ready_timeout` (spec.md §4.F: Bootstrap-and-Ready
    /// worker). Fires the `ready` signal once this resolves successfully.
    pub async fn wait_until_ready(&self, consensus: &dyn Consensus, config: &ClusterConfig) -> ClusterResult<()> {
        wait_ready(consensus, config.consensus_ready_timeout).await?;
        let _ = self.ready_tx.send(true);
        Ok(())
    }

    /// Register a background worker so shutdown can cancel and join it.
    pub async fn spawn_worker(&self, handle: JoinHandle<()>) {
        self.workers.lock().await.push(handle);
    }

    /// Run the full shutdown sequence exactly once; subsequent calls are
    /// no-ops (spec.md §4.F: idempotent shutdown).
    ///
    /// Order: leave-on-shutdown (best-effort), consensus shutdown
    /// (fail-fast: an error here aborts the rest of the sequence), persist
    /// roster, shut down API/connector/tracker (first error aborts the
    /// rest), cancel and join background workers. `done` is closed
    /// unconditionally before returning, whether the sequence ran to
    /// completion or aborted early (spec.md §7).
    #[allow(clippy::too_many_arguments)]
    pub async fn shutdown(
        &self,
        membership: &Membership,
        consensus: &dyn Consensus,
        peers: &PeerManager,
        api: &dyn ClusterApi,
        connector: &dyn Connector,
        tracker: &dyn PinTracker,
    ) -> ClusterResult<()> {
        let _guard = self.shutdown_lock.lock().await;
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self
            .run_shutdown_sequence(membership, consensus, peers, api, connector, tracker)
            .await;
        let _ = self.done_tx.send(true);
        result
    }

    async fn run_shutdown_sequence(
        &self,
        membership: &Membership,
        consensus: &dyn Consensus,
        peers: &PeerManager,
        api: &dyn ClusterApi,
        connector: &dyn Connector,
        tracker: &dyn PinTracker,
    ) -> ClusterResult<()> {
        info!("lifecycle: shutting down");

        if self.leave_on_shutdown {
            if let Err(e) = membership.leave_on_shutdown().await {
                warn!(error = %e, "lifecycle: leave-on-shutdown failed, continuing shutdown");
            }
        }

        consensus.shutdown().await?;

        peers.save_peers().await;

        api.shutdown().await?;
        connector.shutdown().await?;
        tracker.shutdown().await?;

        self.cancel.cancel();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "lifecycle: background worker panicked during shutdown");
            }
        }

        info!("lifecycle: shutdown complete");
        Ok(())
    }

    /// Convenience guard against calling cluster operations after
    /// shutdown has started.
    pub fn ensure_running(&self) -> ClusterResult<()> {
        if self.is_shutting_down() {
            return Err(ClusterError::ShuttingDown);
        }
        Ok(())
    }

    /// Start the periodic state-sync worker, registering it for shutdown.
    pub async fn start_reconciler(
        &self,
        consensus: Arc<dyn Consensus>,
        tracker: Arc<dyn PinTracker>,
        interval: Duration,
    ) {
        let cancel = self.cancellation_token();
        let handle = tokio::spawn(reconciler::run_periodic(consensus, tracker, interval, cancel));
        self.spawn_worker(handle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NoopApi;
    use crate::connector::NullConnector;
    use crate::consensus::RaftConsensus;
    use crate::identity::PeerId;
    use crate::tracker::MapPinTracker;

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let local = PeerId::zero();
        let peers = PeerManager::new(local, "127.0.0.1:9200".parse().unwrap(), std::env::temp_dir());
        let consensus = RaftConsensus::new(local, vec![], Some(local)).await.unwrap();
        consensus.start().await.unwrap();
        let tracker_for_membership: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local, Arc::new(NullConnector::default())));
        let membership = Membership::new(
            local,
            Arc::new(PeerManager::new(local, "127.0.0.1:9201".parse().unwrap(), std::env::temp_dir())),
            Arc::new(RaftConsensus::new(local, vec![], Some(local)).await.unwrap()),
            tracker_for_membership,
        );
        let api = NoopApi::default();
        let connector = NullConnector::default();
        let tracker = MapPinTracker::new(local, Arc::new(NullConnector::default()));

        let lifecycle = Lifecycle::new(false);
        lifecycle
            .shutdown(&membership, &consensus, &peers, &api, &connector, &tracker)
            .await
            .unwrap();
        lifecycle
            .shutdown(&membership, &consensus, &peers, &api, &connector, &tracker)
            .await
            .unwrap();

        assert!(lifecycle.is_shutting_down());
    }

    #[tokio::test]
    async fn ensure_running_fails_after_shutdown_starts() {
        let lifecycle = Lifecycle::new(false);
        assert!(lifecycle.ensure_running().is_ok());
        lifecycle.shut_down.store(true, Ordering::SeqCst);
        assert!(matches!(
            lifecycle.ensure_running(),
            Err(ClusterError::ShuttingDown)
        ));
    }
}
