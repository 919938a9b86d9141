//! State Reconciler: brings local tracking state back in line with the
//! consensus-owned pin set (spec.md §4.E).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::consensus::Consensus;
use crate::pin::{Cid, PinInfo};
use crate::tracker::PinTracker;

/// Diff the consensus-owned pin set against local tracking state and
/// issue the fire-and-forget track/untrack calls needed to converge
/// (spec.md §4.E: `StateSync`).
///
/// CIDs the consensus log wants pinned but the tracker has as
/// `Unpinned` get tracked; CIDs the tracker holds but consensus no
/// longer owns get untracked. Returns the `PinInfo` for every CID whose
/// local status changed as a result.
pub async fn state_sync(consensus: &dyn Consensus, tracker: &Arc<dyn PinTracker>) -> crate::error::ClusterResult<Vec<PinInfo>> {
    let wanted: std::collections::BTreeSet<Cid> = consensus.state().await?.list_pins().await.into_iter().collect();
    let tracked: std::collections::BTreeSet<Cid> = tracker
        .status_all()
        .await
        .into_iter()
        .map(|info| info.cid)
        .collect();

    let mut changed = Vec::new();

    for cid in wanted.difference(&tracked) {
        let peer_id = tracker.status(cid).await.peer_id;
        let t = tracker.clone();
        let cid_owned = cid.clone();
        tokio::spawn(async move { t.track(cid_owned).await });
        changed.push(PinInfo::new(cid.clone(), peer_id, crate::pin::PinStatus::Pinning));
    }

    for cid in tracked.difference(&wanted) {
        let peer_id = tracker.status(cid).await.peer_id;
        let t = tracker.clone();
        let cid_owned = cid.clone();
        tokio::spawn(async move { t.untrack(cid_owned).await });
        changed.push(PinInfo::new(cid.clone(), peer_id, crate::pin::PinStatus::Unpinning));
    }

    if !changed.is_empty() {
        info!(count = changed.len(), "reconciler: state sync scheduled fire-and-forget convergence");
    }

    Ok(changed)
}

/// Background worker that periodically calls [`state_sync`] until the
/// root cancellation token fires (spec.md §4.F: periodic reconciliation
/// worker owned by the Lifecycle Controller).
pub async fn run_periodic(
    consensus: Arc<dyn Consensus>,
    tracker: Arc<dyn PinTracker>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it, we just started

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("reconciler: periodic worker stopping");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = state_sync(consensus.as_ref(), &tracker).await {
                    warn!(error = %e, "reconciler: periodic state sync failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::NullConnector;
    use crate::identity::PeerId;
    use crate::tracker::MapPinTracker;

    #[tokio::test]
    async fn state_sync_tracks_consensus_owned_cids() {
        let local = PeerId::zero();
        let consensus = crate::consensus::RaftConsensus::new(local, vec![], None).await.unwrap();
        consensus.start().await.unwrap();
        consensus.log_pin(Cid::new("bafyRecon1")).await.unwrap();

        let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local, Arc::new(NullConnector::default())));
        let changed = state_sync(&consensus, &tracker).await.unwrap();

        assert_eq!(changed.len(), 1);
        assert!(matches!(changed[0].status, crate::pin::PinStatus::Pinning));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let info = tracker.status(&Cid::new("bafyRecon1")).await;
        assert!(matches!(info.status, crate::pin::PinStatus::Pinned));
    }

    #[tokio::test]
    async fn state_sync_untracks_cids_consensus_no_longer_owns() {
        let local = PeerId::zero();
        let consensus = crate::consensus::RaftConsensus::new(local, vec![], None).await.unwrap();
        consensus.start().await.unwrap();

        let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local, Arc::new(NullConnector::default())));
        tracker.track(Cid::new("bafyStale")).await;

        let changed = state_sync(&consensus, &tracker).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert!(matches!(changed[0].status, crate::pin::PinStatus::Unpinning));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let info = tracker.status(&Cid::new("bafyStale")).await;
        assert!(matches!(info.status, crate::pin::PinStatus::Unpinned));
    }

    #[tokio::test]
    async fn state_sync_is_a_noop_when_already_converged() {
        let local = PeerId::zero();
        let consensus = crate::consensus::RaftConsensus::new(local, vec![], None).await.unwrap();
        consensus.start().await.unwrap();

        let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local, Arc::new(NullConnector::default())));
        let changed = state_sync(&consensus, &tracker).await.unwrap();
        assert!(changed.is_empty());
    }
}
