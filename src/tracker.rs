//! Pin tracker collaborator contract and an in-memory default
//! implementation (spec.md §6: PinTracker).
//!
//! The tracker must tolerate overlapping track/untrack calls for the same
//! CID without corrupting state (spec.md §9: fire-and-forget
//! reconciliation) — `MapPinTracker` coalesces by always writing the
//! latest requested status rather than queuing operations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::connector::Connector;
use crate::error::ClusterResult;
use crate::identity::PeerId;
use crate::pin::{Cid, PinInfo, PinStatus};
use crate::rpc::ClusterRpc;

/// Opaque local per-CID state machine that drives the block-store daemon
/// on behalf of this peer (spec.md §6: PinTracker).
#[async_trait]
pub trait PinTracker: Send + Sync {
    async fn track(&self, cid: Cid);
    async fn untrack(&self, cid: Cid);
    async fn status(&self, cid: &Cid) -> PinInfo;
    async fn status_all(&self) -> Vec<PinInfo>;
    async fn sync(&self, cid: &Cid) -> (PinInfo, ClusterResult<()>);
    async fn sync_all(&self) -> (Vec<PinInfo>, ClusterResult<()>);
    async fn recover(&self, cid: &Cid) -> (PinInfo, ClusterResult<()>);
    async fn shutdown(&self) -> ClusterResult<()>;

    /// Inject the RPC client this collaborator can use to reach the
    /// cluster (spec.md §6, §4.F step 5).
    async fn set_client(&self, client: Arc<dyn ClusterRpc>);
}

/// In-memory tracker backed by a `HashMap<Cid, PinInfo>`, driving an
/// injected [`Connector`] for the actual pin/unpin calls.
pub struct MapPinTracker {
    peer_id: PeerId,
    connector: Arc<dyn Connector>,
    state: RwLock<HashMap<Cid, PinInfo>>,
    client: RwLock<Option<Arc<dyn ClusterRpc>>>,
}

impl MapPinTracker {
    #[must_use]
    pub fn new(peer_id: PeerId, connector: Arc<dyn Connector>) -> Self {
        Self {
            peer_id,
            connector,
            state: RwLock::new(HashMap::new()),
            client: RwLock::new(None),
        }
    }

    fn unpinned(&self, cid: &Cid) -> PinInfo {
        PinInfo::new(cid.clone(), self.peer_id, PinStatus::Unpinned)
    }

    async fn set_status(&self, cid: &Cid, status: PinStatus) -> PinInfo {
        let info = PinInfo::new(cid.clone(), self.peer_id, status);
        self.state.write().await.insert(cid.clone(), info.clone());
        info
    }
}

#[async_trait]
impl PinTracker for MapPinTracker {
    async fn track(&self, cid: Cid) {
        debug!(%cid, "tracker: track requested");
        self.set_status(&cid, PinStatus::Pinning).await;

        match self.connector.pin(&cid).await {
            Ok(()) => {
                self.set_status(&cid, PinStatus::Pinned).await;
            }
            Err(e) => {
                let info = PinInfo::new(cid.clone(), self.peer_id, PinStatus::PinError)
                    .with_error(e.to_string());
                self.state.write().await.insert(cid, info);
            }
        }
    }

    async fn untrack(&self, cid: Cid) {
        debug!(%cid, "tracker: untrack requested");
        self.set_status(&cid, PinStatus::Unpinning).await;

        match self.connector.unpin(&cid).await {
            Ok(()) => {
                self.state.write().await.remove(&cid);
            }
            Err(e) => {
                let info = PinInfo::new(cid.clone(), self.peer_id, PinStatus::UnpinError)
                    .with_error(e.to_string());
                self.state.write().await.insert(cid, info);
            }
        }
    }

    async fn status(&self, cid: &Cid) -> PinInfo {
        self.state
            .read()
            .await
            .get(cid)
            .cloned()
            .unwrap_or_else(|| self.unpinned(cid))
    }

    async fn status_all(&self) -> Vec<PinInfo> {
        self.state.read().await.values().cloned().collect()
    }

    async fn sync(&self, cid: &Cid) -> (PinInfo, ClusterResult<()>) {
        match self.connector.pin_status(cid).await {
            Ok(status) => {
                let info = self.set_status(cid, status).await;
                (info, Ok(()))
            }
            Err(e) => {
                let info = self.status(cid).await;
                (info, Err(e))
            }
        }
    }

    async fn sync_all(&self) -> (Vec<PinInfo>, ClusterResult<()>) {
        let cids: Vec<Cid> = self.state.read().await.keys().cloned().collect();
        let mut infos = Vec::with_capacity(cids.len());
        let mut first_err = None;

        for cid in cids {
            let (info, result) = self.sync(&cid).await;
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
            infos.push(info);
        }

        match first_err {
            Some(e) => (infos, Err(e)),
            None => (infos, Ok(())),
        }
    }

    async fn recover(&self, cid: &Cid) -> (PinInfo, ClusterResult<()>) {
        let info = self.status(cid).await;
        if matches!(info.status, PinStatus::PinError | PinStatus::UnpinError) {
            self.track(cid.clone()).await;
            let info = self.status(cid).await;
            (info, Ok(()))
        } else {
            (info, Ok(()))
        }
    }

    async fn shutdown(&self) -> ClusterResult<()> {
        Ok(())
    }

    async fn set_client(&self, client: Arc<dyn ClusterRpc>) {
        *self.client.write().await = Some(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::NullConnector;

    fn tracker() -> MapPinTracker {
        MapPinTracker::new(PeerId::zero(), Arc::new(NullConnector::default()))
    }

    #[tokio::test]
    async fn unknown_cid_reports_unpinned() {
        let t = tracker();
        let info = t.status(&Cid::new("bafyX")).await;
        assert!(matches!(info.status, PinStatus::Unpinned));
    }

    #[tokio::test]
    async fn track_then_status_is_pinned() {
        let t = tracker();
        t.track(Cid::new("bafyY")).await;
        let info = t.status(&Cid::new("bafyY")).await;
        assert!(matches!(info.status, PinStatus::Pinned));
    }

    #[tokio::test]
    async fn untrack_after_track_removes_entry() {
        let t = tracker();
        t.track(Cid::new("bafyZ")).await;
        t.untrack(Cid::new("bafyZ")).await;
        let info = t.status(&Cid::new("bafyZ")).await;
        assert!(matches!(info.status, PinStatus::Unpinned));
    }

    #[tokio::test]
    async fn redundant_track_calls_are_tolerated() {
        let t = tracker();
        t.track(Cid::new("bafyW")).await;
        t.track(Cid::new("bafyW")).await;
        let info = t.status(&Cid::new("bafyW")).await;
        assert!(matches!(info.status, PinStatus::Pinned));
    }
}
