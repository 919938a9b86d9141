//! Block-store connector collaborator contract (spec.md §6: Connector).
//!
//! This is the opaque pin/unpin executor talking to the local block-store
//! daemon (e.g. a Kubo/IPFS node). The orchestrator core never reaches
//! past this trait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ClusterResult;
use crate::pin::{Cid, DaemonId, PinStatus};
use crate::rpc::ClusterRpc;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Ask the daemon to pin a CID.
    async fn pin(&self, cid: &Cid) -> ClusterResult<()>;

    /// Ask the daemon to unpin a CID.
    async fn unpin(&self, cid: &Cid) -> ClusterResult<()>;

    /// Query the daemon's current status for a CID.
    async fn pin_status(&self, cid: &Cid) -> ClusterResult<PinStatus>;

    /// Self-description of the underlying daemon (spec.md §3: ID).
    async fn id(&self) -> ClusterResult<DaemonId>;

    async fn shutdown(&self) -> ClusterResult<()>;

    /// Inject the RPC client this collaborator can use to reach the
    /// cluster (spec.md §6, §4.F step 5).
    async fn set_client(&self, client: Arc<dyn ClusterRpc>);
}

/// A connector with no real daemon behind it: pins are accepted
/// immediately and remembered in memory. Useful for tests and as the
/// default when no daemon connection has been wired in.
#[derive(Default)]
pub struct NullConnector {
    pinned: RwLock<std::collections::HashSet<Cid>>,
    client: RwLock<Option<Arc<dyn ClusterRpc>>>,
}

#[async_trait]
impl Connector for NullConnector {
    async fn pin(&self, cid: &Cid) -> ClusterResult<()> {
        self.pinned.write().await.insert(cid.clone());
        Ok(())
    }

    async fn unpin(&self, cid: &Cid) -> ClusterResult<()> {
        self.pinned.write().await.remove(cid);
        Ok(())
    }

    async fn pin_status(&self, cid: &Cid) -> ClusterResult<PinStatus> {
        let pinned = self.pinned.read().await.contains(cid);
        Ok(if pinned {
            PinStatus::Pinned
        } else {
            PinStatus::Unpinned
        })
    }

    async fn id(&self) -> ClusterResult<DaemonId> {
        Ok(DaemonId {
            id: "null-connector".into(),
            addresses: Vec::new(),
            agent_version: "null/0.1".into(),
        })
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

    #[tokio::test]
    async fn pin_then_unpin_round_trips() {
        let c = NullConnector::default();
        let cid = Cid::new("bafyQ");

        c.pin(&cid).await.unwrap();
        assert!(matches!(c.pin_status(&cid).await.unwrap(), PinStatus::Pinned));

        c.unpin(&cid).await.unwrap();
        assert!(matches!(
            c.pin_status(&cid).await.unwrap(),
            PinStatus::Unpinned
        ));
    }
}
