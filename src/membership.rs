//! Membership Protocol: join, peer add/remove, bootstrap, and the
//! leave-on-shutdown sequence (spec.md §4.D).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::broadcast::RpcHub;
use crate::consensus::Consensus;
use crate::error::{ClusterError, ClusterResult};
use crate::identity::{MultiAddr, PeerId};
use crate::peer_manager::PeerManager;
use crate::reconciler;
use crate::rpc::{ClusterRpc, RpcClient};
use crate::tracker::PinTracker;

/// Coordinates membership changes against the Peer Manager and the
/// consensus log.
///
/// `PeerAdd` must serialize against itself: two concurrent adds racing
/// to commit the same log entry could leave the roster and the
/// consensus-owned peer set disagreeing (spec.md §4.D). `add_lock` is
/// held for the whole add-then-commit sequence.
pub struct Membership {
    local_id: PeerId,
    peers: Arc<PeerManager>,
    consensus: Arc<dyn Consensus>,
    tracker: Arc<dyn PinTracker>,
    add_lock: Mutex<()>,
}

impl Membership {
    #[must_use]
    pub fn new(local_id: PeerId, peers: Arc<PeerManager>, consensus: Arc<dyn Consensus>, tracker: Arc<dyn PinTracker>) -> Self {
        Self {
            local_id,
            peers,
            consensus,
            tracker,
            add_lock: Mutex::new(()),
        }
    }

    /// Add a peer to both the roster and the consensus-owned peer set.
    ///
    /// If the consensus commit fails after the roster insertion, the
    /// roster insertion is rolled back so the two stay consistent
    /// (spec.md §4.D).
    pub async fn peer_add(&self, hub: &mut RpcHub, addr: MultiAddr) -> ClusterResult<()> {
        let _guard = self.add_lock.lock().await;
        let (_, pid) = addr.split()?;

        self.peers.add_peer(addr.clone()).await?;

        let client = RpcClient::connect(addr.socket_addr()).await?;

        // Ask the new peer how it sees us, to catch a stale or
        // NAT-mangled self address. The new peer has no way to know us
        // yet on a genuinely first contact, so this is purely
        // informational: its result is logged, never committed, and a
        // failure here never fails the add itself (DESIGN.md Open
        // Questions).
        match client.remote_multiaddr_for_peer(self.local_id).await {
            Ok(observed) => info!(peer = %pid, %observed, "membership: peer reports a different address for us"),
            Err(e) => warn!(peer = %pid, error = %e, "membership: remote_multiaddr_for_peer failed"),
        }

        if let Err(e) = self.consensus.log_add_peer(addr.to_string()).await {
            warn!(peer = %pid, error = %e, "membership: consensus rejected peer add, rolling back roster");
            self.peers.rm_peer(pid, false).await;
            return Err(e);
        }

        hub.insert(pid, client.clone());
        info!(peer = %pid, "membership: peer added");

        let mut known_addrs = self.peers.peers_addrs().await;
        known_addrs.push(MultiAddr::join(self.peers.local_addr(), self.local_id));
        if let Err(e) = client.peer_manager_add_from_multiaddrs(known_addrs).await {
            warn!(peer = %pid, error = %e, "membership: best-effort roster push to new peer failed");
        }

        Ok(())
    }

    /// Remove a peer from both the consensus-owned peer set and the
    /// roster.
    pub async fn peer_remove(&self, hub: &mut RpcHub, pid: PeerId) -> ClusterResult<()> {
        if !self.peers.is_peer(pid).await {
            return Err(ClusterError::NotAPeer(pid));
        }

        self.consensus.log_rm_peer(pid).await?;

        let removed_client = hub.get(&pid);
        self.peers.rm_peer(pid, false).await;
        hub.remove(&pid);
        info!(peer = %pid, "membership: peer removed");

        if let Some(client) = removed_client {
            if let Err(e) = client.peer_manager_rm_peer_shutdown(pid).await {
                warn!(peer = %pid, error = %e, "membership: best-effort shutdown notification to removed peer failed");
            }
        }

        Ok(())
    }

    /// Join an existing cluster by asking a member at `addr` to add us.
    ///
    /// Per the live behavior this mirrors (see DESIGN.md: Open Question
    /// on single-peer-cluster restriction), joining is permitted against
    /// both single-peer and multi-peer clusters.
    pub async fn join(&self, hub: &mut RpcHub, addr: MultiAddr) -> ClusterResult<()> {
        let (remote_addr, remote_pid) = addr.split()?;

        if remote_pid == self.local_id {
            return Ok(());
        }

        let client = RpcClient::connect(remote_addr).await?;
        hub.insert(remote_pid, client.clone());

        let local_addr = MultiAddr::join(self.peers.local_addr(), self.local_id);
        client.peer_add(local_addr).await?;
        self.peers.add_peer(addr).await?;

        self.consensus.wait_for_sync().await?;
        let changed = reconciler::state_sync(self.consensus.as_ref(), &self.tracker).await?;

        info!(peer = %remote_pid, changed = changed.len(), "membership: joined cluster");
        Ok(())
    }

    /// Try each bootstrap address in turn; the first successful `Join`
    /// wins (spec.md §4.D). Ignored if `cluster_peers` is already
    /// configured (`Bootstrap` is only consulted on genuinely first
    /// startup).
    pub async fn bootstrap(&self, hub: &mut RpcHub, addrs: &[MultiAddr]) -> ClusterResult<()> {
        if addrs.is_empty() {
            return Ok(());
        }

        for addr in addrs {
            match self.join(hub, addr.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(%addr, error = %e, "membership: bootstrap address unreachable"),
            }
        }

        Err(ClusterError::BootstrapFailed(addrs.len()))
    }

    /// Leave the cluster gracefully: tell consensus to drop us, give the
    /// commit time to propagate, then reset the local roster to just
    /// ourselves (spec.md §4.D, §4.F: leave-on-shutdown).
    pub async fn leave_on_shutdown(&self) -> ClusterResult<()> {
        info!("membership: leaving cluster on shutdown");
        self.consensus.log_rm_peer(self.local_id).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.peers.reset_peers().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::NullConnector;
    use crate::consensus::RaftConsensus;
    use crate::identity::Keypair;
    use crate::tracker::MapPinTracker;

    fn addr(port: u16) -> std::net::SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn tracker(local: PeerId) -> Arc<dyn PinTracker> {
        Arc::new(MapPinTracker::new(local, Arc::new(NullConnector::default())))
    }

    #[tokio::test]
    async fn peer_remove_on_unknown_peer_fails() {
        let local = PeerId::zero();
        let peers = Arc::new(PeerManager::new(local, addr(9100), std::env::temp_dir()));
        let consensus: Arc<dyn Consensus> = Arc::new(RaftConsensus::new(local, vec![local], Some(local)).await.unwrap());
        let membership = Membership::new(local, peers, consensus, tracker(local));
        let mut hub = RpcHub::new();

        let stranger = Keypair::generate().peer_id();
        let result = membership.peer_remove(&mut hub, stranger).await;
        assert!(matches!(result, Err(ClusterError::NotAPeer(_))));
    }

    #[tokio::test]
    async fn bootstrap_with_no_addresses_is_a_noop() {
        let local = PeerId::zero();
        let peers = Arc::new(PeerManager::new(local, addr(9101), std::env::temp_dir()));
        let consensus: Arc<dyn Consensus> = Arc::new(RaftConsensus::new(local, vec![local], Some(local)).await.unwrap());
        let membership = Membership::new(local, peers, consensus, tracker(local));
        let mut hub = RpcHub::new();

        assert!(membership.bootstrap(&mut hub, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn join_self_is_a_noop() {
        let local = PeerId::zero();
        let peers = Arc::new(PeerManager::new(local, addr(9102), std::env::temp_dir()));
        let consensus: Arc<dyn Consensus> = Arc::new(RaftConsensus::new(local, vec![local], Some(local)).await.unwrap());
        let membership = Membership::new(local, peers, consensus, tracker(local));
        let mut hub = RpcHub::new();

        let self_addr = MultiAddr::join(addr(9102), local);
        assert!(membership.join(&mut hub, self_addr).await.is_ok());
    }
}
