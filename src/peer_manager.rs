//! Peer Manager: canonical in-memory roster plus address book
//! (spec.md §4.A).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::identity::{MultiAddr, PeerId};

/// Serializable snapshot of the roster, written on graceful shutdown and
/// read on startup (spec.md §6: Persisted state).
#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterSnapshot {
    peers: HashMap<PeerId, Vec<SocketAddr>>,
}

struct RosterInner {
    /// Every peer known to this node, including itself.
    roster: HashMap<PeerId, Vec<SocketAddr>>,
}

/// Canonical roster of cluster members plus address book for the
/// transport.
pub struct PeerManager {
    local_id: PeerId,
    local_addr: SocketAddr,
    inner: RwLock<RosterInner>,
    snapshot_path: PathBuf,
}

impl PeerManager {
    /// Create a new peer manager seeded with only the local peer.
    #[must_use]
    pub fn new(local_id: PeerId, local_addr: SocketAddr, data_dir: impl AsRef<Path>) -> Self {
        let mut roster = HashMap::new();
        roster.insert(local_id, vec![local_addr]);

        Self {
            local_id,
            local_addr,
            inner: RwLock::new(RosterInner { roster }),
            snapshot_path: data_dir.as_ref().join("peerstore.json"),
        }
    }

    /// Seed the roster from a list of composite addresses (spec.md §4.A:
    /// `addFromMultiaddrs`).
    ///
    /// Per-address failures (malformed address, missing peer id) are
    /// logged and skipped; the roster keeps functioning for the
    /// addresses that did parse.
    pub async fn add_from_multiaddrs(&self, addrs: &[MultiAddr]) {
        let mut inner = self.inner.write().await;
        for ma in addrs {
            match ma.split() {
                Ok((addr, pid)) => {
                    inner.roster.entry(pid).or_default().push(addr);
                    debug!(peer = %pid, %addr, "peer manager: seeded address");
                }
                Err(e) => {
                    warn!(multiaddr = %ma, error = %e, "peer manager: failed to seed address");
                }
            }
        }
    }

    /// Add a single peer (spec.md §4.A: `addPeer`).
    ///
    /// Fails if the peer id is our own and the address matches our
    /// listen address (adding ourselves under our own address is not
    /// meaningful).
    pub async fn add_peer(&self, addr: MultiAddr) -> ClusterResult<()> {
        let (socket_addr, pid) = addr.split()?;

        if pid == self.local_id && socket_addr == self.local_addr {
            return Err(ClusterError::ConfigError(
                "cannot add self at local listen address".into(),
            ));
        }

        let mut inner = self.inner.write().await;
        inner.roster.entry(pid).or_default().push(socket_addr);
        info!(peer = %pid, addr = %socket_addr, "peer manager: added peer");
        Ok(())
    }

    /// Remove a peer from the roster (spec.md §4.A: `rmPeer`).
    ///
    /// Returns whether `shutdown` was requested for the local peer, so
    /// the caller (the Lifecycle Controller) can decide to trigger
    /// shutdown — the Peer Manager itself does not own lifecycle state.
    pub async fn rm_peer(&self, pid: PeerId, shutdown: bool) -> bool {
        let mut inner = self.inner.write().await;
        inner.roster.remove(&pid);
        info!(peer = %pid, "peer manager: removed peer");
        shutdown && pid == self.local_id
    }

    /// Ordered list of known peer ids (stable ordering so broadcast reply
    /// vectors align with destination vectors, spec.md §4.A).
    pub async fn peers(&self) -> Vec<PeerId> {
        let inner = self.inner.read().await;
        let mut ids: Vec<PeerId> = inner.roster.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Composite addresses for every peer except the local one.
    pub async fn peers_addrs(&self) -> Vec<MultiAddr> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        let mut ids: Vec<&PeerId> = inner.roster.keys().filter(|id| **id != self.local_id).collect();
        ids.sort();
        for pid in ids {
            if let Some(addr) = inner.roster[pid].first() {
                out.push(MultiAddr::join(*addr, *pid));
            }
        }
        out
    }

    pub async fn is_peer(&self, pid: PeerId) -> bool {
        self.inner.read().await.roster.contains_key(&pid)
    }

    #[must_use]
    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Persist the current roster to disk (spec.md §4.A: `savePeers`).
    /// Failures are logged and non-fatal.
    pub async fn save_peers(&self) {
        let inner = self.inner.read().await;
        let snapshot = RosterSnapshot {
            peers: inner.roster.clone(),
        };
        drop(inner);

        if let Some(parent) = self.snapshot_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "peer manager: failed to create data dir for roster snapshot");
                return;
            }
        }

        match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&self.snapshot_path, bytes).await {
                    warn!(error = %e, path = %self.snapshot_path.display(), "peer manager: failed to persist roster");
                } else {
                    debug!(path = %self.snapshot_path.display(), "peer manager: persisted roster");
                }
            }
            Err(e) => warn!(error = %e, "peer manager: failed to serialize roster"),
        }
    }

    /// Load a previously persisted roster, if present.
    pub async fn load_peers(&self) {
        let bytes = match tokio::fs::read(&self.snapshot_path).await {
            Ok(b) => b,
            Err(_) => return,
        };
        match serde_json::from_slice::<RosterSnapshot>(&bytes) {
            Ok(snapshot) => {
                let mut inner = self.inner.write().await;
                for (pid, addrs) in snapshot.peers {
                    inner.roster.entry(pid).or_default().extend(addrs);
                }
                debug!("peer manager: loaded persisted roster");
            }
            Err(e) => warn!(error = %e, "peer manager: failed to parse persisted roster"),
        }
    }

    /// Reset the roster to contain only the local peer (spec.md §4.A:
    /// `resetPeers`, used after the leave-on-shutdown sequence).
    pub async fn reset_peers(&self) {
        let mut inner = self.inner.write().await;
        inner.roster.clear();
        inner.roster.insert(self.local_id, vec![self.local_addr]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[tokio::test]
    async fn new_roster_contains_only_self() {
        let pid = PeerId::zero();
        let pm = PeerManager::new(pid, addr(9000), std::env::temp_dir());
        assert_eq!(pm.peers().await, vec![pid]);
    }

    #[tokio::test]
    async fn add_peer_then_is_peer() {
        let pid = PeerId::zero();
        let pm = PeerManager::new(pid, addr(9000), std::env::temp_dir());

        let other = crate::identity::Keypair::generate().peer_id();
        pm.add_peer(MultiAddr::join(addr(9001), other)).await.unwrap();

        assert!(pm.is_peer(other).await);
    }

    #[tokio::test]
    async fn adding_self_at_local_addr_fails() {
        let pid = PeerId::zero();
        let pm = PeerManager::new(pid, addr(9000), std::env::temp_dir());

        let result = pm.add_peer(MultiAddr::join(addr(9000), pid)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rm_peer_self_with_shutdown_flag_signals_shutdown() {
        let pid = PeerId::zero();
        let pm = PeerManager::new(pid, addr(9000), std::env::temp_dir());

        assert!(pm.rm_peer(pid, true).await);
        assert!(!pm.rm_peer(pid, false).await);
    }

    #[tokio::test]
    async fn reset_peers_clears_roster_to_self() {
        let pid = PeerId::zero();
        let pm = PeerManager::new(pid, addr(9000), std::env::temp_dir());

        let other = crate::identity::Keypair::generate().peer_id();
        pm.add_peer(MultiAddr::join(addr(9001), other)).await.unwrap();
        pm.reset_peers().await;

        assert_eq!(pm.peers().await, vec![pid]);
    }

    #[tokio::test]
    async fn save_and_load_peers_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pid = PeerId::zero();
        let other = crate::identity::Keypair::generate().peer_id();

        {
            let pm = PeerManager::new(pid, addr(9000), dir.path());
            pm.add_peer(MultiAddr::join(addr(9001), other)).await.unwrap();
            pm.save_peers().await;
        }

        let pm2 = PeerManager::new(pid, addr(9000), dir.path());
        pm2.load_peers().await;
        assert!(pm2.is_peer(other).await);
    }
}
