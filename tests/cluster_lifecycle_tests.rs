//! End-to-end lifecycle scenarios exercised against the in-memory
//! default collaborators.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pinmesh_cluster::connector::{Connector, NullConnector};
use pinmesh_cluster::consensus::{Consensus, RaftConsensus};
use pinmesh_cluster::tracker::{MapPinTracker, PinTracker};
use pinmesh_cluster::{ClusterApi, ClusterConfig, ClusterError, Keypair, MultiAddr, PeerId, PinStatus};

fn test_port() -> u16 {
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(21000);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Build and start a cluster bound to its own port. `leader` names the
/// peer the local consensus engine should treat as leader; `None` makes
/// the new peer its own leader (a fresh single-peer cluster), `Some(id)`
/// makes it a non-leader follower of an already-running peer, the shape
/// every joiner in these tests needs.
async fn make_cluster(leader: Option<PeerId>) -> (Arc<pinmesh_cluster::Cluster>, PeerId, u16) {
    let keypair = Keypair::generate();
    let local_id = keypair.peer_id();
    let port = test_port();

    let config = ClusterConfig::builder()
        .cluster_addr(format!("127.0.0.1:{port}").parse().unwrap())
        .consensus_data_folder(std::env::temp_dir().join(format!("pinmesh-it-{local_id}")))
        .build()
        .unwrap();

    let consensus = Arc::new(RaftConsensus::new(local_id, vec![], Some(leader.unwrap_or(local_id))).await.unwrap());
    consensus.start().await.unwrap();
    let consensus: Arc<dyn Consensus> = consensus;

    let connector: Arc<dyn Connector> = Arc::new(NullConnector::default());
    let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local_id, connector.clone()));
    let api: Arc<dyn ClusterApi> = Arc::new(pinmesh_cluster::api::NoopApi::default());

    let cluster = Arc::new(pinmesh_cluster::Cluster::new(config, keypair, consensus, tracker, connector, api));
    cluster.start().await.unwrap();
    (cluster, local_id, port)
}

async fn single_peer_cluster() -> Arc<pinmesh_cluster::Cluster> {
    make_cluster(None).await.0
}

fn multiaddr(port: u16, pid: PeerId) -> MultiAddr {
    format!("127.0.0.1:{port}/p2p/{pid}").parse().unwrap()
}

#[tokio::test]
async fn single_peer_lifecycle_pin_status_shutdown() {
    let cluster = single_peer_cluster().await;
    let cid = pinmesh_cluster::Cid::new("bafySingle1");

    cluster.pin(cid.clone()).await.unwrap();
    let global = cluster.status(cid.clone()).await.unwrap();
    assert_eq!(global.peer_map.len(), 1);

    let pins = cluster.pins().await.unwrap();
    assert!(pins.contains(&cid));

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn id_reports_self_peer_id_and_version() {
    let cluster = single_peer_cluster().await;
    let id = cluster.id().await.unwrap();

    assert!(id.error.is_none());
    assert_eq!(id.version, cluster.version());

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn unpin_after_pin_converges_to_unpinned() {
    let cluster = single_peer_cluster().await;
    let cid = pinmesh_cluster::Cid::new("bafySingle2");

    cluster.pin(cid.clone()).await.unwrap();
    cluster.unpin(cid.clone()).await.unwrap();

    let global = cluster.status(cid.clone()).await.unwrap();
    let local = global.peer_map.values().next().unwrap();
    assert!(matches!(local.status, PinStatus::Unpinned));

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn state_sync_reconciles_tracker_with_consensus_pin_set() {
    let cluster = single_peer_cluster().await;
    let cid = pinmesh_cluster::Cid::new("bafySingle3");

    // pin() only commits to consensus; tracker convergence is the state
    // reconciler's exclusive job, run here explicitly instead of waiting
    // for the periodic worker.
    cluster.pin(cid.clone()).await.unwrap();
    let changed = cluster.state_sync().await.unwrap();
    assert_eq!(changed.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let changed_again = cluster.state_sync().await.unwrap();
    assert!(changed_again.is_empty());

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_is_idempotent_end_to_end() {
    let cluster = single_peer_cluster().await;
    cluster.shutdown().await.unwrap();
    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn operations_fail_fast_once_shutting_down() {
    let cluster = single_peer_cluster().await;
    cluster.shutdown().await.unwrap();

    let result = cluster.pin(pinmesh_cluster::Cid::new("bafyAfter")).await;
    assert!(result.is_err());
}

// --- Multi-peer scenarios --------------------------------------------

#[tokio::test]
async fn two_peer_join_populates_roster_on_both_sides() {
    let (cluster_a, a_id, a_port) = make_cluster(None).await;
    let (cluster_b, b_id, _b_port) = make_cluster(Some(a_id)).await;

    cluster_b.join(multiaddr(a_port, a_id)).await.unwrap();

    let a_peers = cluster_a.peers().await.unwrap();
    assert!(a_peers.iter().any(|id| id.peer_id == b_id));

    let b_peers = cluster_b.peers().await.unwrap();
    assert!(b_peers.iter().any(|id| id.peer_id == a_id));

    cluster_a.shutdown().await.unwrap();
    cluster_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn join_against_self_address_is_a_noop_not_an_error() {
    let (cluster_a, a_id, a_port) = make_cluster(None).await;

    cluster_a.join(multiaddr(a_port, a_id)).await.unwrap();
    let peers = cluster_a.peers().await.unwrap();
    assert_eq!(peers.len(), 1);

    cluster_a.shutdown().await.unwrap();
}

#[tokio::test]
async fn peer_remove_drops_roster_entry_and_shuts_down_removed_peer() {
    let (cluster_a, a_id, a_port) = make_cluster(None).await;
    let (cluster_b, b_id, _b_port) = make_cluster(Some(a_id)).await;

    cluster_b.join(multiaddr(a_port, a_id)).await.unwrap();
    cluster_a.peer_remove(b_id).await.unwrap();

    let a_peers = cluster_a.peers().await.unwrap();
    assert!(!a_peers.iter().any(|id| id.peer_id == b_id));

    // peer_remove best-effort notifies the removed peer, which shuts
    // itself down on receiving PeerManagerRmPeerShutdown for its own id.
    let result = cluster_b.pin(pinmesh_cluster::Cid::new("bafyAfterRemove")).await;
    assert!(matches!(result, Err(ClusterError::ShuttingDown)));

    cluster_a.shutdown().await.unwrap();
}

#[tokio::test]
async fn status_all_reports_cluster_error_for_an_unreachable_peer() {
    let dead_id = Keypair::generate().peer_id();
    let dead_addr = multiaddr(test_port(), dead_id);

    let keypair = Keypair::generate();
    let local_id = keypair.peer_id();
    let port = test_port();
    let config = ClusterConfig::builder()
        .cluster_addr(format!("127.0.0.1:{port}").parse().unwrap())
        .cluster_peers(vec![dead_addr])
        .consensus_data_folder(std::env::temp_dir().join(format!("pinmesh-it-{local_id}")))
        .build()
        .unwrap();

    let consensus = Arc::new(RaftConsensus::new(local_id, vec![], Some(local_id)).await.unwrap());
    consensus.start().await.unwrap();
    let consensus: Arc<dyn Consensus> = consensus;

    let connector: Arc<dyn Connector> = Arc::new(NullConnector::default());
    let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local_id, connector.clone()));
    let api: Arc<dyn ClusterApi> = Arc::new(pinmesh_cluster::api::NoopApi::default());

    let cluster = Arc::new(pinmesh_cluster::Cluster::new(config, keypair, consensus, tracker, connector, api));
    cluster.start().await.unwrap();

    let cid = pinmesh_cluster::Cid::new("bafyDeadPeer");
    cluster.pin(cid.clone()).await.unwrap();
    cluster.state_sync().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let global = cluster.status(cid.clone()).await.unwrap();
    assert_eq!(global.peer_map.len(), 2);
    assert!(matches!(global.peer_map[&local_id].status, PinStatus::Pinned));
    assert!(matches!(
        global.peer_map[&dead_id].status,
        PinStatus::ClusterError
    ));

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn leave_on_shutdown_runs_the_leave_sequence_to_completion() {
    let keypair = Keypair::generate();
    let local_id = keypair.peer_id();
    let port = test_port();
    let config = ClusterConfig::builder()
        .cluster_addr(format!("127.0.0.1:{port}").parse().unwrap())
        .consensus_data_folder(std::env::temp_dir().join(format!("pinmesh-it-{local_id}")))
        .leave_on_shutdown(true)
        .build()
        .unwrap();

    let consensus = Arc::new(RaftConsensus::new(local_id, vec![], Some(local_id)).await.unwrap());
    consensus.start().await.unwrap();
    let consensus: Arc<dyn Consensus> = consensus;

    let connector: Arc<dyn Connector> = Arc::new(NullConnector::default());
    let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local_id, connector.clone()));
    let api: Arc<dyn ClusterApi> = Arc::new(pinmesh_cluster::api::NoopApi::default());

    let cluster = Arc::new(pinmesh_cluster::Cluster::new(config, keypair, consensus, tracker, connector, api));
    cluster.start().await.unwrap();

    // leave_on_shutdown commits LogRmPeer(self), sleeps out the
    // propagation heuristic, then resets the roster: the whole sequence
    // must still complete cleanly and stay idempotent.
    cluster.shutdown().await.unwrap();
    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_reuses_consensus_log_and_reconciles_tracker() {
    let keypair = Keypair::generate();
    let local_id = keypair.peer_id();
    let port = test_port();

    let consensus = Arc::new(RaftConsensus::new(local_id, vec![], Some(local_id)).await.unwrap());
    consensus.start().await.unwrap();
    let consensus: Arc<dyn Consensus> = consensus;

    // A pin committed before the process "crashes" — only the durable
    // consensus log survives a restart, not the in-memory tracker.
    let cid = pinmesh_cluster::Cid::new("bafyRestart");
    consensus.log_pin(cid.clone()).await.unwrap();

    let connector: Arc<dyn Connector> = Arc::new(NullConnector::default());
    let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local_id, connector.clone()));
    let api: Arc<dyn ClusterApi> = Arc::new(pinmesh_cluster::api::NoopApi::default());

    let config = ClusterConfig::builder()
        .cluster_addr(format!("127.0.0.1:{port}").parse().unwrap())
        .consensus_data_folder(std::env::temp_dir().join(format!("pinmesh-it-restart-{local_id}")))
        .build()
        .unwrap();

    let cluster = Arc::new(pinmesh_cluster::Cluster::new(config, keypair, consensus, tracker, connector, api));
    cluster.start().await.unwrap();

    let changed = cluster.state_sync().await.unwrap();
    assert_eq!(changed.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let global = cluster.status(cid.clone()).await.unwrap();
    assert!(matches!(
        global.peer_map[&local_id].status,
        PinStatus::Pinned
    ));

    cluster.shutdown().await.unwrap();
}
