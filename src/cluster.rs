//! Orchestrator Façade: binds the Peer Manager, RPC Surface, Broadcast
//! Engine, Membership Protocol, State Reconciler and Lifecycle Controller
//! into the single entry point embedders use (spec.md §4.G).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::api::ClusterApi;
use crate::broadcast::{self, RpcHub};
use crate::config::ClusterConfig;
use crate::connector::Connector;
use crate::consensus::Consensus;
use crate::error::{ClusterError, ClusterResult};
use crate::identity::{Keypair, MultiAddr, PeerId};
use crate::lifecycle::Lifecycle;
use crate::membership::Membership;
use crate::metrics::{ClusterMetrics, ClusterMetricsSnapshot};
use crate::peer_manager::PeerManager;
use crate::pin::{Cid, DaemonId, GlobalPinInfo, Id, PinInfo};
use crate::reconciler;
use crate::rpc::{ClusterRpc, RpcClient};
use crate::tracker::PinTracker;

/// Protocol version this crate speaks over the `Cluster` RPC service.
pub const RPC_PROTOCOL_VERSION: &str = "pinmesh-cluster/1";
/// Crate version reported in `Id` responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The cluster orchestrator. One instance per peer.
pub struct Cluster {
    local_id: PeerId,
    keypair: Keypair,
    config: ClusterConfig,
    peers: Arc<PeerManager>,
    consensus: Arc<dyn Consensus>,
    tracker: Arc<dyn PinTracker>,
    connector: Arc<dyn Connector>,
    api: Arc<dyn ClusterApi>,
    membership: Membership,
    lifecycle: Lifecycle,
    hub: Mutex<RpcHub>,
    metrics: ClusterMetrics,
}

impl Cluster {
    /// Construct the orchestrator. Does not start background workers or
    /// bind the network — call [`Cluster::start`] for that
    /// (spec.md §4.F: startup ordering).
    pub fn new(
        config: ClusterConfig,
        keypair: Keypair,
        consensus: Arc<dyn Consensus>,
        tracker: Arc<dyn PinTracker>,
        connector: Arc<dyn Connector>,
        api: Arc<dyn ClusterApi>,
    ) -> Self {
        let local_id = keypair.peer_id();
        let peers = Arc::new(PeerManager::new(local_id, config.cluster_addr, &config.consensus_data_folder));
        let membership = Membership::new(local_id, peers.clone(), consensus.clone(), tracker.clone());
        let lifecycle = Lifecycle::new(config.leave_on_shutdown);

        Self {
            local_id,
            keypair,
            config,
            peers,
            consensus,
            tracker,
            connector,
            api,
            membership,
            lifecycle,
            hub: Mutex::new(RpcHub::new()),
            metrics: ClusterMetrics::new(),
        }
    }

    /// Point-in-time read of this peer's operation counters.
    #[must_use]
    pub fn metrics(&self) -> ClusterMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Startup ordering (spec.md §4.F): load the persisted roster, seed
    /// it from config, inject the RPC client into every collaborator,
    /// bind the RPC server, run bootstrap-and-ready as its own worker
    /// (failure there tears the whole cluster back down), then start
    /// background workers.
    pub async fn start(self: &Arc<Self>) -> ClusterResult<()> {
        self.peers.load_peers().await;
        self.peers.add_from_multiaddrs(&self.config.cluster_peers).await;

        let local_rpc: Arc<dyn ClusterRpc> = self.clone();

        {
            let mut hub = self.hub.lock().await;
            hub.insert(self.local_id, RpcClient::local(local_rpc.clone()));
            for addr in self.peers.peers_addrs().await {
                if let Ok(client) = RpcClient::connect(addr.socket_addr()).await {
                    hub.insert(addr.peer_id().expect("roster addresses always carry a peer id"), client);
                }
            }
        }

        self.consensus.set_client(local_rpc.clone()).await;
        self.tracker.set_client(local_rpc.clone()).await;
        self.connector.set_client(local_rpc.clone()).await;
        self.api.set_client(local_rpc.clone()).await;

        self.spawn_rpc_server(local_rpc).await?;

        let this = self.clone();
        let bootstrap_ready = tokio::spawn(async move {
            if this.config.cluster_peers.is_empty() && !this.config.bootstrap.is_empty() {
                let mut hub = this.hub.lock().await;
                this.membership.bootstrap(&mut hub, &this.config.bootstrap).await?;
            }
            this.lifecycle.wait_until_ready(this.consensus.as_ref(), &this.config).await?;
            Ok::<(), ClusterError>(())
        });

        match bootstrap_ready.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = self.shutdown().await;
                return Err(e);
            }
            Err(join_err) => {
                let _ = self.shutdown().await;
                return Err(ClusterError::Lifecycle(format!(
                    "bootstrap-and-ready worker panicked: {join_err}"
                )));
            }
        }

        self.lifecycle
            .start_reconciler(self.consensus.clone(), self.tracker.clone(), self.config.state_sync_interval)
            .await;

        info!(peer = %self.local_id, "cluster: started");
        Ok(())
    }

    /// Bind and serve the `Cluster` gRPC service on `config.cluster_addr`,
    /// registering the server task as a background worker so shutdown
    /// cancels and joins it (spec.md §4.B).
    async fn spawn_rpc_server(self: &Arc<Self>, local_rpc: Arc<dyn ClusterRpc>) -> ClusterResult<()> {
        let addr = self.config.cluster_addr;
        let service = crate::rpc::GrpcService::new(local_rpc);
        let cancel = self.lifecycle.cancellation_token();

        let server = tonic::transport::Server::builder()
            .add_service(crate::rpc::pb::cluster_server::ClusterServer::new(service))
            .serve_with_shutdown(addr, async move { cancel.cancelled().await });

        let handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "cluster: rpc server exited with error");
            }
        });
        self.lifecycle.spawn_worker(handle).await;
        Ok(())
    }

    fn ensure_running(&self) -> ClusterResult<()> {
        self.lifecycle.ensure_running()
    }

    // --- Pin operations (spec.md §4.G) ---------------------------------

    pub async fn pin(&self, cid: Cid) -> ClusterResult<()> {
        self.ensure_running()?;
        if let Err(e) = self.consensus.log_pin(cid.clone()).await {
            self.metrics.record_pin_error();
            return Err(e);
        }
        self.metrics.record_pin();
        Ok(())
    }

    pub async fn unpin(&self, cid: Cid) -> ClusterResult<()> {
        self.ensure_running()?;
        self.consensus.log_unpin(cid.clone()).await?;
        self.metrics.record_unpin();
        Ok(())
    }

    pub async fn pins(&self) -> ClusterResult<Vec<Cid>> {
        self.ensure_running()?;
        Ok(self.consensus.state().await?.list_pins().await)
    }

    // --- Cluster-wide status (spec.md §4.G, §4.C broadcast) ------------

    pub async fn status(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        self.ensure_running()?;
        let dests = self.peers.peers().await;
        let hub = self.hub.lock().await;
        let global = broadcast::global_pin_info_cid(cid, &dests, &hub).await;
        let failures = global
            .peer_map
            .values()
            .filter(|info| matches!(info.status, crate::pin::PinStatus::ClusterError))
            .count() as u64;
        self.metrics.record_broadcast(failures);
        Ok(global)
    }

    pub async fn status_all(&self) -> ClusterResult<Vec<GlobalPinInfo>> {
        self.ensure_running()?;
        let cids = self.pins().await?;
        let dests = self.peers.peers().await;
        let hub = self.hub.lock().await;
        Ok(broadcast::global_pin_info_slice(&cids, &dests, &hub).await)
    }

    // --- Local sync/recover (spec.md §4.G) ------------------------------

    pub async fn sync_local(&self, cid: Cid) -> ClusterResult<PinInfo> {
        self.ensure_running()?;
        let (info, result) = self.tracker.sync(&cid).await;
        if let Err(e) = result {
            tracing::warn!(%cid, error = %e, "cluster: sync_local reported a connector error");
        }
        Ok(info)
    }

    pub async fn sync_all_local(&self) -> ClusterResult<Vec<PinInfo>> {
        self.ensure_running()?;
        let (infos, result) = self.tracker.sync_all().await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "cluster: sync_all_local reported a connector error");
        }
        Ok(infos)
    }

    pub async fn recover_local(&self, cid: Cid) -> ClusterResult<PinInfo> {
        self.ensure_running()?;
        let (info, result) = self.tracker.recover(&cid).await;
        result?;
        Ok(info)
    }

    pub async fn state_sync(&self) -> ClusterResult<Vec<PinInfo>> {
        self.ensure_running()?;
        reconciler::state_sync(self.consensus.as_ref(), &self.tracker).await
    }

    // --- Cluster-wide sync/recover (broadcast variants) -----------------

    pub async fn sync(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        self.ensure_running()?;
        let dests = self.peers.peers().await;
        let hub = self.hub.lock().await;
        let cid_for_calls = cid.clone();
        let replies = broadcast::multi_rpc(&dests, &hub, move |client| {
            let cid = cid_for_calls.clone();
            async move { client.sync_local(cid).await }
        })
        .await;

        let mut global = GlobalPinInfo::new(cid.clone());
        for (pid, result) in replies {
            let info = match result {
                Ok(info) => info,
                Err(e) => PinInfo::cluster_error(cid.clone(), pid, e.to_string()),
            };
            global.peer_map.insert(pid, info);
        }
        Ok(global)
    }

    pub async fn sync_all(&self) -> ClusterResult<Vec<GlobalPinInfo>> {
        self.ensure_running()?;
        let cids = self.pins().await?;
        let mut out = Vec::with_capacity(cids.len());
        for cid in cids {
            out.push(self.sync(cid).await?);
        }
        Ok(out)
    }

    pub async fn recover(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        self.ensure_running()?;
        let dests = self.peers.peers().await;
        let hub = self.hub.lock().await;
        let cid_for_calls = cid.clone();
        let replies = broadcast::multi_rpc(&dests, &hub, move |client| {
            let cid = cid_for_calls.clone();
            async move { client.recover_local(cid).await }
        })
        .await;

        let mut global = GlobalPinInfo::new(cid.clone());
        for (pid, result) in replies {
            let info = match result {
                Ok(info) => info,
                Err(e) => PinInfo::cluster_error(cid.clone(), pid, e.to_string()),
            };
            global.peer_map.insert(pid, info);
        }
        Ok(global)
    }

    // --- Identity and membership (spec.md §4.A, §4.D, §4.G) -------------

    pub async fn id(&self) -> ClusterResult<Id> {
        let daemon_id: Option<DaemonId> = self.connector.id().await.ok();
        Ok(Id {
            peer_id: self.local_id,
            public_key: self.keypair.public_key_bytes(),
            addresses: vec![MultiAddr::join(self.config.cluster_addr, self.local_id).to_string()],
            cluster_peers: self.peers.peers().await.iter().map(PeerId::to_string).collect(),
            version: VERSION.to_string(),
            rpc_protocol_version: RPC_PROTOCOL_VERSION.to_string(),
            daemon_id,
            error: None,
        })
    }

    /// `Id` for every current peer, synthesizing an errored entry for
    /// unreachable members (spec.md §4.G: `Peers`).
    pub async fn peers(&self) -> ClusterResult<Vec<Id>> {
        let dests = self.peers.peers().await;
        let hub = self.hub.lock().await;
        let replies = broadcast::multi_rpc(&dests, &hub, |client| async move { client.id().await }).await;
        Ok(replies
            .into_iter()
            .map(|(pid, result)| result.unwrap_or_else(|e| Id::errored(pid, e.to_string())))
            .collect())
    }

    #[must_use]
    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub async fn peer_add(&self, addr: MultiAddr) -> ClusterResult<Id> {
        self.ensure_running()?;
        let (_, pid) = addr.split()?;
        {
            let mut hub = self.hub.lock().await;
            self.membership.peer_add(&mut hub, addr).await?;
        }
        self.metrics.record_peer_add();
        let hub = self.hub.lock().await;
        match hub.get(&pid) {
            Some(client) => client.id().await,
            None => Err(ClusterError::NotAPeer(pid)),
        }
    }

    pub async fn peer_remove(&self, pid: PeerId) -> ClusterResult<()> {
        self.ensure_running()?;
        let mut hub = self.hub.lock().await;
        self.membership.peer_remove(&mut hub, pid).await?;
        self.metrics.record_peer_remove();
        Ok(())
    }

    pub async fn join(&self, addr: MultiAddr) -> ClusterResult<()> {
        self.ensure_running()?;
        let mut hub = self.hub.lock().await;
        self.membership.join(&mut hub, addr).await
    }

    pub async fn remote_multiaddr_for_peer(&self, pid: PeerId) -> ClusterResult<MultiAddr> {
        self.peers
            .peers_addrs()
            .await
            .into_iter()
            .find(|ma| ma.peer_id() == Some(pid))
            .ok_or(ClusterError::NotAPeer(pid))
    }

    pub async fn shutdown(&self) -> ClusterResult<()> {
        self.lifecycle
            .shutdown(
                &self.membership,
                self.consensus.as_ref(),
                self.peers.as_ref(),
                self.api.as_ref(),
                self.connector.as_ref(),
                self.tracker.as_ref(),
            )
            .await
    }
}

#[async_trait]
impl ClusterRpc for Cluster {
    async fn id(&self) -> ClusterResult<Id> {
        self.id().await
    }

    async fn pin(&self, cid: Cid) -> ClusterResult<()> {
        self.pin(cid).await
    }

    async fn unpin(&self, cid: Cid) -> ClusterResult<()> {
        self.unpin(cid).await
    }

    async fn pins(&self) -> ClusterResult<Vec<Cid>> {
        self.pins().await
    }

    async fn peer_add(&self, addr: MultiAddr) -> ClusterResult<Id> {
        self.peer_add(addr).await
    }

    async fn peer_remove(&self, pid: PeerId) -> ClusterResult<()> {
        self.peer_remove(pid).await
    }

    async fn join(&self, addr: MultiAddr) -> ClusterResult<()> {
        self.join(addr).await
    }

    async fn status(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        self.status(cid).await
    }

    async fn status_all(&self) -> ClusterResult<Vec<GlobalPinInfo>> {
        self.status_all().await
    }

    async fn sync_local(&self, cid: Cid) -> ClusterResult<PinInfo> {
        self.sync_local(cid).await
    }

    async fn sync_all_local(&self) -> ClusterResult<Vec<PinInfo>> {
        self.sync_all_local().await
    }

    async fn sync(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        self.sync(cid).await
    }

    async fn sync_all(&self) -> ClusterResult<Vec<GlobalPinInfo>> {
        self.sync_all().await
    }

    async fn recover_local(&self, cid: Cid) -> ClusterResult<PinInfo> {
        self.recover_local(cid).await
    }

    async fn recover(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        self.recover(cid).await
    }

    async fn state_sync(&self) -> ClusterResult<Vec<PinInfo>> {
        self.state_sync().await
    }

    async fn tracker_status(&self, cid: Cid) -> ClusterResult<PinInfo> {
        Ok(self.tracker.status(&cid).await)
    }

    async fn tracker_status_all(&self) -> ClusterResult<Vec<PinInfo>> {
        Ok(self.tracker.status_all().await)
    }

    async fn tracker_recover(&self, cid: Cid) -> ClusterResult<PinInfo> {
        let (info, result) = self.tracker.recover(&cid).await;
        result?;
        Ok(info)
    }

    async fn remote_multiaddr_for_peer(&self, pid: PeerId) -> ClusterResult<MultiAddr> {
        self.remote_multiaddr_for_peer(pid).await
    }

    async fn peer_manager_add_from_multiaddrs(&self, addrs: Vec<MultiAddr>) -> ClusterResult<()> {
        self.peers.add_from_multiaddrs(&addrs).await;
        Ok(())
    }

    async fn peer_manager_rm_peer_shutdown(&self, pid: PeerId) -> ClusterResult<()> {
        let should_shutdown = self.peers.rm_peer(pid, true).await;
        if should_shutdown {
            self.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NoopApi;
    use crate::connector::NullConnector;
    use crate::consensus::RaftConsensus;
    use crate::tracker::MapPinTracker;
    use std::sync::atomic::{AtomicU16, Ordering as AtomicOrdering};

    fn test_port() -> u16 {
        static PORT_COUNTER: AtomicU16 = AtomicU16::new(22000);
        PORT_COUNTER.fetch_add(1, AtomicOrdering::SeqCst)
    }

    #[tokio::test]
    async fn single_peer_pin_then_status_reports_pinned() {
        let keypair = Keypair::generate();
        let local_id = keypair.peer_id();
        let config = ClusterConfig::builder()
            .cluster_addr(format!("127.0.0.1:{}", test_port()).parse().unwrap())
            .consensus_data_folder(std::env::temp_dir().join(format!("pinmesh-test-{local_id}")))
            .build()
            .unwrap();

        let consensus = Arc::new(RaftConsensus::new(local_id, vec![], Some(local_id)).await.unwrap());
        consensus.start().await.unwrap();
        let consensus: Arc<dyn Consensus> = consensus;

        let connector: Arc<dyn Connector> = Arc::new(NullConnector::default());
        let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local_id, connector.clone()));
        let api: Arc<dyn ClusterApi> = Arc::new(NoopApi::default());

        let cluster = Arc::new(Cluster::new(config, keypair, consensus, tracker, connector, api));
        cluster.start().await.unwrap();

        let cid = Cid::new("bafyClusterTest1");
        cluster.pin(cid.clone()).await.unwrap();
        cluster.state_sync().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let global = cluster.status(cid.clone()).await.unwrap();
        assert_eq!(global.peer_map.len(), 1);
        assert!(matches!(
            global.peer_map[&local_id].status,
            crate::pin::PinStatus::Pinned
        ));

        cluster.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn operations_after_shutdown_are_rejected() {
        let keypair = Keypair::generate();
        let local_id = keypair.peer_id();
        let config = ClusterConfig::builder()
            .cluster_addr(format!("127.0.0.1:{}", test_port()).parse().unwrap())
            .consensus_data_folder(std::env::temp_dir().join(format!("pinmesh-test-{local_id}")))
            .build()
            .unwrap();

        let consensus = Arc::new(RaftConsensus::new(local_id, vec![], Some(local_id)).await.unwrap());
        consensus.start().await.unwrap();
        let consensus: Arc<dyn Consensus> = consensus;

        let connector: Arc<dyn Connector> = Arc::new(NullConnector::default());
        let tracker: Arc<dyn PinTracker> = Arc::new(MapPinTracker::new(local_id, connector.clone()));
        let api: Arc<dyn ClusterApi> = Arc::new(NoopApi::default());

        let cluster = Arc::new(Cluster::new(config, keypair, consensus, tracker, connector, api));
        cluster.start().await.unwrap();
        cluster.shutdown().await.unwrap();

        let result = cluster.pin(Cid::new("bafyAfterShutdown")).await;
        assert!(matches!(result, Err(ClusterError::ShuttingDown)));
    }
}
