//! RPC Surface: exposes the orchestrator's methods over gRPC, and lets
//! local (self-directed) calls short-circuit through the same trait
//! without touching the network (spec.md §4.B, §9).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::error::{ClusterError, ClusterResult, RpcError};
use crate::identity::{MultiAddr, PeerId};
use crate::pin::{Cid, DaemonId, GlobalPinInfo, Id, PinInfo, PinStatus};

/// Generated gRPC types and client/server stubs for the `Cluster` service
/// (spec.md §6). Built from `proto/cluster.proto` by `build.rs`.
pub mod pb {
    tonic::include_proto!("pinmesh.cluster");
}

// --- Domain <-> wire conversions -------------------------------------

impl From<&Cid> for pb::CidProto {
    fn from(cid: &Cid) -> Self {
        pb::CidProto {
            value: cid.as_str().to_string(),
        }
    }
}

impl From<pb::CidProto> for Cid {
    fn from(p: pb::CidProto) -> Self {
        Cid::new(p.value)
    }
}

impl From<PeerId> for pb::PeerIdProto {
    fn from(p: PeerId) -> Self {
        pb::PeerIdProto {
            value: p.to_string(),
        }
    }
}

impl TryFrom<pb::PeerIdProto> for PeerId {
    type Error = ClusterError;
    fn try_from(p: pb::PeerIdProto) -> Result<Self, Self::Error> {
        p.value.parse()
    }
}

impl From<&MultiAddr> for pb::MultiAddrProto {
    fn from(m: &MultiAddr) -> Self {
        pb::MultiAddrProto {
            value: m.to_string(),
        }
    }
}

impl TryFrom<pb::MultiAddrProto> for MultiAddr {
    type Error = ClusterError;
    fn try_from(p: pb::MultiAddrProto) -> Result<Self, Self::Error> {
        p.value.parse()
    }
}

fn status_to_str(s: PinStatus) -> &'static str {
    match s {
        PinStatus::Unpinned => "unpinned",
        PinStatus::Pinning => "pinning",
        PinStatus::Pinned => "pinned",
        PinStatus::Unpinning => "unpinning",
        PinStatus::PinError => "pin_error",
        PinStatus::UnpinError => "unpin_error",
        PinStatus::ClusterError => "cluster_error",
        PinStatus::Bug => "bug",
    }
}

fn status_from_str(s: &str) -> PinStatus {
    match s {
        "pinning" => PinStatus::Pinning,
        "pinned" => PinStatus::Pinned,
        "unpinning" => PinStatus::Unpinning,
        "pin_error" => PinStatus::PinError,
        "unpin_error" => PinStatus::UnpinError,
        "cluster_error" => PinStatus::ClusterError,
        "bug" => PinStatus::Bug,
        _ => PinStatus::Unpinned,
    }
}

impl From<&PinInfo> for pb::PinInfoProto {
    fn from(info: &PinInfo) -> Self {
        pb::PinInfoProto {
            cid: info.cid.as_str().to_string(),
            peer_id: info.peer_id.to_string(),
            status: status_to_str(info.status).to_string(),
            timestamp_ms: info.timestamp_ms,
            error: info.error.clone(),
        }
    }
}

impl TryFrom<pb::PinInfoProto> for PinInfo {
    type Error = ClusterError;
    fn try_from(p: pb::PinInfoProto) -> Result<Self, Self::Error> {
        Ok(PinInfo {
            cid: Cid::new(p.cid),
            peer_id: p.peer_id.parse()?,
            status: status_from_str(&p.status),
            timestamp_ms: p.timestamp_ms,
            error: p.error,
        })
    }
}

impl From<&GlobalPinInfo> for pb::GlobalPinInfoProto {
    fn from(g: &GlobalPinInfo) -> Self {
        pb::GlobalPinInfoProto {
            cid: g.cid.as_str().to_string(),
            peer_map: g
                .peer_map
                .iter()
                .map(|(pid, info)| (pid.to_string(), info.into()))
                .collect(),
        }
    }
}

impl TryFrom<pb::GlobalPinInfoProto> for GlobalPinInfo {
    type Error = ClusterError;
    fn try_from(p: pb::GlobalPinInfoProto) -> Result<Self, Self::Error> {
        let mut peer_map = HashMap::with_capacity(p.peer_map.len());
        for (pid_str, info_proto) in p.peer_map {
            let pid: PeerId = pid_str.parse()?;
            peer_map.insert(pid, info_proto.try_into()?);
        }
        Ok(GlobalPinInfo {
            cid: Cid::new(p.cid),
            peer_map,
        })
    }
}

impl From<&Id> for pb::IdProto {
    fn from(id: &Id) -> Self {
        pb::IdProto {
            peer_id: id.peer_id.to_string(),
            public_key: id.public_key.to_vec(),
            addresses: id.addresses.clone(),
            cluster_peers: id.cluster_peers.clone(),
            version: id.version.clone(),
            rpc_protocol_version: id.rpc_protocol_version.clone(),
            daemon_id: id.daemon_id.as_ref().map(|d| d.id.clone()),
            error: id.error.clone(),
        }
    }
}

impl TryFrom<pb::IdProto> for Id {
    type Error = ClusterError;
    fn try_from(p: pb::IdProto) -> Result<Self, Self::Error> {
        let public_key: [u8; 32] = p
            .public_key
            .try_into()
            .map_err(|_| ClusterError::Collaborator("id: public key must be 32 bytes".into()))?;
        Ok(Id {
            peer_id: p.peer_id.parse()?,
            public_key,
            addresses: p.addresses,
            cluster_peers: p.cluster_peers,
            version: p.version,
            rpc_protocol_version: p.rpc_protocol_version,
            daemon_id: p.daemon_id.map(|id| DaemonId {
                id,
                addresses: Vec::new(),
                agent_version: String::new(),
            }),
            error: p.error,
        })
    }
}

// --- The orchestrator's exposed method set (spec.md §6) ---------------

/// Every method the `"Cluster"` service exposes, at the domain level.
/// Implemented by the Orchestrator Façade directly, and dispatched to
/// either in-process or over gRPC by [`RpcClient`].
#[async_trait]
pub trait ClusterRpc: Send + Sync {
    async fn id(&self) -> ClusterResult<Id>;
    async fn pin(&self, cid: Cid) -> ClusterResult<()>;
    async fn unpin(&self, cid: Cid) -> ClusterResult<()>;
    async fn pins(&self) -> ClusterResult<Vec<Cid>>;

    async fn peer_add(&self, addr: MultiAddr) -> ClusterResult<Id>;
    async fn peer_remove(&self, pid: PeerId) -> ClusterResult<()>;
    async fn join(&self, addr: MultiAddr) -> ClusterResult<()>;

    async fn status(&self, cid: Cid) -> ClusterResult<GlobalPinInfo>;
    async fn status_all(&self) -> ClusterResult<Vec<GlobalPinInfo>>;

    async fn sync_local(&self, cid: Cid) -> ClusterResult<PinInfo>;
    async fn sync_all_local(&self) -> ClusterResult<Vec<PinInfo>>;
    async fn sync(&self, cid: Cid) -> ClusterResult<GlobalPinInfo>;
    async fn sync_all(&self) -> ClusterResult<Vec<GlobalPinInfo>>;

    async fn recover_local(&self, cid: Cid) -> ClusterResult<PinInfo>;
    async fn recover(&self, cid: Cid) -> ClusterResult<GlobalPinInfo>;

    async fn state_sync(&self) -> ClusterResult<Vec<PinInfo>>;

    async fn tracker_status(&self, cid: Cid) -> ClusterResult<PinInfo>;
    async fn tracker_status_all(&self) -> ClusterResult<Vec<PinInfo>>;
    async fn tracker_recover(&self, cid: Cid) -> ClusterResult<PinInfo>;

    async fn remote_multiaddr_for_peer(&self, pid: PeerId) -> ClusterResult<MultiAddr>;
    async fn peer_manager_add_from_multiaddrs(&self, addrs: Vec<MultiAddr>) -> ClusterResult<()>;
    async fn peer_manager_rm_peer_shutdown(&self, pid: PeerId) -> ClusterResult<()>;
}

/// A handle to one destination: either the local façade (bypassing the
/// network entirely) or a gRPC channel to a remote peer.
#[derive(Clone)]
pub enum RpcClient {
    Local(Arc<dyn ClusterRpc>),
    Remote(Channel),
}

impl RpcClient {
    #[must_use]
    pub fn local(facade: Arc<dyn ClusterRpc>) -> Self {
        Self::Local(facade)
    }

    /// Connect to a remote peer. Timeouts/cancellation are the
    /// transport's responsibility (spec.md §5); callers that need a
    /// request deadline wrap calls in `tokio::time::timeout`.
    pub async fn connect(addr: std::net::SocketAddr) -> ClusterResult<Self> {
        let endpoint = format!("http://{addr}");
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| ClusterError::Rpc {
                peer: PeerId::zero(),
                source: RpcError::Transport(e.to_string()),
            })?
            .connect()
            .await?;
        Ok(Self::Remote(channel))
    }

    fn remote_client(&self) -> Option<pb::cluster_client::ClusterClient<Channel>> {
        match self {
            Self::Remote(channel) => Some(pb::cluster_client::ClusterClient::new(channel.clone())),
            Self::Local(_) => None,
        }
    }
}

macro_rules! remote_unary {
    ($self:expr, $method:ident, $req:expr) => {{
        let mut client = $self.remote_client().expect("remote_unary on Local client");
        let resp = client
            .$method(tonic::Request::new($req))
            .await
            .map_err(RpcError::from)
            .map_err(|e| ClusterError::Rpc {
                peer: PeerId::zero(),
                source: e,
            })?;
        resp.into_inner()
    }};
}

#[async_trait]
impl ClusterRpc for RpcClient {
    async fn id(&self) -> ClusterResult<Id> {
        match self {
            Self::Local(f) => f.id().await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, id, pb::Empty {});
                resp.try_into()
            }
        }
    }

    async fn pin(&self, cid: Cid) -> ClusterResult<()> {
        match self {
            Self::Local(f) => f.pin(cid).await,
            Self::Remote(_) => {
                remote_unary!(self, pin, pb::CidProto::from(&cid));
                Ok(())
            }
        }
    }

    async fn unpin(&self, cid: Cid) -> ClusterResult<()> {
        match self {
            Self::Local(f) => f.unpin(cid).await,
            Self::Remote(_) => {
                remote_unary!(self, unpin, pb::CidProto::from(&cid));
                Ok(())
            }
        }
    }

    async fn pins(&self) -> ClusterResult<Vec<Cid>> {
        match self {
            Self::Local(f) => f.pins().await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, pins, pb::Empty {});
                Ok(resp.values.into_iter().map(Cid::new).collect())
            }
        }
    }

    async fn peer_add(&self, addr: MultiAddr) -> ClusterResult<Id> {
        match self {
            Self::Local(f) => f.peer_add(addr).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, peer_add, pb::MultiAddrProto::from(&addr));
                resp.try_into()
            }
        }
    }

    async fn peer_remove(&self, pid: PeerId) -> ClusterResult<()> {
        match self {
            Self::Local(f) => f.peer_remove(pid).await,
            Self::Remote(_) => {
                remote_unary!(self, peer_remove, pb::PeerIdProto::from(pid));
                Ok(())
            }
        }
    }

    async fn join(&self, addr: MultiAddr) -> ClusterResult<()> {
        match self {
            Self::Local(f) => f.join(addr).await,
            Self::Remote(_) => {
                remote_unary!(self, join, pb::MultiAddrProto::from(&addr));
                Ok(())
            }
        }
    }

    async fn status(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        match self {
            Self::Local(f) => f.status(cid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, status, pb::CidProto::from(&cid));
                resp.try_into()
            }
        }
    }

    async fn status_all(&self) -> ClusterResult<Vec<GlobalPinInfo>> {
        match self {
            Self::Local(f) => f.status_all().await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, status_all, pb::Empty {});
                resp.items.into_iter().map(TryInto::try_into).collect()
            }
        }
    }

    async fn sync_local(&self, cid: Cid) -> ClusterResult<PinInfo> {
        match self {
            Self::Local(f) => f.sync_local(cid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, sync_local, pb::CidProto::from(&cid));
                resp.try_into()
            }
        }
    }

    async fn sync_all_local(&self) -> ClusterResult<Vec<PinInfo>> {
        match self {
            Self::Local(f) => f.sync_all_local().await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, sync_all_local, pb::Empty {});
                resp.items.into_iter().map(TryInto::try_into).collect()
            }
        }
    }

    async fn sync(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        match self {
            Self::Local(f) => f.sync(cid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, sync, pb::CidProto::from(&cid));
                resp.try_into()
            }
        }
    }

    async fn sync_all(&self) -> ClusterResult<Vec<GlobalPinInfo>> {
        match self {
            Self::Local(f) => f.sync_all().await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, sync_all, pb::Empty {});
                resp.items.into_iter().map(TryInto::try_into).collect()
            }
        }
    }

    async fn recover_local(&self, cid: Cid) -> ClusterResult<PinInfo> {
        match self {
            Self::Local(f) => f.recover_local(cid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, recover_local, pb::CidProto::from(&cid));
                resp.try_into()
            }
        }
    }

    async fn recover(&self, cid: Cid) -> ClusterResult<GlobalPinInfo> {
        match self {
            Self::Local(f) => f.recover(cid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, recover, pb::CidProto::from(&cid));
                resp.try_into()
            }
        }
    }

    async fn state_sync(&self) -> ClusterResult<Vec<PinInfo>> {
        match self {
            Self::Local(f) => f.state_sync().await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, state_sync, pb::Empty {});
                resp.items.into_iter().map(TryInto::try_into).collect()
            }
        }
    }

    async fn tracker_status(&self, cid: Cid) -> ClusterResult<PinInfo> {
        match self {
            Self::Local(f) => f.tracker_status(cid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, tracker_status, pb::CidProto::from(&cid));
                resp.try_into()
            }
        }
    }

    async fn tracker_status_all(&self) -> ClusterResult<Vec<PinInfo>> {
        match self {
            Self::Local(f) => f.tracker_status_all().await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, tracker_status_all, pb::Empty {});
                resp.items.into_iter().map(TryInto::try_into).collect()
            }
        }
    }

    async fn tracker_recover(&self, cid: Cid) -> ClusterResult<PinInfo> {
        match self {
            Self::Local(f) => f.tracker_recover(cid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, tracker_recover, pb::CidProto::from(&cid));
                resp.try_into()
            }
        }
    }

    async fn remote_multiaddr_for_peer(&self, pid: PeerId) -> ClusterResult<MultiAddr> {
        match self {
            Self::Local(f) => f.remote_multiaddr_for_peer(pid).await,
            Self::Remote(_) => {
                let resp = remote_unary!(self, remote_multiaddr_for_peer, pb::PeerIdProto::from(pid));
                resp.try_into()
            }
        }
    }

    async fn peer_manager_add_from_multiaddrs(&self, addrs: Vec<MultiAddr>) -> ClusterResult<()> {
        match self {
            Self::Local(f) => f.peer_manager_add_from_multiaddrs(addrs).await,
            Self::Remote(_) => {
                let values = addrs.iter().map(|a| a.to_string()).collect();
                remote_unary!(self, peer_manager_add_from_multiaddrs, pb::MultiAddrList { values });
                Ok(())
            }
        }
    }

    async fn peer_manager_rm_peer_shutdown(&self, pid: PeerId) -> ClusterResult<()> {
        match self {
            Self::Local(f) => f.peer_manager_rm_peer_shutdown(pid).await,
            Self::Remote(_) => {
                remote_unary!(self, peer_manager_rm_peer_shutdown, pb::PeerIdProto::from(pid));
                Ok(())
            }
        }
    }
}

/// Adapts a [`ClusterRpc`] implementation (the Orchestrator Façade) to the
/// generated `tonic` server trait, so it can be registered on a real gRPC
/// server (spec.md §4.B).
pub struct GrpcService {
    inner: Arc<dyn ClusterRpc>,
}

impl GrpcService {
    #[must_use]
    pub fn new(inner: Arc<dyn ClusterRpc>) -> Self {
        Self { inner }
    }
}

fn to_status(err: ClusterError) -> tonic::Status {
    tonic::Status::internal(err.to_string())
}

#[tonic::async_trait]
impl pb::cluster_server::Cluster for GrpcService {
    async fn id(&self, _req: tonic::Request<pb::Empty>) -> Result<tonic::Response<pb::IdProto>, tonic::Status> {
        let id = self.inner.id().await.map_err(to_status)?;
        Ok(tonic::Response::new((&id).into()))
    }

    async fn pin(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::Empty>, tonic::Status> {
        self.inner.pin(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::Empty {}))
    }

    async fn unpin(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::Empty>, tonic::Status> {
        self.inner.unpin(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::Empty {}))
    }

    async fn pins(&self, _req: tonic::Request<pb::Empty>) -> Result<tonic::Response<pb::CidList>, tonic::Status> {
        let pins = self.inner.pins().await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::CidList {
            values: pins.iter().map(|c| c.as_str().to_string()).collect(),
        }))
    }

    async fn peer_add(&self, req: tonic::Request<pb::MultiAddrProto>) -> Result<tonic::Response<pb::IdProto>, tonic::Status> {
        let addr: MultiAddr = req.into_inner().try_into().map_err(to_status)?;
        let id = self.inner.peer_add(addr).await.map_err(to_status)?;
        Ok(tonic::Response::new((&id).into()))
    }

    async fn peer_remove(&self, req: tonic::Request<pb::PeerIdProto>) -> Result<tonic::Response<pb::Empty>, tonic::Status> {
        let pid: PeerId = req.into_inner().try_into().map_err(to_status)?;
        self.inner.peer_remove(pid).await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::Empty {}))
    }

    async fn join(&self, req: tonic::Request<pb::MultiAddrProto>) -> Result<tonic::Response<pb::Empty>, tonic::Status> {
        let addr: MultiAddr = req.into_inner().try_into().map_err(to_status)?;
        self.inner.join(addr).await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::Empty {}))
    }

    async fn status(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::GlobalPinInfoProto>, tonic::Status> {
        let info = self.inner.status(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new((&info).into()))
    }

    async fn status_all(&self, _req: tonic::Request<pb::Empty>) -> Result<tonic::Response<pb::GlobalPinInfoList>, tonic::Status> {
        let items = self.inner.status_all().await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::GlobalPinInfoList {
            items: items.iter().map(Into::into).collect(),
        }))
    }

    async fn sync_local(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::PinInfoProto>, tonic::Status> {
        let info = self.inner.sync_local(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new((&info).into()))
    }

    async fn sync_all_local(&self, _req: tonic::Request<pb::Empty>) -> Result<tonic::Response<pb::PinInfoList>, tonic::Status> {
        let items = self.inner.sync_all_local().await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::PinInfoList {
            items: items.iter().map(Into::into).collect(),
        }))
    }

    async fn sync(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::GlobalPinInfoProto>, tonic::Status> {
        let info = self.inner.sync(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new((&info).into()))
    }

    async fn sync_all(&self, _req: tonic::Request<pb::Empty>) -> Result<tonic::Response<pb::GlobalPinInfoList>, tonic::Status> {
        let items = self.inner.sync_all().await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::GlobalPinInfoList {
            items: items.iter().map(Into::into).collect(),
        }))
    }

    async fn recover_local(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::PinInfoProto>, tonic::Status> {
        let info = self.inner.recover_local(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new((&info).into()))
    }

    async fn recover(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::GlobalPinInfoProto>, tonic::Status> {
        let info = self.inner.recover(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new((&info).into()))
    }

    async fn state_sync(&self, _req: tonic::Request<pb::Empty>) -> Result<tonic::Response<pb::PinInfoList>, tonic::Status> {
        let items = self.inner.state_sync().await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::PinInfoList {
            items: items.iter().map(Into::into).collect(),
        }))
    }

    async fn tracker_status(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::PinInfoProto>, tonic::Status> {
        let info = self.inner.tracker_status(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new((&info).into()))
    }

    async fn tracker_status_all(&self, _req: tonic::Request<pb::Empty>) -> Result<tonic::Response<pb::PinInfoList>, tonic::Status> {
        let items = self.inner.tracker_status_all().await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::PinInfoList {
            items: items.iter().map(Into::into).collect(),
        }))
    }

    async fn tracker_recover(&self, req: tonic::Request<pb::CidProto>) -> Result<tonic::Response<pb::PinInfoProto>, tonic::Status> {
        let info = self.inner.tracker_recover(req.into_inner().into()).await.map_err(to_status)?;
        Ok(tonic::Response::new((&info).into()))
    }

    async fn remote_multiaddr_for_peer(&self, req: tonic::Request<pb::PeerIdProto>) -> Result<tonic::Response<pb::MultiAddrProto>, tonic::Status> {
        let pid: PeerId = req.into_inner().try_into().map_err(to_status)?;
        let addr = self.inner.remote_multiaddr_for_peer(pid).await.map_err(to_status)?;
        Ok(tonic::Response::new((&addr).into()))
    }

    async fn peer_manager_add_from_multiaddrs(&self, req: tonic::Request<pb::MultiAddrList>) -> Result<tonic::Response<pb::Empty>, tonic::Status> {
        let addrs: Vec<MultiAddr> = req
            .into_inner()
            .values
            .into_iter()
            .map(|v| v.parse())
            .collect::<Result<_, _>>()
            .map_err(to_status)?;
        self.inner.peer_manager_add_from_multiaddrs(addrs).await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::Empty {}))
    }

    async fn peer_manager_rm_peer_shutdown(&self, req: tonic::Request<pb::PeerIdProto>) -> Result<tonic::Response<pb::Empty>, tonic::Status> {
        let pid: PeerId = req.into_inner().try_into().map_err(to_status)?;
        self.inner.peer_manager_rm_peer_shutdown(pid).await.map_err(to_status)?;
        Ok(tonic::Response::new(pb::Empty {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_status_round_trips_through_wire_strings() {
        for s in [
            PinStatus::Unpinned,
            PinStatus::Pinning,
            PinStatus::Pinned,
            PinStatus::Unpinning,
            PinStatus::PinError,
            PinStatus::UnpinError,
            PinStatus::ClusterError,
            PinStatus::Bug,
        ] {
            assert_eq!(status_from_str(status_to_str(s)), s);
        }
    }

    #[test]
    fn pin_info_round_trips_through_proto() {
        let info = PinInfo::new(Cid::new("bafyQ"), PeerId::zero(), PinStatus::Pinned);
        let proto: pb::PinInfoProto = (&info).into();
        let back: PinInfo = proto.try_into().unwrap();
        assert_eq!(back.cid, info.cid);
        assert_eq!(back.status, info.status);
    }
}
