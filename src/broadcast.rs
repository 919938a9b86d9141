//! Broadcast Engine: concurrent fan-out RPCs across the roster, with
//! partial failure folded into the reply rather than failing the whole
//! call (spec.md §4.C).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::warn;

use crate::error::{ClusterError, ClusterResult};
use crate::identity::PeerId;
use crate::pin::{Cid, GlobalPinInfo, PinInfo, PinStatus};
use crate::rpc::{ClusterRpc, RpcClient};

/// Resolves a peer id to the client used to reach it — the local peer
/// resolves to an in-process [`RpcClient::Local`], every other peer to a
/// remote channel (spec.md §9 design note).
pub struct RpcHub {
    clients: HashMap<PeerId, RpcClient>,
}

impl RpcHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn insert(&mut self, peer: PeerId, client: RpcClient) {
        self.clients.insert(peer, client);
    }

    pub fn remove(&mut self, peer: &PeerId) {
        self.clients.remove(peer);
    }

    #[must_use]
    pub fn get(&self, peer: &PeerId) -> Option<RpcClient> {
        self.clients.get(peer).cloned()
    }
}

impl Default for RpcHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan out `f` to every destination in `dests`, in parallel, capturing
/// per-destination errors rather than aborting the whole query
/// (spec.md §4.C: `multiRpc`).
///
/// The result vector is positionally aligned with `dests`: `result[i]`
/// always corresponds to `dests[i]`, even when that destination failed.
pub async fn multi_rpc<F, Fut, T>(dests: &[PeerId], hub: &RpcHub, f: F) -> Vec<(PeerId, ClusterResult<T>)>
where
    F: Fn(RpcClient) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ClusterResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let f = Arc::new(f);
    let mut set = JoinSet::new();

    for (idx, pid) in dests.iter().copied().enumerate() {
        let f = f.clone();
        match hub.get(&pid) {
            Some(client) => {
                set.spawn(async move {
                    let result = f(client).await;
                    (idx, pid, result)
                });
            }
            None => {
                set.spawn(async move {
                    (idx, pid, Err(ClusterError::NotAPeer(pid)))
                });
            }
        }
    }

    let mut slots: Vec<Option<(PeerId, ClusterResult<T>)>> = (0..dests.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, pid, result)) => slots[idx] = Some((pid, result)),
            Err(join_err) => {
                warn!(error = %join_err, "broadcast: task panicked during multi_rpc");
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| {
                (
                    dests[idx],
                    Err(ClusterError::Collaborator("broadcast task lost its result".into())),
                )
            })
        })
        .collect()
}

/// Fold a peer's raw reply into a trustworthy `PinInfo`: a reply claiming
/// a different peer id, or a `Bug` status, is replaced with a synthesized
/// `ClusterError` entry rather than trusted verbatim.
fn normalize_reply(cid: &Cid, pid: PeerId, info: PinInfo) -> PinInfo {
    if info.peer_id != pid {
        warn!(peer = %pid, reported = %info.peer_id, "broadcast: peer reported a foreign peer id");
        PinInfo::cluster_error(cid.clone(), pid, "peer replied with mismatched identity")
    } else if info.status == PinStatus::Bug {
        warn!(peer = %pid, "broadcast: peer reported a bug status");
        PinInfo::cluster_error(cid.clone(), pid, "peer reported a bug status")
    } else {
        info
    }
}

/// Query every peer for their view of one CID, merging into a single
/// `GlobalPinInfo` with exactly one entry per destination (spec.md §4.C:
/// `globalPinInfoCid`). Unreachable or buggy peers get a synthesized
/// `ClusterError`/`Bug` entry instead of being dropped from the map.
pub async fn global_pin_info_cid(cid: Cid, dests: &[PeerId], hub: &RpcHub) -> GlobalPinInfo {
    let cid_for_calls = cid.clone();
    let replies = multi_rpc(dests, hub, move |client| {
        let cid = cid_for_calls.clone();
        async move { client.tracker_status(cid).await }
    })
    .await;

    let mut global = GlobalPinInfo::new(cid.clone());
    for (pid, result) in replies {
        let info = match result {
            Ok(info) => normalize_reply(&cid, pid, info),
            Err(e) => PinInfo::cluster_error(cid.clone(), pid, e.to_string()),
        };
        global.peer_map.insert(pid, info);
    }
    global
}

/// Every pinned CID in the cluster-owned set, merged across the roster
/// (spec.md §4.C: `globalPinInfoSlice`). Broadcasts `tracker_status_all`
/// once per destination rather than `tracker_status` once per CID per
/// destination, then merges each destination's list by CID.
pub async fn global_pin_info_slice(cids: &[Cid], dests: &[PeerId], hub: &RpcHub) -> Vec<GlobalPinInfo> {
    let replies = multi_rpc(dests, hub, |client| async move { client.tracker_status_all().await }).await;

    let mut by_cid: HashMap<Cid, GlobalPinInfo> = cids.iter().map(|cid| (cid.clone(), GlobalPinInfo::new(cid.clone()))).collect();

    for (pid, result) in replies {
        match result {
            Ok(infos) => {
                let mut reported: HashMap<Cid, PinInfo> = infos.into_iter().map(|info| (info.cid.clone(), info)).collect();
                for cid in cids {
                    let info = match reported.remove(cid) {
                        Some(info) => normalize_reply(cid, pid, info),
                        None => PinInfo::new(cid.clone(), pid, PinStatus::Unpinned),
                    };
                    if let Some(global) = by_cid.get_mut(cid) {
                        global.peer_map.insert(pid, info);
                    }
                }
            }
            Err(e) => {
                for cid in cids {
                    if let Some(global) = by_cid.get_mut(cid) {
                        global.peer_map.insert(pid, PinInfo::cluster_error(cid.clone(), pid, e.to_string()));
                    }
                }
            }
        }
    }

    cids.iter()
        .map(|cid| by_cid.remove(cid).unwrap_or_else(|| GlobalPinInfo::new(cid.clone())))
        .collect()
}
