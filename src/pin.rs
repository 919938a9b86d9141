//! Pin-related data model: CIDs, per-peer pin state, and the
//! cluster-wide aggregated view (spec.md §3: PinInfo, GlobalPinInfo).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;

/// An opaque content-addressed identifier.
///
/// Treated as an opaque string throughout the orchestrator — no multihash
/// decoding or validation is performed (out of scope; see SPEC_FULL.md).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cid(String);

impl Cid {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cid {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for Cid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-(peer, CID) pin status (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinStatus {
    Unpinned,
    Pinning,
    Pinned,
    Unpinning,
    PinError,
    UnpinError,
    /// Synthesized by the broadcast engine for an unreachable or buggy
    /// peer; never produced by a tracker directly.
    ClusterError,
    Bug,
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unpinned => "unpinned",
            Self::Pinning => "pinning",
            Self::Pinned => "pinned",
            Self::Unpinning => "unpinning",
            Self::PinError => "pin_error",
            Self::UnpinError => "unpin_error",
            Self::ClusterError => "cluster_error",
            Self::Bug => "bug",
        };
        write!(f, "{s}")
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Per-(peer, CID) record (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinInfo {
    pub cid: Cid,
    pub peer_id: PeerId,
    pub status: PinStatus,
    pub timestamp_ms: i64,
    pub error: Option<String>,
}

impl PinInfo {
    #[must_use]
    pub fn new(cid: Cid, peer_id: PeerId, status: PinStatus) -> Self {
        Self {
            cid,
            peer_id,
            status,
            timestamp_ms: now_ms(),
            error: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Build a synthesized `ClusterError` entry for a peer that failed to
    /// reply to a broadcast query (spec.md §4.C).
    #[must_use]
    pub fn cluster_error(cid: Cid, peer_id: PeerId, error: impl Into<String>) -> Self {
        Self {
            cid,
            peer_id,
            status: PinStatus::ClusterError,
            timestamp_ms: now_ms(),
            error: Some(error.into()),
        }
    }
}

/// CID plus a per-peer view, one entry per current cluster member
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalPinInfo {
    pub cid: Cid,
    pub peer_map: HashMap<PeerId, PinInfo>,
}

impl GlobalPinInfo {
    #[must_use]
    pub fn new(cid: Cid) -> Self {
        Self {
            cid,
            peer_map: HashMap::new(),
        }
    }
}

/// The underlying block-store daemon's own self-description
/// (spec.md §3: ID, embedded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonId {
    pub id: String,
    pub addresses: Vec<String>,
    pub agent_version: String,
}

/// Self-description of a peer (spec.md §3: ID).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Id {
    pub peer_id: PeerId,
    pub public_key: [u8; 32],
    pub addresses: Vec<String>,
    pub cluster_peers: Vec<String>,
    pub version: String,
    pub rpc_protocol_version: String,
    pub daemon_id: Option<DaemonId>,
    pub error: Option<String>,
}

impl Id {
    /// Build an `Id` record that only carries the error — used by
    /// `Peers()` when a member fails to reply (spec.md §4.G).
    #[must_use]
    pub fn errored(peer_id: PeerId, error: impl Into<String>) -> Self {
        Self {
            peer_id,
            public_key: [0u8; 32],
            addresses: Vec::new(),
            cluster_peers: Vec::new(),
            version: String::new(),
            rpc_protocol_version: String::new(),
            daemon_id: None,
            error: Some(error.into()),
        }
    }
}
