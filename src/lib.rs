//! `pinmesh-cluster`: orchestrator for a replicated pin-management
//! cluster.
//!
//! Binds together a replicated-consensus engine, a local pin tracker, a
//! block-store connector and an external API behind one façade
//! ([`cluster::Cluster`]), and runs the membership protocol, broadcast
//! fan-out, and state reconciliation needed to keep them converged
//! across a cluster of peers.
//!
//! ```text
//!           +-----------------------------------------------------+
//!           |                    Cluster (façade)                 |
//!           |  pin/unpin/status/sync/recover/peers/id/shutdown     |
//!           +------+---------+-----------+-----------+------------+
//!                  |         |           |            |
//!           PeerManager  Membership  Broadcast    Lifecycle
//!                  |         |           |            |
//!                  +---------+-----+-----+------------+
//!                                  |
//!                           RpcClient / RpcHub
//!                         (local shortcut or tonic)
//!                                  |
//!          +----------+  +--------+-------+  +------------+  +------+
//!          |Consensus |  |   PinTracker   |  | Connector  |  | API  |
//!          +----------+  +----------------+  +------------+  +------+
//! ```

pub mod api;
pub mod broadcast;
pub mod cluster;
pub mod config;
pub mod connector;
pub mod consensus;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod membership;
pub mod metrics;
pub mod peer_manager;
pub mod pin;
pub mod reconciler;
pub mod rpc;
pub mod tracker;

pub use api::ClusterApi;
pub use cluster::Cluster;
pub use config::{ClusterConfig, ClusterConfigBuilder};
pub use connector::Connector;
pub use consensus::Consensus;
pub use error::{ClusterError, ClusterResult, RpcError};
pub use identity::{Keypair, MultiAddr, PeerId};
pub use metrics::{ClusterMetrics, ClusterMetricsSnapshot};
pub use peer_manager::PeerManager;
pub use pin::{Cid, DaemonId, GlobalPinInfo, Id, PinInfo, PinStatus};
pub use tracker::PinTracker;
