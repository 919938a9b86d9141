//! Cluster error types and result definitions.

use std::time::Duration;

use thiserror::Error;

use crate::identity::PeerId;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Cluster-specific errors (spec.md §7).
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Bad address or identity at startup.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// `PeerRemove` on a peer not in the roster.
    #[error("{0} is not a peer")]
    NotAPeer(PeerId),

    /// Consensus log commit failed.
    #[error("consensus error: {0}")]
    ConsensusError(String),

    /// This node is not the current leader.
    #[error("not the leader, leader is {1:?}")]
    NotLeader(PeerId, Option<PeerId>),

    /// Per-destination RPC transport failure, captured in a broadcast
    /// error vector rather than surfaced directly.
    #[error("rpc error calling {peer}: {source}")]
    Rpc {
        peer: PeerId,
        #[source]
        source: RpcError,
    },

    /// A collaborator (tracker/connector/API) returned an error for a
    /// query; the partial result is still returned alongside this.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Bootstrap failure or consensus readiness timeout.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Bootstrap exhausted every configured address without success.
    #[error("bootstrap failed: all {0} bootstrap peers were unreachable")]
    BootstrapFailed(usize),

    /// Waited past the deadline for consensus readiness.
    #[error("timed out after {0:?} waiting for consensus readiness")]
    ReadyTimeout(Duration),

    /// The node is already shutting down or has shut down.
    #[error("cluster is shutting down")]
    ShuttingDown,

    /// Failed to bind the RPC server's listening socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-level failure from the RPC Surface.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("method not implemented by peer: {0}")]
    NotImplemented(String),
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => RpcError::Timeout,
            tonic::Code::Unimplemented => RpcError::NotImplemented(status.message().to_string()),
            tonic::Code::Unavailable => RpcError::Unreachable(status.message().to_string()),
            _ => RpcError::Transport(status.message().to_string()),
        }
    }
}

impl From<tonic::transport::Error> for ClusterError {
    fn from(err: tonic::transport::Error) -> Self {
        ClusterError::Rpc {
            peer: PeerId::zero(),
            source: RpcError::Transport(err.to_string()),
        }
    }
}
