//! Cluster configuration and builder (spec.md §6: recognized options).
//!
//! Constructing and validating a [`ClusterConfig`] is in scope; loading one
//! from a file or environment is an external collaborator's job (spec.md
//! §2 Non-goals).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};
use crate::identity::MultiAddr;

/// Configuration for a single cluster peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// 32-byte Ed25519 seed for this peer's identity. `None` generates a
    /// fresh random keypair on startup.
    pub private_key: Option<[u8; 32]>,

    /// Address to bind for cluster RPC.
    pub cluster_addr: std::net::SocketAddr,

    /// Authoritative initial peer list. Non-empty disables bootstrap.
    pub cluster_peers: Vec<MultiAddr>,

    /// Fallback entry points, tried in order, when `cluster_peers` is
    /// empty.
    pub bootstrap: Vec<MultiAddr>,

    /// Durable log location for the consensus engine.
    pub consensus_data_folder: PathBuf,

    /// Reconciler tick period.
    pub state_sync_interval: Duration,

    /// Emit `LogRmPeer(self)` before exiting.
    pub leave_on_shutdown: bool,

    /// Deadline for consensus to report readiness during startup.
    pub consensus_ready_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            cluster_addr: "127.0.0.1:9096".parse().expect("valid default address"),
            cluster_peers: Vec::new(),
            bootstrap: Vec::new(),
            consensus_data_folder: PathBuf::from("./data/cluster"),
            state_sync_interval: Duration::from_secs(60),
            leave_on_shutdown: false,
            consensus_ready_timeout: Duration::from_secs(30),
        }
    }
}

impl ClusterConfig {
    #[must_use]
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Validate the configuration (spec.md §7: `ConfigError`).
    pub fn validate(&self) -> ClusterResult<()> {
        if self.state_sync_interval.is_zero() {
            return Err(ClusterError::ConfigError(
                "state_sync_interval must be greater than zero".into(),
            ));
        }

        if !self.cluster_peers.is_empty() && !self.bootstrap.is_empty() {
            // Not a hard error, but bootstrap is ignored in that case per
            // spec.md §4.D — keep this visible instead of silently
            // dropping the operator's configuration.
            tracing::warn!(
                "both cluster_peers and bootstrap are set; bootstrap will be ignored"
            );
        }

        Ok(())
    }
}

/// Builder for [`ClusterConfig`] (teacher's `ClusterConfigBuilder` idiom).
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    #[must_use]
    pub fn private_key(mut self, seed: [u8; 32]) -> Self {
        self.config.private_key = Some(seed);
        self
    }

    #[must_use]
    pub fn cluster_addr(mut self, addr: std::net::SocketAddr) -> Self {
        self.config.cluster_addr = addr;
        self
    }

    #[must_use]
    pub fn cluster_peers(mut self, peers: Vec<MultiAddr>) -> Self {
        self.config.cluster_peers = peers;
        self
    }

    #[must_use]
    pub fn bootstrap(mut self, peers: Vec<MultiAddr>) -> Self {
        self.config.bootstrap = peers;
        self
    }

    #[must_use]
    pub fn consensus_data_folder(mut self, path: PathBuf) -> Self {
        self.config.consensus_data_folder = path;
        self
    }

    #[must_use]
    pub fn state_sync_interval(mut self, interval: Duration) -> Self {
        self.config.state_sync_interval = interval;
        self
    }

    #[must_use]
    pub fn leave_on_shutdown(mut self, leave: bool) -> Self {
        self.config.leave_on_shutdown = leave;
        self
    }

    #[must_use]
    pub fn consensus_ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.consensus_ready_timeout = timeout;
        self
    }

    pub fn build(self) -> ClusterResult<ClusterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClusterConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_state_sync_interval_rejected() {
        let result = ClusterConfig::builder()
            .state_sync_interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let config = ClusterConfig::builder()
            .cluster_addr("127.0.0.1:9001".parse().unwrap())
            .leave_on_shutdown(true)
            .build()
            .unwrap();

        assert!(config.leave_on_shutdown);
        assert_eq!(config.cluster_addr.port(), 9001);
    }
}
