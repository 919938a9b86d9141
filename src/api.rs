//! External API collaborator contract (spec.md §6: API).
//!
//! The HTTP/other external API surface is out of scope for this crate
//! (spec.md §1 Non-goals: "does not define the external API's wire
//! format"); only the lifecycle contract the orchestrator depends on is
//! defined here.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ClusterResult;
use crate::rpc::ClusterRpc;

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn shutdown(&self) -> ClusterResult<()>;

    /// Inject the RPC client this collaborator can use to reach the
    /// cluster (spec.md §6, §4.F step 5).
    async fn set_client(&self, client: Arc<dyn ClusterRpc>);
}

/// An API surface with nothing listening — used when the embedder runs
/// its own external API process and does not need this crate to manage
/// one.
#[derive(Default)]
pub struct NoopApi {
    client: RwLock<Option<Arc<dyn ClusterRpc>>>,
}

#[async_trait]
impl ClusterApi for NoopApi {
    async fn shutdown(&self) -> ClusterResult<()> {
        Ok(())
    }

    async fn set_client(&self, client: Arc<dyn ClusterRpc>) {
        *self.client.write().await = Some(client);
    }
}
