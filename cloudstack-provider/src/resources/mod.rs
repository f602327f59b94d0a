//! Resource and data source handlers.
//!
//! Each handler translates declarative configuration into CloudStack API
//! calls and reflects the responses back as state.

pub mod cluster_config;
pub mod unique_nic;

use async_trait::async_trait;

use crate::error::Result;

pub use cluster_config::{ClusterConfigQuery, ClusterConfigState, KubernetesClusterConfigSource};
pub use unique_nic::{UniqueNic, UniqueNicConfig, UniqueNicState};

/// A managed resource with create/read/delete semantics.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Declarative input.
    type Config;
    /// Persisted state.
    type State;

    /// Bring the resource into existence and return its state.
    async fn create(&self, config: &Self::Config) -> Result<Self::State>;

    /// Refresh state. `None` means the resource is gone and should be recreated.
    async fn read(&self, state: &Self::State) -> Result<Option<Self::State>>;

    /// Remove the resource. Deleting something already gone succeeds.
    async fn delete(&self, state: &Self::State) -> Result<()>;
}

/// A read-only lookup.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Query;
    type Output;

    async fn read(&self, query: &Self::Query) -> Result<Self::Output>;
}
