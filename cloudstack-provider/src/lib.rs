pub mod client;
pub mod config;
pub mod error;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod sensitive;

pub use client::{CloudStackApi, HttpClient};
pub use config::ProviderConfig;
pub use error::{ApiError, ProviderError};
pub use resources::{
    ClusterConfigQuery, ClusterConfigState, DataSource, KubernetesClusterConfigSource, Resource,
    UniqueNic, UniqueNicConfig, UniqueNicState,
};
pub use sensitive::Sensitive;
