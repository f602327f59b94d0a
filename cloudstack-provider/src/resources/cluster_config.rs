//! Kubernetes cluster config data source - fetches the kubeconfig of a managed cluster.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DataSource;
use crate::client::CloudStackApi;
use crate::error::{ProviderError, Result};
use crate::sensitive::Sensitive;

/// Lookup key of the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfigQuery {
    pub id: String,
}

/// Output of the data source. `config_data` is a kubeconfig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfigState {
    pub id: String,
    pub name: String,
    pub config_data: Sensitive<String>,
}

/// Handler for the Kubernetes cluster config data source.
pub struct KubernetesClusterConfigSource {
    client: Arc<dyn CloudStackApi>,
}

impl KubernetesClusterConfigSource {
    pub fn new(client: Arc<dyn CloudStackApi>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for KubernetesClusterConfigSource {
    type Query = ClusterConfigQuery;
    type Output = ClusterConfigState;

    async fn read(&self, query: &Self::Query) -> Result<Self::Output> {
        let config = self
            .client
            .get_kubernetes_cluster_config(&query.id)
            .await
            .map_err(ProviderError::RemoteFetch)?
            .ok_or_else(|| {
                ProviderError::not_found(format!("cluster config not found for ID {}", query.id))
            })?;

        debug!(cluster = %config.name, id = %config.id, "Found Kubernetes cluster config");

        Ok(ClusterConfigState {
            id: config.id,
            name: config.name,
            config_data: config.config_data,
        })
    }
}
