//! CloudStack control-plane client.
//!
//! Handlers only see the [`CloudStackApi`] trait; the HTTP implementation
//! lives in [`http`]. Each handler receives its client explicitly.

pub mod http;
mod signature;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::sensitive::Sensitive;

pub use http::HttpClient;

/// A NIC attached to a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    pub id: String,
    #[serde(rename = "networkid")]
    pub network_id: String,
    #[serde(rename = "ipaddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(rename = "isdefault", default)]
    pub is_default: bool,
}

/// A virtual machine and the NICs attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "nic", default)]
    pub nics: Vec<Nic>,
}

/// Parameters for attaching a new NIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddNicParams {
    pub network_id: String,
    pub virtual_machine_id: String,
    /// Static IP to request; the network assigns one if absent.
    pub ip_address: Option<String>,
}

impl AddNicParams {
    pub fn new(network_id: impl Into<String>, virtual_machine_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            virtual_machine_id: virtual_machine_id.into(),
            ip_address: None,
        }
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }
}

/// Configuration blob of a managed Kubernetes cluster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KubernetesClusterConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "configdata", default)]
    pub config_data: Sensitive<String>,
}

/// Operations the handlers need from the CloudStack control plane.
///
/// NIC mutations are async jobs on the CloudStack side; implementations
/// return once the job has finished.
#[async_trait]
pub trait CloudStackApi: Send + Sync {
    /// List all NICs attached to a virtual machine.
    async fn list_nics(&self, virtual_machine_id: &str) -> Result<Vec<Nic>, ApiError>;

    /// Attach a NIC; returns the virtual machine with its updated NIC list.
    async fn add_nic_to_virtual_machine(
        &self,
        params: &AddNicParams,
    ) -> Result<VirtualMachine, ApiError>;

    /// Detach a NIC from a virtual machine.
    async fn remove_nic_from_virtual_machine(
        &self,
        nic_id: &str,
        virtual_machine_id: &str,
    ) -> Result<VirtualMachine, ApiError>;

    /// Make `nic_id` the default NIC of the virtual machine.
    async fn update_default_nic_for_virtual_machine(
        &self,
        nic_id: &str,
        virtual_machine_id: &str,
    ) -> Result<VirtualMachine, ApiError>;

    /// Fetch a virtual machine. A zero-count lookup is [`ApiError::NotFound`].
    async fn get_virtual_machine_by_id(&self, id: &str) -> Result<VirtualMachine, ApiError>;

    /// Fetch the configuration of a Kubernetes cluster; `None` if the
    /// control plane returned an empty result.
    async fn get_kubernetes_cluster_config(
        &self,
        cluster_id: &str,
    ) -> Result<Option<KubernetesClusterConfig>, ApiError>;
}
