//! Unique NIC resource - keeps exactly one NIC per virtual machine on a network.
//!
//! Create lists the NICs of the VM and either promotes an existing NIC on the
//! target network to default and detaches every other NIC, or attaches a new
//! one. The list-then-act sequence is not atomic: a concurrent change to the
//! VM's NIC set between the listing and the follow-up calls can leave extra
//! NICs behind or fail a detach. CloudStack offers no lock to prevent this.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Resource;
use crate::client::{AddNicParams, CloudStackApi, Nic};
use crate::error::{ApiError, ProviderError, Result};
use crate::retry::{RetryConfig, RetryPolicy, retry_with_policy};

/// Declarative configuration of a unique NIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueNicConfig {
    pub network_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub virtual_machine_id: String,
}

/// Persisted state of a unique NIC; `id` is the NIC id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueNicState {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub virtual_machine_id: String,
}

/// Result of a NIC read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicObservation {
    pub network_id: String,
    pub ip_address: Option<String>,
    pub virtual_machine_id: String,
}

/// Handler for the unique NIC resource.
pub struct UniqueNic {
    client: Arc<dyn CloudStackApi>,
    retry: RetryConfig,
    policy: RetryPolicy,
}

impl UniqueNic {
    pub fn new(client: Arc<dyn CloudStackApi>) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
            policy: RetryPolicy::default(),
        }
    }

    /// Retry settings for the attach call.
    pub fn with_retry(mut self, retry: RetryConfig, policy: RetryPolicy) -> Self {
        self.retry = retry;
        self.policy = policy;
        self
    }

    /// Reconcile the VM so that it has exactly one NIC on `network_id`.
    ///
    /// Returns the id of that NIC.
    pub async fn reconcile(
        &self,
        network_id: &str,
        virtual_machine_id: &str,
        ip_address: Option<&str>,
    ) -> Result<String> {
        let nics = self
            .client
            .list_nics(virtual_machine_id)
            .await
            .map_err(|source| ProviderError::RemoteList {
                vm_id: virtual_machine_id.to_string(),
                source,
            })?;

        // Only the first NIC on the target network is kept; duplicates are
        // pruned along with NICs on other networks.
        match nics.iter().position(|n| n.network_id == network_id) {
            Some(idx) => {
                let mut others = nics;
                let nic = others.remove(idx);
                self.promote_and_prune(&nic, &others, network_id, virtual_machine_id)
                    .await?;
                Ok(nic.id)
            }
            None => self.attach(network_id, virtual_machine_id, ip_address).await,
        }
    }

    async fn promote_and_prune(
        &self,
        nic: &Nic,
        others: &[Nic],
        network_id: &str,
        virtual_machine_id: &str,
    ) -> Result<()> {
        info!(
            nic_id = %nic.id,
            network_id = %network_id,
            vm_id = %virtual_machine_id,
            "Setting existing NIC as default"
        );

        // The VM must never be left without a default NIC, so this goes first.
        self.client
            .update_default_nic_for_virtual_machine(&nic.id, virtual_machine_id)
            .await
            .map_err(|source| ProviderError::RemoteUpdate {
                network_id: network_id.to_string(),
                source,
            })?;

        for other in others {
            info!(
                nic_id = %other.id,
                network_id = %other.network_id,
                vm_id = %virtual_machine_id,
                "Removing extra NIC"
            );
            self.client
                .remove_nic_from_virtual_machine(&other.id, virtual_machine_id)
                .await
                .map_err(|source| ProviderError::RemoteDetach {
                    nic_id: other.id.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    async fn attach(
        &self,
        network_id: &str,
        virtual_machine_id: &str,
        ip_address: Option<&str>,
    ) -> Result<String> {
        let mut params = AddNicParams::new(network_id, virtual_machine_id);
        if let Some(ip) = ip_address {
            params = params.with_ip_address(ip);
        }

        info!(
            network_id = %network_id,
            vm_id = %virtual_machine_id,
            ip_address = ?ip_address,
            "Attaching new NIC"
        );

        let attempted = AtomicBool::new(false);
        let nic_id = retry_with_policy(&self.retry, &self.policy, "add_nic_to_virtual_machine", || {
            let retrying = attempted.swap(true, Ordering::Relaxed);
            let params = &params;
            async move {
                // A failed attempt may still have attached the NIC server side.
                if retrying {
                    let nics = self.client.list_nics(virtual_machine_id).await?;
                    if let Some(id) = nic_on_network(nics, network_id) {
                        info!(
                            nic_id = %id,
                            network_id = %network_id,
                            "NIC attached by an earlier attempt"
                        );
                        return Ok(Some(id));
                    }
                }
                let vm = self.client.add_nic_to_virtual_machine(params).await?;
                Ok::<_, ApiError>(nic_on_network(vm.nics, network_id))
            }
        })
        .await
        .map_err(ProviderError::RemoteAttach)?;

        nic_id.ok_or_else(|| ProviderError::NicNotFoundAfterAttach {
            network_id: network_id.to_string(),
        })
    }

    /// Look up a NIC on its VM. `None` if the VM or the NIC is gone.
    pub async fn observe(
        &self,
        nic_id: &str,
        virtual_machine_id: &str,
    ) -> Result<Option<NicObservation>> {
        let vm = match self.client.get_virtual_machine_by_id(virtual_machine_id).await {
            Ok(vm) => vm,
            Err(e) if e.is_not_found() => {
                debug!(vm_id = %virtual_machine_id, "Instance does no longer exist");
                return Ok(None);
            }
            Err(source) => {
                return Err(ProviderError::RemoteRead {
                    vm_id: virtual_machine_id.to_string(),
                    source,
                });
            }
        };

        match vm.nics.into_iter().find(|n| n.id == nic_id) {
            Some(nic) => Ok(Some(NicObservation {
                network_id: nic.network_id,
                ip_address: nic.ip_address,
                virtual_machine_id: vm.id,
            })),
            None => {
                debug!(nic_id = %nic_id, vm_id = %virtual_machine_id, "NIC does no longer exist");
                Ok(None)
            }
        }
    }

    /// Detach a NIC. A NIC the control plane no longer knows counts as deleted.
    pub async fn detach(&self, nic_id: &str, virtual_machine_id: &str) -> Result<()> {
        info!(nic_id = %nic_id, vm_id = %virtual_machine_id, "Removing NIC");

        match self
            .client
            .remove_nic_from_virtual_machine(nic_id, virtual_machine_id)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_entity_missing(nic_id) => {
                debug!(nic_id = %nic_id, "NIC already removed");
                Ok(())
            }
            Err(source) => Err(ProviderError::RemoteDetach {
                nic_id: nic_id.to_string(),
                source,
            }),
        }
    }
}

fn nic_on_network(nics: Vec<Nic>, network_id: &str) -> Option<String> {
    nics.into_iter()
        .find(|n| n.network_id == network_id)
        .map(|n| n.id)
}

#[async_trait]
impl Resource for UniqueNic {
    type Config = UniqueNicConfig;
    type State = UniqueNicState;

    async fn create(&self, config: &Self::Config) -> Result<Self::State> {
        let id = self
            .reconcile(
                &config.network_id,
                &config.virtual_machine_id,
                config.ip_address.as_deref(),
            )
            .await?;

        let observed = self
            .observe(&id, &config.virtual_machine_id)
            .await?
            .ok_or_else(|| {
                ProviderError::not_found(format!("NIC {} disappeared right after create", id))
            })?;

        Ok(UniqueNicState {
            id,
            network_id: observed.network_id,
            ip_address: observed.ip_address,
            virtual_machine_id: observed.virtual_machine_id,
        })
    }

    async fn read(&self, state: &Self::State) -> Result<Option<Self::State>> {
        Ok(self
            .observe(&state.id, &state.virtual_machine_id)
            .await?
            .map(|o| UniqueNicState {
                id: state.id.clone(),
                network_id: o.network_id,
                ip_address: o.ip_address,
                virtual_machine_id: o.virtual_machine_id,
            }))
    }

    async fn delete(&self, state: &Self::State) -> Result<()> {
        self.detach(&state.id, &state.virtual_machine_id).await
    }
}
