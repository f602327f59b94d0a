//! In-memory control plane for handler tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AddNicParams, CloudStackApi, KubernetesClusterConfig, Nic, VirtualMachine};
use crate::error::ApiError;

/// A recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListNics(String),
    AddNic(AddNicParams),
    RemoveNic { nic_id: String, vm_id: String },
    UpdateDefaultNic { nic_id: String, vm_id: String },
    GetVirtualMachine(String),
    GetClusterConfig(String),
}

#[derive(Default)]
struct Inner {
    vms: HashMap<String, VirtualMachine>,
    clusters: HashMap<String, KubernetesClusterConfig>,
    calls: Vec<Call>,
    next_id: u32,
    list_errors: VecDeque<ApiError>,
    add_errors: VecDeque<ApiError>,
    remove_errors: VecDeque<ApiError>,
    update_errors: VecDeque<ApiError>,
    get_vm_errors: VecDeque<ApiError>,
    cluster_errors: VecDeque<ApiError>,
    /// Attach succeeds but the response omits the new NIC.
    drop_attached_nic: bool,
    /// Upcoming attaches that add the NIC but report a job timeout.
    timed_out_attaches: u32,
}

/// Fake CloudStack holding virtual machines and cluster configs in memory.
#[derive(Default)]
pub struct FakeCloudStack {
    inner: Mutex<Inner>,
}

impl FakeCloudStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vm(&self, vm_id: &str, nics: &[(&str, &str)]) {
        let mut inner = self.inner.lock().unwrap();
        let nics = nics
            .iter()
            .enumerate()
            .map(|(i, (id, network_id))| Nic {
                id: id.to_string(),
                network_id: network_id.to_string(),
                ip_address: Some(format!("10.0.{}.10", i)),
                is_default: i == 0,
            })
            .collect();
        inner.vms.insert(
            vm_id.to_string(),
            VirtualMachine {
                id: vm_id.to_string(),
                name: format!("{}-name", vm_id),
                nics,
            },
        );
    }

    pub fn add_cluster(&self, id: &str, name: &str, config_data: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.clusters.insert(
            id.to_string(),
            KubernetesClusterConfig {
                id: id.to_string(),
                name: name.to_string(),
                config_data: config_data.to_string().into(),
            },
        );
    }

    pub fn nics(&self, vm_id: &str) -> Vec<Nic> {
        let inner = self.inner.lock().unwrap();
        inner
            .vms
            .get(vm_id)
            .map(|vm| vm.nics.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn fail_list(&self, err: ApiError) {
        self.inner.lock().unwrap().list_errors.push_back(err);
    }

    pub fn fail_add(&self, err: ApiError) {
        self.inner.lock().unwrap().add_errors.push_back(err);
    }

    pub fn fail_remove(&self, err: ApiError) {
        self.inner.lock().unwrap().remove_errors.push_back(err);
    }

    pub fn fail_update(&self, err: ApiError) {
        self.inner.lock().unwrap().update_errors.push_back(err);
    }

    pub fn fail_get_vm(&self, err: ApiError) {
        self.inner.lock().unwrap().get_vm_errors.push_back(err);
    }

    pub fn fail_cluster(&self, err: ApiError) {
        self.inner.lock().unwrap().cluster_errors.push_back(err);
    }

    pub fn drop_attached_nic(&self) {
        self.inner.lock().unwrap().drop_attached_nic = true;
    }

    pub fn time_out_attach(&self) {
        self.inner.lock().unwrap().timed_out_attaches += 1;
    }
}

fn missing_entity(id: &str) -> ApiError {
    ApiError::api(
        431,
        format!(
            "Invalid parameter id value={} due to incorrect long value format, \
             or entity does not exist or due to incorrect parameter annotation \
             for the field in api cmd class.",
            id
        ),
    )
}

#[async_trait]
impl CloudStackApi for FakeCloudStack {
    async fn list_nics(&self, virtual_machine_id: &str) -> Result<Vec<Nic>, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::ListNics(virtual_machine_id.to_string()));
        if let Some(err) = inner.list_errors.pop_front() {
            return Err(err);
        }
        inner
            .vms
            .get(virtual_machine_id)
            .map(|vm| vm.nics.clone())
            .ok_or_else(|| missing_entity(virtual_machine_id))
    }

    async fn add_nic_to_virtual_machine(
        &self,
        params: &AddNicParams,
    ) -> Result<VirtualMachine, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::AddNic(params.clone()));
        if let Some(err) = inner.add_errors.pop_front() {
            return Err(err);
        }
        inner.next_id += 1;
        let nic = Nic {
            id: format!("nic-new-{}", inner.next_id),
            network_id: params.network_id.clone(),
            ip_address: Some(
                params
                    .ip_address
                    .clone()
                    .unwrap_or_else(|| "10.1.0.100".to_string()),
            ),
            is_default: false,
        };
        let drop_nic = inner.drop_attached_nic;
        let vm = inner
            .vms
            .get_mut(&params.virtual_machine_id)
            .ok_or_else(|| missing_entity(&params.virtual_machine_id))?;
        vm.nics.push(nic);
        let mut response = vm.clone();
        if inner.timed_out_attaches > 0 {
            inner.timed_out_attaches -= 1;
            return Err(ApiError::JobTimeout {
                job_id: format!("job-{}", inner.next_id),
            });
        }
        if drop_nic {
            response.nics.retain(|n| n.network_id != params.network_id);
        }
        Ok(response)
    }

    async fn remove_nic_from_virtual_machine(
        &self,
        nic_id: &str,
        virtual_machine_id: &str,
    ) -> Result<VirtualMachine, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::RemoveNic {
            nic_id: nic_id.to_string(),
            vm_id: virtual_machine_id.to_string(),
        });
        if let Some(err) = inner.remove_errors.pop_front() {
            return Err(err);
        }
        let vm = inner
            .vms
            .get_mut(virtual_machine_id)
            .ok_or_else(|| missing_entity(virtual_machine_id))?;
        let before = vm.nics.len();
        vm.nics.retain(|n| n.id != nic_id);
        if vm.nics.len() == before {
            return Err(missing_entity(nic_id));
        }
        Ok(vm.clone())
    }

    async fn update_default_nic_for_virtual_machine(
        &self,
        nic_id: &str,
        virtual_machine_id: &str,
    ) -> Result<VirtualMachine, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::UpdateDefaultNic {
            nic_id: nic_id.to_string(),
            vm_id: virtual_machine_id.to_string(),
        });
        if let Some(err) = inner.update_errors.pop_front() {
            return Err(err);
        }
        let vm = inner
            .vms
            .get_mut(virtual_machine_id)
            .ok_or_else(|| missing_entity(virtual_machine_id))?;
        if !vm.nics.iter().any(|n| n.id == nic_id) {
            return Err(missing_entity(nic_id));
        }
        for nic in vm.nics.iter_mut() {
            nic.is_default = nic.id == nic_id;
        }
        Ok(vm.clone())
    }

    async fn get_virtual_machine_by_id(&self, id: &str) -> Result<VirtualMachine, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::GetVirtualMachine(id.to_string()));
        if let Some(err) = inner.get_vm_errors.pop_front() {
            return Err(err);
        }
        inner
            .vms
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn get_kubernetes_cluster_config(
        &self,
        cluster_id: &str,
    ) -> Result<Option<KubernetesClusterConfig>, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::GetClusterConfig(cluster_id.to_string()));
        if let Some(err) = inner.cluster_errors.pop_front() {
            return Err(err);
        }
        Ok(inner.clusters.get(cluster_id).cloned())
    }
}
