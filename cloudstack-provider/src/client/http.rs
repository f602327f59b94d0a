//! HTTP implementation of [`CloudStackApi`] against the CloudStack REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use super::signature::{canonical_query, sign};
use super::{AddNicParams, CloudStackApi, KubernetesClusterConfig, Nic, VirtualMachine};
use crate::config::ProviderConfig;
use crate::error::{ApiError, ProviderError};

/// Interval between `queryAsyncJobResult` polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Async job states reported by `queryAsyncJobResult`.
const JOB_PENDING: u64 = 0;
const JOB_SUCCEEDED: u64 = 1;
const JOB_FAILED: u64 = 2;

/// Signed CloudStack API client.
pub struct HttpClient {
    http: reqwest::Client,
    config: ProviderConfig,
    poll_interval: Duration,
}

impl HttpClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| ProviderError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Issue a signed API call and return the body of its `<command>response` object.
    async fn request(&self, command: &str, params: &[(&str, &str)]) -> Result<Value, ApiError> {
        let mut all: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        all.push(("command".into(), command.into()));
        all.push(("apiKey".into(), self.config.api_key.clone()));
        all.push(("response".into(), "json".into()));

        let query = canonical_query(&all);
        let signature = sign(&query, &self.config.secret_key);
        let url = format!(
            "{}?{}&signature={}",
            self.config.api_url,
            query,
            urlencoding::encode(&signature)
        );

        debug!(command = %command, "Calling CloudStack API");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        let envelope = parsed.as_ref().and_then(|v| response_body(v, command));

        if let Some(err) = envelope.and_then(api_error) {
            return Err(err);
        }

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        match envelope {
            Some(v) => Ok(v.clone()),
            None => Err(ApiError::decode(format!(
                "{} returned no response object",
                command
            ))),
        }
    }

    /// Issue an async command and wait for its job to finish.
    async fn request_async(&self, command: &str, params: &[(&str, &str)]) -> Result<Value, ApiError> {
        let started = self.request(command, params).await?;
        let job_id = started
            .get("jobid")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::decode(format!("{} returned no jobid", command)))?
            .to_string();

        let deadline = Instant::now() + self.config.timeout;

        loop {
            let job = self
                .request("queryAsyncJobResult", &[("jobid", job_id.as_str())])
                .await?;

            match job.get("jobstatus").and_then(Value::as_u64) {
                Some(JOB_SUCCEEDED) => {
                    debug!(command = %command, job_id = %job_id, "Async job finished");
                    return Ok(job.get("jobresult").cloned().unwrap_or(Value::Null));
                }
                Some(JOB_FAILED) => {
                    let result = job.get("jobresult").cloned().unwrap_or(Value::Null);
                    return Err(api_error(&result).unwrap_or_else(|| {
                        ApiError::api(
                            job.get("jobresultcode")
                                .and_then(Value::as_u64)
                                .unwrap_or(530) as u32,
                            format!("async job {} failed", job_id),
                        )
                    }));
                }
                Some(JOB_PENDING) | None => {}
                Some(other) => {
                    return Err(ApiError::decode(format!(
                        "unknown job status {} for job {}",
                        other, job_id
                    )));
                }
            }

            if Instant::now() >= deadline {
                return Err(ApiError::JobTimeout { job_id });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn virtual_machine_job(
        &self,
        command: &str,
        params: &[(&str, &str)],
    ) -> Result<VirtualMachine, ApiError> {
        let result = self.request_async(command, params).await?;
        field(&result, "virtualmachine")
    }
}

/// Locate the `<command>response` object, falling back to the only
/// top-level object for commands whose envelope is named differently.
fn response_body<'a>(body: &'a Value, command: &str) -> Option<&'a Value> {
    let obj = body.as_object()?;
    let key = format!("{}response", command.to_lowercase());
    obj.get(&key).or_else(|| {
        if obj.len() == 1 {
            obj.values().next()
        } else {
            None
        }
    })
}

/// Extract `errorcode`/`errortext` from a response or job result.
fn api_error(value: &Value) -> Option<ApiError> {
    let code = value.get("errorcode").and_then(Value::as_u64)?;
    let text = value
        .get("errortext")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(ApiError::api(code as u32, text))
}

fn field<T: DeserializeOwned>(value: &Value, name: &str) -> Result<T, ApiError> {
    let raw = value
        .get(name)
        .cloned()
        .ok_or_else(|| ApiError::decode(format!("missing field {}", name)))?;
    serde_json::from_value(raw).map_err(|e| ApiError::decode(format!("invalid {}: {}", name, e)))
}

fn list<T: DeserializeOwned>(value: &Value, name: &str) -> Result<Vec<T>, ApiError> {
    match value.get(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(_) => field(value, name),
    }
}

#[async_trait]
impl CloudStackApi for HttpClient {
    async fn list_nics(&self, virtual_machine_id: &str) -> Result<Vec<Nic>, ApiError> {
        let body = self
            .request("listNics", &[("virtualmachineid", virtual_machine_id)])
            .await?;
        list(&body, "nic")
    }

    async fn add_nic_to_virtual_machine(
        &self,
        params: &AddNicParams,
    ) -> Result<VirtualMachine, ApiError> {
        let mut args = vec![
            ("networkid", params.network_id.as_str()),
            ("virtualmachineid", params.virtual_machine_id.as_str()),
        ];
        if let Some(ip) = params.ip_address.as_deref() {
            args.push(("ipaddress", ip));
        }
        self.virtual_machine_job("addNicToVirtualMachine", &args)
            .await
    }

    async fn remove_nic_from_virtual_machine(
        &self,
        nic_id: &str,
        virtual_machine_id: &str,
    ) -> Result<VirtualMachine, ApiError> {
        self.virtual_machine_job(
            "removeNicFromVirtualMachine",
            &[("nicid", nic_id), ("virtualmachineid", virtual_machine_id)],
        )
        .await
    }

    async fn update_default_nic_for_virtual_machine(
        &self,
        nic_id: &str,
        virtual_machine_id: &str,
    ) -> Result<VirtualMachine, ApiError> {
        self.virtual_machine_job(
            "updateDefaultNicForVirtualMachine",
            &[("nicid", nic_id), ("virtualmachineid", virtual_machine_id)],
        )
        .await
    }

    async fn get_virtual_machine_by_id(&self, id: &str) -> Result<VirtualMachine, ApiError> {
        // An unknown or expunged id is reported as an invalid parameter.
        let body = self
            .request("listVirtualMachines", &[("id", id), ("listall", "true")])
            .await
            .map_err(|e| {
                if e.is_entity_missing(id) {
                    ApiError::NotFound(id.to_string())
                } else {
                    e
                }
            })?;
        let mut vms: Vec<VirtualMachine> = list(&body, "virtualmachine")?;
        match vms.len() {
            0 => Err(ApiError::NotFound(id.to_string())),
            1 => Ok(vms.remove(0)),
            n => Err(ApiError::decode(format!(
                "found {} virtual machines for id {}",
                n, id
            ))),
        }
    }

    async fn get_kubernetes_cluster_config(
        &self,
        cluster_id: &str,
    ) -> Result<Option<KubernetesClusterConfig>, ApiError> {
        let body = self
            .request("getKubernetesClusterConfig", &[("id", cluster_id)])
            .await?;
        match body.get("clusterconfig") {
            None | Some(Value::Null) => Ok(None),
            Some(v) if v.as_object().is_some_and(|o| o.is_empty()) => Ok(None),
            Some(_) => field(&body, "clusterconfig").map(Some),
        }
    }
}
