//! Error types for CloudStack API calls and provider handlers.

use thiserror::Error;

/// Errors reported by the CloudStack control-plane client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A lookup matched nothing (count == 0).
    #[error("No match found for {0}")]
    NotFound(String),

    /// CloudStack rejected the call or the async job failed.
    #[error("CloudStack API error {code}: {message}")]
    Api { code: u32, message: String },

    /// Non-success HTTP status without a CloudStack error body.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Async job did not finish within the configured timeout.
    #[error("timeout waiting for async job {job_id} to finish")]
    JobTimeout { job_id: String },
}

impl ApiError {
    pub fn api(code: u32, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// CloudStack error code, if the control plane returned one.
    pub fn error_code(&self) -> Option<u32> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this is the control plane's way of saying `id` no longer exists.
    ///
    /// CloudStack has no dedicated code for a missing entity; it reports the
    /// id as a malformed parameter.
    pub fn is_entity_missing(&self, id: &str) -> bool {
        let pattern = format!(
            "Invalid parameter id value={} due to incorrect long value format, \
             or entity does not exist",
            id
        );
        self.to_string().contains(&pattern)
    }
}

/// Errors returned by the resource and data source handlers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Error listing nics of virtual machine {vm_id}: {source}")]
    RemoteList {
        vm_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Error creating the new NIC: {0}")]
    RemoteAttach(#[source] ApiError),

    #[error("Error removing nic {nic_id}: {source}")]
    RemoteDetach {
        nic_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Error setting the nic with network id {network_id} as default: {source}")]
    RemoteUpdate {
        network_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Error reading virtual machine {vm_id}: {source}")]
    RemoteRead {
        vm_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not find NIC ID for network ID: {network_id}")]
    NicNotFoundAfterAttach { network_id: String },

    #[error("failed to get kubernetes cluster config: {0}")]
    RemoteFetch(#[source] ApiError),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
