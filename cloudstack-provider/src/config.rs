//! Provider configuration: where the CloudStack API lives and how to sign requests.

use std::fmt;
use std::time::Duration;

use crate::error::{ProviderError, Result};

/// Default upper bound for waiting on async jobs (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;

/// Connection settings for the CloudStack API.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API endpoint, e.g. `https://cloud.example.com/client/api`
    pub api_url: String,
    pub api_key: String,
    pub secret_key: String,
    /// How long to wait for async jobs before giving up.
    pub timeout: Duration,
    /// Verify TLS certificates of the API endpoint.
    pub verify_ssl: bool,
}

impl ProviderConfig {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_ssl: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// Check that the configuration can be used to build a client.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(ProviderError::config("api_url is required"));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ProviderError::config(format!(
                "api_url must be an http(s) URL, got {}",
                self.api_url
            )));
        }
        if self.api_key.is_empty() {
            return Err(ProviderError::config("api_key is required"));
        }
        if self.secret_key.is_empty() {
            return Err(ProviderError::config("secret_key is required"));
        }
        if self.timeout.is_zero() {
            return Err(ProviderError::config("timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key)
            .field("secret_key", &crate::sensitive::REDACTED)
            .field("timeout", &self.timeout)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}
