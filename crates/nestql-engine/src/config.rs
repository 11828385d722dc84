//! Engine configuration.

use nestql_common::utils::error::{Error, Result};
use nestql_core::middleware::StageSettings;
use serde::Deserialize;
use std::time::Duration;

/// Where an action failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// The first failure, in declaration order, fails the whole request.
    #[default]
    Request,
    /// The failing node is nulled and a located error is recorded; siblings
    /// still populate.
    Field,
}

/// Engine configuration.
///
/// Loadable from JSON; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum actions dispatched concurrently within one phase.
    pub max_concurrency: usize,

    /// Deadline applied to requests that arrive without one, in milliseconds.
    pub request_timeout_ms: Option<u64>,

    /// Error locality.
    pub error_policy: ErrorPolicy,

    /// Largest accepted `page_size`.
    pub max_page_size: u64,

    /// `page_size` of paginated reads that do not specify one.
    pub default_page_size: u64,

    /// Largest accepted serialized write payload, in bytes.
    pub max_data_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        let stages = StageSettings::default();
        Self {
            max_concurrency: 16,
            request_timeout_ms: None,
            error_policy: ErrorPolicy::Request,
            max_page_size: stages.max_page_size,
            default_page_size: stages.default_page_size,
            max_data_length: stages.max_data_length,
        }
    }
}

impl Config {
    /// Reads a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or inconsistent.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Internal(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the limits are usable.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first inconsistent setting.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Internal(
                "invalid configuration: max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_page_size == 0 || self.default_page_size == 0 {
            return Err(Error::Internal(
                "invalid configuration: page sizes must be at least 1".to_string(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(Error::Internal(
                "invalid configuration: default_page_size exceeds max_page_size".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the concurrency bound.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the default request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Sets the error policy.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Sets the largest accepted page size.
    #[must_use]
    pub fn with_max_page_size(mut self, size: u64) -> Self {
        self.max_page_size = size;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub fn with_default_page_size(mut self, size: u64) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the write payload limit.
    #[must_use]
    pub fn with_max_data_length(mut self, length: usize) -> Self {
        self.max_data_length = length;
        self
    }

    /// Default request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Limits for the per-command stages.
    #[must_use]
    pub fn stage_settings(&self) -> StageSettings {
        StageSettings {
            max_page_size: self.max_page_size,
            default_page_size: self.default_page_size,
            max_data_length: self.max_data_length,
        }
    }
}
