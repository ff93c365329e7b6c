#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API endpoint configuration and HTTP retry helpers.
//!
//! Every component that talks to the prediction backend or the mapping
//! file host builds its [`reqwest::Client`] from an [`ApiConfig`] and sends
//! requests through [`retry::send_with_retry`].

pub mod retry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::time::Duration;

/// Default prediction/session API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";

/// Default base URL the mapping CSV files are served from.
pub const DEFAULT_MAPPING_BASE_URL: &str = "http://localhost:3000/data";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_MAX_RETRIES: u32 = 2;

/// Endpoints and transport settings shared by all HTTP collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL of the prediction/theft-data API.
    pub api_base_url: String,
    /// Base URL the `mapping_*.csv` files are resolved against.
    pub mapping_base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Retries for transient failures (connect errors, timeouts, 429, 5xx).
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            mapping_base_url: DEFAULT_MAPPING_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ApiConfig {
    /// Builds a config from the environment.
    ///
    /// Reads `BIKE_RECOVERY_API_URL`, `BIKE_RECOVERY_MAPPING_URL`,
    /// `BIKE_RECOVERY_TIMEOUT_SECS` and `BIKE_RECOVERY_MAX_RETRIES`. Absent
    /// or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_base_url = lookup("BIKE_RECOVERY_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.api_base_url);
        let mapping_base_url = lookup("BIKE_RECOVERY_MAPPING_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.mapping_base_url);
        let request_timeout = lookup("BIKE_RECOVERY_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(defaults.request_timeout, Duration::from_secs);
        let max_retries = lookup("BIKE_RECOVERY_MAX_RETRIES")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        Self {
            api_base_url,
            mapping_base_url,
            request_timeout,
            max_retries,
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: &str) -> Self {
        url.clone_into(&mut self.api_base_url);
        self
    }

    /// Overrides the mapping base URL.
    #[must_use]
    pub fn with_mapping_base_url(mut self, url: &str) -> Self {
        url.clone_into(&mut self.mapping_base_url);
        self
    }

    /// Sets the number of retries for transient failures.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Joins `path` onto the API base URL.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        join_url(&self.api_base_url, path)
    }

    /// Joins a mapping source identifier onto the mapping base URL.
    #[must_use]
    pub fn mapping_url(&self, source: &str) -> String {
        join_url(&self.mapping_base_url, source)
    }

    /// Builds a [`reqwest::Client`] with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the TLS backend cannot be initialized.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_doubled_slashes() {
        let config = ApiConfig::default().with_api_base_url("http://api.test/");
        assert_eq!(
            config.api_url("/api/theft-data"),
            "http://api.test/api/theft-data"
        );
        assert_eq!(
            config.mapping_url("mapping_DIVISION.csv"),
            "http://localhost:3000/data/mapping_DIVISION.csv"
        );
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ApiConfig::from_lookup(|key| match key {
            "BIKE_RECOVERY_API_URL" => Some("http://predictor:8000".to_string()),
            "BIKE_RECOVERY_TIMEOUT_SECS" => Some("5".to_string()),
            "BIKE_RECOVERY_MAX_RETRIES" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://predictor:8000");
        assert_eq!(config.mapping_base_url, DEFAULT_MAPPING_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let config = ApiConfig::from_lookup(|key| {
            (key == "BIKE_RECOVERY_MAPPING_URL").then(|| "   ".to_string())
        });
        assert_eq!(config, ApiConfig::default());
    }
}
