//! HTTP theft record fetcher.
//!
//! Issues `GET {api}/api/theft-data` with the filter's query parameters.
//! Non-success responses carry a JSON `{ "error": ... }` body when the
//! backend produced them; otherwise the status reason is used.

use async_trait::async_trait;
use bike_recovery_http::{ApiConfig, retry};
use bike_recovery_theft_models::{FilterState, TheftRecord};
use serde::Deserialize;

use crate::parsing::decode_theft_data;
use crate::{TheftDataSource, TheftFetchError};

/// Path of the theft-data endpoint, relative to the API base URL.
pub const THEFT_DATA_PATH: &str = "/api/theft-data";

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Fetches theft records from the prediction API.
#[derive(Debug, Clone)]
pub struct HttpTheftFetcher {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpTheftFetcher {
    /// Creates a fetcher for the given config.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: config.build_client()?,
            config,
        })
    }
}

#[async_trait]
impl TheftDataSource for HttpTheftFetcher {
    async fn fetch(&self, filter: &FilterState) -> Result<Vec<TheftRecord>, TheftFetchError> {
        let url = self.config.api_url(THEFT_DATA_PATH);
        let params = filter.query_params();

        log::debug!("Fetching theft data from {url} with {params:?}");

        let response = retry::send_with_retry(
            || self.client.get(&url).query(&params),
            self.config.max_retries,
        )
        .await
        .map_err(|e| TheftFetchError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TheftFetchError::Network(e.to_string()))?;

        let records = decode_response(status, &body)?;
        log::info!("Fetched {} theft records", records.len());
        Ok(records)
    }
}

/// Interprets a theft-data response: non-success statuses become
/// [`TheftFetchError::Fetch`], anything else is decoded as records.
fn decode_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<Vec<TheftRecord>, TheftFetchError> {
    if !status.is_success() {
        return Err(TheftFetchError::Fetch {
            http_status: status.as_u16(),
            message: error_message(status, body),
        });
    }
    decode_theft_data(body)
}

/// Extracts the server's error message from a failure body, falling back
/// to the status reason.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        },
        |b| b.error,
    )
}
