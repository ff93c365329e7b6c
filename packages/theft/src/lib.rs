#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Theft record retrieval, aggregation, and filter control.
//!
//! The [`fetcher`] turns a [`FilterState`] into a query against the
//! theft-data endpoint, [`aggregate`] derives display statistics from the
//! returned records, and the [`controller`] sequences the two so that a
//! slow response to an old filter never overwrites a newer one.

pub mod aggregate;
pub mod controller;
pub mod fetcher;
pub mod parsing;

use async_trait::async_trait;
use bike_recovery_theft_models::{FilterState, TheftRecord};

pub use bike_recovery_theft_models as models;

/// Errors that can occur while retrieving theft records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TheftFetchError {
    /// The server answered with a non-success status.
    #[error("Theft data request failed with HTTP {http_status}: {message}")]
    Fetch {
        /// Numeric HTTP status code.
        http_status: u16,
        /// Server-supplied error message, or the status reason.
        message: String,
    },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The response body is not a theft-data document.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Source of theft records for a filter.
#[async_trait]
pub trait TheftDataSource: Send + Sync {
    /// Fetches the records selected by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`TheftFetchError`] if the records cannot be retrieved or
    /// decoded.
    async fn fetch(&self, filter: &FilterState) -> Result<Vec<TheftRecord>, TheftFetchError>;
}
