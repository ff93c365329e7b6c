#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Category mapping loader, model schema registry, and mapping cache.
//!
//! The [`registry`] declares which fields each model variant requires.
//! Categorical fields are backed by CSV encoding tables that the
//! [`loader`] fetches and parses into [`MappingEntry`] lists, and the
//! [`cache`] keeps loaded lists keyed by `(field, variant)` so that
//! concurrent requests for the same table share one network load.

pub mod cache;
pub mod loader;
pub mod progress;
pub mod registry;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bike_recovery_mapping_models::{MappingEntry, ModelVariant};

pub use bike_recovery_mapping_models as models;

/// Why a mapping table could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingLoadErrorKind {
    /// The request never produced a response.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("HTTP status {status}")]
    Status {
        /// Numeric HTTP status code.
        status: u16,
    },

    /// Reading a local mapping file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The content could not be tokenized or lacks a required column.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The table parsed but contained no usable rows.
    #[error("mapping source '{source_id}' contains no usable rows")]
    Empty {
        /// The mapping source identifier.
        source_id: String,
    },

    /// The field is numeric and has no mapping source.
    #[error("field is not categorical")]
    NotCategorical,

    /// The variant was invalidated while the load was in flight.
    #[error("load superseded by a model variant switch")]
    Superseded,
}

/// A mapping table failed to load, attributed to the field it backs.
///
/// Cloneable because one in-flight load is shared by every caller that
/// asked for the same `(field, variant)` key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to load mapping for {field}: {kind}")]
pub struct MappingLoadError {
    /// Name of the categorical field the table backs.
    pub field: String,
    /// What went wrong.
    pub kind: MappingLoadErrorKind,
}

impl MappingLoadError {
    /// Creates an error for `field`.
    #[must_use]
    pub fn new(field: &str, kind: MappingLoadErrorKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
        }
    }
}

/// Retrieves the raw text of a mapping source.
///
/// Implementations resolve the source identifier against their own
/// location (a base URL, a directory, an in-memory fixture).
#[async_trait]
pub trait MappingFetcher: Send + Sync {
    /// Fetches the raw CSV text for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingLoadErrorKind`] if the resource cannot be retrieved.
    async fn fetch(&self, source: &str) -> Result<String, MappingLoadErrorKind>;
}

/// Read access to loaded option lists, keyed by field name.
pub trait MappingLookup {
    /// Returns the loaded entries for `field`, if any.
    fn entries(&self, field: &str) -> Option<&[MappingEntry]>;

    /// Returns the variant the entries were loaded for, when known.
    fn variant(&self) -> Option<&ModelVariant> {
        None
    }
}

impl MappingLookup for BTreeMap<String, Vec<MappingEntry>> {
    fn entries(&self, field: &str) -> Option<&[MappingEntry]> {
        self.get(field).map(Vec::as_slice)
    }
}
