//! Progress reporting for loading the option lists of a model variant.
//!
//! [`MappingCache::load_variant`](crate::cache::MappingCache::load_variant)
//! reports every table as it settles, so a front end can show which
//! dropdowns are ready while the rest are still in flight.

use bike_recovery_mapping_models::ModelSchema;

use crate::MappingLoadError;

/// Observer of a multi-table option load.
///
/// Implementations must be `Send + Sync` since tables settle on whichever
/// task polls them.
pub trait LoadProgress: Send + Sync {
    /// Called once before any table is requested, with the number of
    /// categorical fields in `schema`.
    fn started(&self, schema: &ModelSchema, tables: usize);

    /// The table backing `field` loaded with `options` entries.
    fn loaded(&self, field: &str, options: usize);

    /// A table failed to load.
    fn failed(&self, error: &MappingLoadError);

    /// Every table has settled.
    fn finished(&self, loaded: usize, failed: usize);
}

/// Ignores every update.
pub struct Silent;

impl LoadProgress for Silent {
    fn started(&self, _schema: &ModelSchema, _tables: usize) {}
    fn loaded(&self, _field: &str, _options: usize) {}
    fn failed(&self, _error: &MappingLoadError) {}
    fn finished(&self, _loaded: usize, _failed: usize) {}
}
