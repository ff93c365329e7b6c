//! Process-wide cache of loaded mapping tables.
//!
//! Entries are keyed by `(variant, field)`. Option sets are variant
//! specific even when field names coincide, so a `NEIGHBOURHOOD_140` table
//! loaded for `v1` is not reused for `v2`.
//!
//! Concurrent requests for the same key share one in-flight load. Failed
//! loads are never cached. Invalidating a variant bumps its epoch so that
//! loads still in flight for it complete as
//! [`MappingLoadErrorKind::Superseded`] instead of repopulating the cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bike_recovery_mapping_models::{FieldSchema, MappingEntry, ModelSchema, ModelVariant};
use futures::future::{BoxFuture, FutureExt as _, Shared, join_all};

use crate::loader::load_mapping;
use crate::progress::LoadProgress;
use crate::{MappingFetcher, MappingLoadError, MappingLoadErrorKind, MappingLookup};

/// An immutable, cheaply cloneable list of loaded entries.
pub type MappingList = Arc<[MappingEntry]>;

type LoadResult = Result<MappingList, MappingLoadError>;

type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheKey {
    variant: ModelVariant,
    field: String,
}

enum Slot {
    Ready(MappingList),
    Loading { id: u64, load: SharedLoad },
}

#[derive(Default)]
struct CacheState {
    slots: BTreeMap<CacheKey, Slot>,
    epochs: BTreeMap<ModelVariant, u64>,
    next_load_id: u64,
}

impl CacheState {
    fn epoch(&self, variant: &ModelVariant) -> u64 {
        self.epochs.get(variant).copied().unwrap_or(0)
    }

    fn bump_epoch(&mut self, variant: &ModelVariant) {
        *self.epochs.entry(variant.clone()).or_insert(0) += 1;
    }
}

/// Keyed store of mapping tables with request coalescing.
pub struct MappingCache {
    fetcher: Arc<dyn MappingFetcher>,
    state: Mutex<CacheState>,
}

impl MappingCache {
    /// Creates an empty cache that loads through `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn MappingFetcher>) -> Self {
        Self {
            fetcher,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the entries for `field` under `variant`, loading them on a
    /// miss.
    ///
    /// A caller that arrives while the same key is loading awaits that
    /// load rather than issuing another.
    ///
    /// # Errors
    ///
    /// Returns [`MappingLoadError`] if the load fails, the field is not
    /// categorical, or the variant was invalidated before the load
    /// finished.
    pub async fn get(&self, field: &FieldSchema, variant: &ModelVariant) -> LoadResult {
        let key = CacheKey {
            variant: variant.clone(),
            field: field.name.clone(),
        };

        let (load, load_id, epoch) = {
            let mut state = self.lock();
            let epoch = state.epoch(variant);

            match state.slots.get(&key) {
                Some(Slot::Ready(entries)) => return Ok(Arc::clone(entries)),
                Some(Slot::Loading { id, load }) => {
                    log::debug!("Joining in-flight load for {} ({variant})", field.name);
                    (load.clone(), *id, epoch)
                }
                None => {
                    let source = field.mapping_source().ok_or_else(|| {
                        MappingLoadError::new(&field.name, MappingLoadErrorKind::NotCategorical)
                    })?;
                    let id = state.next_load_id;
                    state.next_load_id += 1;

                    let load = self.start_load(&field.name, source);
                    state.slots.insert(
                        key.clone(),
                        Slot::Loading {
                            id,
                            load: load.clone(),
                        },
                    );
                    (load, id, epoch)
                }
            }
        };

        let result = load.await;

        let mut state = self.lock();

        if state.epoch(variant) != epoch {
            log::debug!("Discarding {} load for invalidated {variant}", field.name);
            return Err(MappingLoadError::new(
                &field.name,
                MappingLoadErrorKind::Superseded,
            ));
        }

        let owns_slot = matches!(
            state.slots.get(&key),
            Some(Slot::Loading { id, .. }) if *id == load_id
        );
        if owns_slot {
            match &result {
                Ok(entries) => {
                    state.slots.insert(key, Slot::Ready(Arc::clone(entries)));
                }
                Err(e) => {
                    log::error!("{e}");
                    state.slots.remove(&key);
                }
            }
        }

        result
    }

    fn start_load(&self, field: &str, source: String) -> SharedLoad {
        let fetcher = Arc::clone(&self.fetcher);
        let field = field.to_string();

        async move {
            load_mapping(fetcher.as_ref(), &field, &source)
                .await
                .map(MappingList::from)
        }
        .boxed()
        .shared()
    }

    /// Returns already-loaded entries without triggering a load.
    #[must_use]
    pub fn peek(&self, field: &str, variant: &ModelVariant) -> Option<MappingList> {
        let key = CacheKey {
            variant: variant.clone(),
            field: field.to_string(),
        };
        match self.lock().slots.get(&key) {
            Some(Slot::Ready(entries)) => Some(Arc::clone(entries)),
            _ => None,
        }
    }

    /// Drops every entry for `variant` and orphans its in-flight loads.
    pub fn invalidate(&self, variant: &ModelVariant) {
        let mut state = self.lock();
        state.bump_epoch(variant);

        let before = state.slots.len();
        state.slots.retain(|key, _| &key.variant != variant);
        log::debug!(
            "Invalidated {} mapping entries for {variant}",
            before - state.slots.len()
        );
    }

    /// Drops every entry for every variant.
    pub fn clear(&self) {
        let mut state = self.lock();
        let variants: Vec<ModelVariant> = state
            .slots
            .keys()
            .map(|key| key.variant.clone())
            .chain(state.epochs.keys().cloned())
            .collect();
        for variant in &variants {
            state.bump_epoch(variant);
        }
        state.slots.clear();
    }

    /// Loads every categorical field of `schema` concurrently.
    ///
    /// A field that fails to load is reported in
    /// [`VariantOptions::failures`] without affecting the others.
    pub async fn load_variant(
        &self,
        schema: &ModelSchema,
        progress: &dyn LoadProgress,
    ) -> VariantOptions {
        let fields: Vec<&FieldSchema> = schema.categorical_fields().collect();
        progress.started(schema, fields.len());

        let loads = fields.iter().map(|field| async move {
            let result = self.get(field, &schema.variant).await;
            match &result {
                Ok(entries) => progress.loaded(&field.name, entries.len()),
                Err(e) => progress.failed(e),
            }
            (field.name.clone(), result)
        });

        let mut options = BTreeMap::new();
        let mut failures = Vec::new();

        for (name, result) in join_all(loads).await {
            match result {
                Ok(entries) => {
                    options.insert(name, entries);
                }
                Err(e) => failures.push(e),
            }
        }

        progress.finished(options.len(), failures.len());

        VariantOptions {
            variant: schema.variant.clone(),
            options,
            failures,
        }
    }
}

/// Option lists loaded for one variant.
#[derive(Debug, Clone)]
pub struct VariantOptions {
    /// The variant these options belong to.
    pub variant: ModelVariant,
    /// Loaded entries by field name.
    pub options: BTreeMap<String, MappingList>,
    /// Fields whose tables failed to load.
    pub failures: Vec<MappingLoadError>,
}

impl VariantOptions {
    /// Returns `true` if every categorical field loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl MappingLookup for VariantOptions {
    fn entries(&self, field: &str) -> Option<&[MappingEntry]> {
        self.options.get(field).map(|entries| &entries[..])
    }

    fn variant(&self) -> Option<&ModelVariant> {
        Some(&self.variant)
    }
}
