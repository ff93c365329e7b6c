//! Filter controller.
//!
//! Owns the current [`FilterState`] and the state machine
//! `Idle -> Loading -> (Ready | Failed)`. Every call to
//! [`FilterController::request`] bumps a generation counter and returns a
//! [`FetchTicket`] stamped with it; [`FilterController::apply`] accepts a
//! result only if its ticket still carries the latest generation, so
//! responses take effect in dispatch order rather than completion order.
//!
//! [`spawn_filter_controller`] runs a controller on a tokio task and
//! publishes each state change on a `watch` channel.

use std::sync::Arc;

use bike_recovery_theft_models::{AggregateStats, FilterState, GroupBy, TheftRecord};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt as _};
use tokio::sync::{mpsc, watch};

use crate::aggregate::{DEFAULT_TOP_N, aggregate_by, filter_records};
use crate::{TheftDataSource, TheftFetchError};

/// Records and statistics for one successfully applied filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The filter the records were fetched for.
    pub filter: FilterState,
    /// The fetched records.
    pub records: Vec<TheftRecord>,
    /// Statistics derived from `records`.
    pub stats: AggregateStats,
}

/// Controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ControllerState {
    /// No filter has been requested yet.
    #[default]
    Idle,
    /// A fetch for `filter` is outstanding.
    Loading {
        /// The filter being fetched.
        filter: FilterState,
        /// The last successfully applied snapshot, still on display.
        previous: Option<Arc<Snapshot>>,
    },
    /// The latest fetch succeeded.
    Ready(Arc<Snapshot>),
    /// The latest fetch failed.
    Failed {
        /// The filter whose fetch failed.
        filter: FilterState,
        /// Why it failed.
        error: TheftFetchError,
        /// The last successfully applied snapshot, still on display.
        previous: Option<Arc<Snapshot>>,
    },
}

impl ControllerState {
    /// Returns the snapshot that should be on display: the current one if
    /// ready, otherwise the last good one.
    #[must_use]
    pub fn displayed(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Self::Idle => None,
            Self::Ready(snapshot) => Some(snapshot),
            Self::Loading { previous, .. } | Self::Failed { previous, .. } => previous.as_ref(),
        }
    }

    /// Returns the filter most recently requested, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&FilterState> {
        match self {
            Self::Idle => None,
            Self::Ready(snapshot) => Some(&snapshot.filter),
            Self::Loading { filter, .. } | Self::Failed { filter, .. } => Some(filter),
        }
    }
}

/// A dispatched fetch, stamped with the generation it was requested
/// under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    filter: FilterState,
}

impl FetchTicket {
    /// Generation this ticket was issued under.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Filter this ticket fetches.
    #[must_use]
    pub const fn filter(&self) -> &FilterState {
        &self.filter
    }
}

/// What [`FilterController::apply`] did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The result belonged to the latest request and changed the state.
    Applied,
    /// A newer request was issued since; the result was discarded.
    Stale,
}

/// State machine sequencing theft record fetches for filter changes.
pub struct FilterController {
    source: Arc<dyn TheftDataSource>,
    generation: u64,
    group_by: GroupBy,
    top_n: usize,
    local_narrowing: bool,
    state: ControllerState,
}

impl FilterController {
    /// Creates an idle controller reading from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn TheftDataSource>) -> Self {
        Self {
            source,
            generation: 0,
            group_by: GroupBy::default(),
            top_n: DEFAULT_TOP_N,
            local_narrowing: false,
            state: ControllerState::Idle,
        }
    }

    /// Sets the grouping used for top-N statistics.
    #[must_use]
    pub const fn with_grouping(mut self, group_by: GroupBy, top_n: usize) -> Self {
        self.group_by = group_by;
        self.top_n = top_n;
        self
    }

    /// Narrows fetched records by the filter locally before aggregating,
    /// for backends that ignore the query parameters.
    #[must_use]
    pub const fn with_local_narrowing(mut self, enabled: bool) -> Self {
        self.local_narrowing = enabled;
        self
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Returns the latest issued generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a request for `filter`. Any ticket issued before this one
    /// becomes stale.
    pub fn request(&mut self, filter: FilterState) -> FetchTicket {
        self.generation += 1;

        let previous = self.state.displayed().cloned();
        self.state = ControllerState::Loading { filter, previous };

        log::debug!("Requesting theft data (generation {}): {filter:?}", self.generation);

        FetchTicket {
            generation: self.generation,
            filter,
        }
    }

    /// Returns a future fetching the records for `ticket`. The future does
    /// not borrow the controller.
    #[must_use]
    pub fn fetch(
        &self,
        ticket: &FetchTicket,
    ) -> BoxFuture<'static, Result<Vec<TheftRecord>, TheftFetchError>> {
        let source = Arc::clone(&self.source);
        let filter = ticket.filter;
        Box::pin(async move { source.fetch(&filter).await })
    }

    /// Applies the result of the fetch for `ticket`.
    ///
    /// A failure keeps the previously displayed snapshot available through
    /// [`ControllerState::displayed`].
    pub fn apply(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<TheftRecord>, TheftFetchError>,
    ) -> ApplyOutcome {
        if ticket.generation != self.generation {
            log::warn!(
                "Discarding stale theft data (generation {}, latest {})",
                ticket.generation,
                self.generation
            );
            return ApplyOutcome::Stale;
        }

        let filter = ticket.filter;
        self.state = match result {
            Ok(records) => {
                let records = if self.local_narrowing {
                    filter_records(&records, &filter)
                } else {
                    records
                };
                let stats = aggregate_by(&records, self.group_by, self.top_n);
                log::info!(
                    "{} theft records, {}% recovered",
                    stats.total,
                    stats.recovery_rate_percent
                );
                ControllerState::Ready(Arc::new(Snapshot {
                    filter,
                    records,
                    stats,
                }))
            }
            Err(error) => {
                log::error!("Theft data fetch failed: {error}");
                ControllerState::Failed {
                    filter,
                    error,
                    previous: self.state.displayed().cloned(),
                }
            }
        };

        ApplyOutcome::Applied
    }

    /// Requests `filter`, awaits the fetch, and applies it.
    pub async fn refresh(&mut self, filter: FilterState) -> &ControllerState {
        let ticket = self.request(filter);
        let result = self.fetch(&ticket).await;
        self.apply(&ticket, result);
        &self.state
    }

    /// Moves the controller onto a tokio task and returns a handle for
    /// sending filter changes. `initial`, if given, is requested
    /// immediately.
    #[must_use]
    pub fn spawn(self, initial: Option<FilterState>) -> FilterControllerHandle {
        let (filter_tx, filter_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(self.state.clone());

        if let Some(filter) = initial {
            // The receiver is alive until `run` returns.
            let _ = filter_tx.send(filter);
        }

        tokio::spawn(run(self, filter_rx, state_tx));

        FilterControllerHandle {
            filters: filter_tx,
            state: state_rx,
        }
    }
}

/// Spawns a [`FilterController`] for `source` with default grouping.
#[must_use]
pub fn spawn_filter_controller(
    source: Arc<dyn TheftDataSource>,
    initial: FilterState,
) -> FilterControllerHandle {
    FilterController::new(source).spawn(Some(initial))
}

async fn run(
    mut controller: FilterController,
    mut filters: mpsc::UnboundedReceiver<FilterState>,
    state_tx: watch::Sender<ControllerState>,
) {
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            filter = filters.recv() => {
                let Some(filter) = filter else {
                    break;
                };
                let ticket = controller.request(filter);
                state_tx.send_replace(controller.state().clone());

                let fetch = controller.fetch(&ticket);
                in_flight.push(async move { (ticket, fetch.await) });
            }
            Some((ticket, result)) = in_flight.next(), if !in_flight.is_empty() => {
                if controller.apply(&ticket, result) == ApplyOutcome::Applied {
                    state_tx.send_replace(controller.state().clone());
                }
            }
        }
    }

    log::debug!("Filter controller stopped with {} fetches in flight", in_flight.len());
}

/// Handle to a spawned [`FilterController`]. Dropping it stops the task.
#[derive(Debug)]
pub struct FilterControllerHandle {
    filters: mpsc::UnboundedSender<FilterState>,
    state: watch::Receiver<ControllerState>,
}

impl FilterControllerHandle {
    /// Requests `filter`. Returns `false` if the controller task has
    /// stopped.
    pub fn set_filter(&self, filter: FilterState) -> bool {
        self.filters.send(filter).is_ok()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.clone()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state.borrow().clone()
    }
}
