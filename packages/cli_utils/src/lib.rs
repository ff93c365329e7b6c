#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the bike recovery toolchain.
//!
//! Provides an `indicatif` bar that follows option-list loads through the
//! [`LoadProgress`] trait, a spinner for single requests, and
//! [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::time::Duration;

use bike_recovery_mapping::MappingLoadError;
use bike_recovery_mapping::models::ModelSchema;
use bike_recovery_mapping::progress::LoadProgress;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const TICK: Duration = Duration::from_millis(100);

/// An `indicatif` bar with one step per categorical field.
pub struct OptionsProgress {
    bar: ProgressBar,
}

impl OptionsProgress {
    /// Adds a bar to `multi`. It shows a spinner until the load starts and
    /// the number of tables is known.
    #[must_use]
    pub fn new(multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(TICK);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Loading options");
        Self { bar }
    }
}

impl LoadProgress for OptionsProgress {
    fn started(&self, schema: &ModelSchema, tables: usize) {
        self.bar.set_length(tables as u64);
        self.bar.set_position(0);
        self.bar.set_style(
            ProgressStyle::with_template(
                "  {msg} {wide_bar:.cyan/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        self.bar.set_message(format!("{} options", schema.name));
    }

    fn loaded(&self, field: &str, _options: usize) {
        self.bar.set_message(field.to_string());
        self.bar.inc(1);
    }

    fn failed(&self, error: &MappingLoadError) {
        self.bar.set_message(format!("{} failed", error.field));
        self.bar.inc(1);
    }

    fn finished(&self, loaded: usize, failed: usize) {
        let message = if failed == 0 {
            format!("{loaded} option lists loaded")
        } else {
            format!("{loaded} option lists loaded, {failed} failed")
        };
        self.bar.finish_with_message(message);
    }
}

/// Adds a spinner for a single request of unknown duration. Call
/// [`ProgressBar::finish_with_message`] once the response arrives.
#[must_use]
pub fn request_spinner(multi: &MultiProgress, message: &str) -> ProgressBar {
    let bar = multi.add(ProgressBar::new_spinner());
    bar.enable_steady_tick(TICK);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.yellow} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// log lines do not tear progress bars.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialized");
    }
    log::set_max_level(level);

    multi
}
