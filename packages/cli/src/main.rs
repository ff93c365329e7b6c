#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the bike recovery predictor.
//!
//! Loads categorical options for a model variant, inspects schemas,
//! aggregates theft statistics, and submits predictions.
//!
//! Uses `indicatif-log-bridge` (via [`bike_recovery_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod options;
mod predict;
mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use bike_recovery_http::ApiConfig;
use bike_recovery_mapping::MappingFetcher;
use bike_recovery_mapping::loader::{DirMappingFetcher, HttpMappingFetcher};
use bike_recovery_theft::models::{GroupBy, StatusFilter, YearFilter};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bike_recovery", about = "Bicycle theft recovery predictor")]
struct Cli {
    /// Prediction API base URL (overrides `BIKE_RECOVERY_API_URL`)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Base URL mapping CSVs are fetched from (overrides
    /// `BIKE_RECOVERY_MAPPING_URL`)
    #[arg(long, global = true)]
    mapping_url: Option<String>,
    /// Read mapping CSVs from this directory instead of over HTTP
    #[arg(long, global = true)]
    mapping_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and print the categorical options of a model variant
    Options {
        /// Model variant (e.g., "v1")
        variant: String,
    },
    /// Print the fields and validation rules of a model variant
    Schema {
        /// Model variant (e.g., "v1")
        variant: String,
    },
    /// Fetch theft records and print aggregate statistics
    Stats {
        /// Recovery status: all, recovered, or `not_recovered`
        #[arg(long, default_value = "all", value_parser = parse_status)]
        status: StatusFilter,
        /// Occurrence year, or "all"
        #[arg(long, default_value = "all")]
        year: YearFilter,
        /// Maximum number of records to fetch
        #[arg(long, default_value_t = bike_recovery_theft::models::DEFAULT_LIMIT)]
        limit: u32,
        /// Number of groups to rank
        #[arg(long, default_value_t = bike_recovery_theft::aggregate::DEFAULT_TOP_N)]
        top: usize,
        /// Grouping key: neighbourhood, division, `premises_type`,
        /// `bike_type`, `bike_make`, or `bike_colour`
        #[arg(long, default_value = "neighbourhood", value_parser = parse_group_by)]
        group_by: GroupBy,
        /// Also print one line per plottable record
        #[arg(long)]
        points: bool,
        /// Apply the filter locally (for backends that ignore query
        /// parameters)
        #[arg(long)]
        local_filter: bool,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate field values and submit a prediction
    Predict {
        /// Model variant (e.g., "v1")
        variant: String,
        /// Field values as FIELD=VALUE (categorical fields accept the
        /// encoded value or the option label)
        #[arg(value_name = "FIELD=VALUE")]
        values: Vec<String>,
    },
}

fn parse_status(s: &str) -> Result<StatusFilter, String> {
    s.parse()
        .map_err(|_| format!("invalid status '{s}': expected all, recovered, or not_recovered"))
}

fn parse_group_by(s: &str) -> Result<GroupBy, String> {
    s.parse().map_err(|_| format!("invalid grouping '{s}'"))
}

impl Cli {
    fn api_config(&self) -> ApiConfig {
        let mut config = ApiConfig::from_env();
        if let Some(url) = &self.api_url {
            config = config.with_api_base_url(url);
        }
        if let Some(url) = &self.mapping_url {
            config = config.with_mapping_base_url(url);
        }
        config
    }

    fn mapping_fetcher(
        &self,
        config: &ApiConfig,
    ) -> Result<Arc<dyn MappingFetcher>, Box<dyn std::error::Error>> {
        Ok(match &self.mapping_dir {
            Some(dir) => Arc::new(DirMappingFetcher::new(dir.clone())),
            None => Arc::new(HttpMappingFetcher::new(config.clone())?),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = bike_recovery_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = cli.api_config();

    match &cli.command {
        Commands::Options { variant } => {
            let fetcher = cli.mapping_fetcher(&config)?;
            options::print_options(&multi, fetcher, variant).await?;
        }
        Commands::Schema { variant } => options::print_schema(variant)?,
        Commands::Stats {
            status,
            year,
            limit,
            top,
            group_by,
            points,
            local_filter,
            json,
        } => {
            let args = stats::StatsArgs {
                status: *status,
                year: *year,
                limit: *limit,
                top: *top,
                group_by: *group_by,
                points: *points,
                local_filter: *local_filter,
                json: *json,
            };
            stats::run(&multi, config, &args).await?;
        }
        Commands::Predict { variant, values } => {
            let fetcher = cli.mapping_fetcher(&config)?;
            predict::run(&multi, config, fetcher, variant, values).await?;
        }
    }

    Ok(())
}
