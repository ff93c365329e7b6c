//! `stats` subcommand.

use std::sync::Arc;

use bike_recovery_cli_utils::{MultiProgress, request_spinner};
use bike_recovery_http::ApiConfig;
use bike_recovery_theft::aggregate::map_points;
use bike_recovery_theft::controller::{ControllerState, FilterController, Snapshot};
use bike_recovery_theft::fetcher::HttpTheftFetcher;
use bike_recovery_theft::models::{FilterState, GroupBy, StatusFilter, YearFilter};

/// Options for one `stats` invocation.
#[allow(clippy::struct_excessive_bools)]
pub struct StatsArgs {
    pub status: StatusFilter,
    pub year: YearFilter,
    pub limit: u32,
    pub top: usize,
    pub group_by: GroupBy,
    pub points: bool,
    pub local_filter: bool,
    pub json: bool,
}

/// Fetches the filtered records and prints their statistics.
pub async fn run(
    multi: &MultiProgress,
    config: ApiConfig,
    args: &StatsArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = Arc::new(HttpTheftFetcher::new(config)?);
    let mut controller = FilterController::new(source)
        .with_grouping(args.group_by, args.top)
        .with_local_narrowing(args.local_filter);

    let filter = FilterState::default()
        .with_status(args.status)
        .with_year(args.year)
        .with_limit(args.limit);

    let spinner = request_spinner(multi, "Fetching theft data");
    let state = controller.refresh(filter).await;
    spinner.finish_and_clear();

    let snapshot = match state {
        ControllerState::Ready(snapshot) => snapshot,
        ControllerState::Failed { error, .. } => return Err(error.clone().into()),
        ControllerState::Idle | ControllerState::Loading { .. } => {
            return Err("theft data request did not complete".into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.stats)?);
    } else {
        print_stats(snapshot, args.group_by);
    }

    if args.points {
        for point in map_points(&snapshot.records) {
            println!("{:>10.5} {:>10.5}  {}", point.lat, point.lng, point.title);
        }
    }

    Ok(())
}

fn print_stats(snapshot: &Snapshot, group_by: GroupBy) {
    let stats = &snapshot.stats;
    println!(
        "Status: {}  Year: {}  Limit: {}",
        snapshot.filter.status, snapshot.filter.year, snapshot.filter.limit
    );
    println!();
    println!("Total incidents: {}", stats.total);
    println!("Recovered:       {}", stats.recovered_count);
    println!("Not recovered:   {}", stats.not_recovered_count);
    println!("Recovery rate:   {:.1}%", stats.recovery_rate_percent);

    if stats.top_groups.is_empty() {
        return;
    }

    println!();
    println!("Top {} by {group_by}:", stats.top_groups.len());
    for (rank, group) in stats.top_groups.iter().enumerate() {
        println!("{:>3}. {:<40} {}", rank + 1, group.key, group.count);
    }
}
