//! Aggregation engine.
//!
//! Every function here is pure and deterministic for a given input
//! sequence. Group ranking uses a stable sort, so groups with equal counts
//! keep the order in which they were first seen.

use std::collections::BTreeMap;

use bike_recovery_theft_models::{
    AggregateStats, FilterState, GroupBy, GroupCount, MapPoint, MarkerIcon, TheftRecord,
    UNKNOWN_GROUP,
};

/// Number of groups kept by [`aggregate`].
pub const DEFAULT_TOP_N: usize = 5;

/// Aggregates `records`, grouping by neighbourhood and keeping the top
/// [`DEFAULT_TOP_N`] groups.
#[must_use]
pub fn aggregate(records: &[TheftRecord]) -> AggregateStats {
    aggregate_by(records, GroupBy::Neighbourhood, DEFAULT_TOP_N)
}

/// Aggregates `records`, grouping by `group_by` and keeping the `top_n`
/// largest groups.
#[must_use]
pub fn aggregate_by(records: &[TheftRecord], group_by: GroupBy, top_n: usize) -> AggregateStats {
    let total = records.len();
    let recovered_count = records.iter().filter(|r| r.recovered).count();

    AggregateStats {
        total,
        recovered_count,
        not_recovered_count: total - recovered_count,
        recovery_rate_percent: recovery_rate_percent(recovered_count, total),
        top_groups: top_groups(records, group_by, top_n),
    }
}

/// Returns `recovered / total * 100` rounded to one decimal place, or `0`
/// for an empty set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recovery_rate_percent(recovered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(recovered as f64 / total as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Counts records per group and returns the `top_n` largest groups,
/// descending by count with ties in first-seen order.
#[must_use]
pub fn top_groups(records: &[TheftRecord], group_by: GroupBy, top_n: usize) -> Vec<GroupCount> {
    let mut groups: Vec<GroupCount> = Vec::new();
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();

    for record in records {
        let key = group_by.key_of(record);
        if let Some(&position) = positions.get(key) {
            groups[position].count += 1;
        } else {
            positions.insert(key, groups.len());
            groups.push(GroupCount {
                key: key.to_string(),
                count: 1,
            });
        }
    }

    // `sort_by` is stable, which preserves first-seen order among ties.
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    groups.truncate(top_n);
    groups
}

/// Narrows `records` to those matching `filter`'s status and year,
/// keeping at most `filter.limit` in input order.
///
/// Applying this to a set the backend already filtered is a no-op.
#[must_use]
pub fn filter_records(records: &[TheftRecord], filter: &FilterState) -> Vec<TheftRecord> {
    records
        .iter()
        .filter(|r| filter.matches(r))
        .take(usize::try_from(filter.limit).unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Reduces `records` to plottable points.
#[must_use]
pub fn map_points(records: &[TheftRecord]) -> Vec<MapPoint> {
    records
        .iter()
        .map(|record| {
            let icon = if record.recovered {
                MarkerIcon::Recovered
            } else {
                MarkerIcon::NotRecovered
            };
            let bike_type = record.bike_type.as_deref().unwrap_or(UNKNOWN_GROUP);
            let division = record.division.as_deref().unwrap_or(UNKNOWN_GROUP);

            MapPoint {
                lat: record.lat,
                lng: record.lng,
                icon,
                title: format!("{bike_type} bike - {} - {division}", icon.label()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use bike_recovery_theft_models::{RecordId, StatusFilter, YearFilter};

    use super::*;

    fn record(id: i64, recovered: bool, neighbourhood: Option<&str>) -> TheftRecord {
        TheftRecord {
            id: RecordId::Int(id),
            lat: 43.65,
            lng: -79.38,
            recovered,
            occ_year: Some(2020),
            neighbourhood: neighbourhood.map(str::to_string),
            bike_make: None,
            bike_type: Some("RG".to_string()),
            bike_colour: None,
            bike_cost: None,
            division: Some("D14".to_string()),
            premises_type: None,
        }
    }

    fn in_neighbourhoods(names: &[&str]) -> Vec<TheftRecord> {
        names
            .iter()
            .zip(0..)
            .map(|(name, id)| record(id, false, Some(name)))
            .collect()
    }

    #[test]
    fn empty_input_yields_zeroed_stats() {
        assert_eq!(aggregate(&[]), AggregateStats::default());
        let stats = aggregate(&[]);
        assert_eq!(stats.total, 0);
        assert!(stats.recovery_rate_percent.abs() < f64::EPSILON);
        assert!(stats.top_groups.is_empty());
    }

    #[test]
    fn seven_of_ten_recovered_is_seventy_percent() {
        let records: Vec<TheftRecord> = (0..10).map(|i| record(i, i < 7, Some("A"))).collect();
        let stats = aggregate(&records);
        assert_eq!(stats.total, 10);
        assert_eq!(stats.recovered_count, 7);
        assert_eq!(stats.not_recovered_count, 3);
        assert!((stats.recovery_rate_percent - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert!((recovery_rate_percent(1, 3) - 33.3).abs() < 1e-9);
        assert!((recovery_rate_percent(2, 3) - 66.7).abs() < 1e-9);
    }

    #[test]
    fn top_groups_rank_by_count() {
        let records = in_neighbourhoods(&["A", "A", "A", "B", "B", "C"]);
        let stats = aggregate_by(&records, GroupBy::Neighbourhood, 2);
        assert_eq!(
            stats.top_groups,
            vec![
                GroupCount {
                    key: "A".to_string(),
                    count: 3
                },
                GroupCount {
                    key: "B".to_string(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let records = in_neighbourhoods(&["C", "B", "A", "B", "C", "A", "D"]);
        let keys: Vec<String> = top_groups(&records, GroupBy::Neighbourhood, 5)
            .into_iter()
            .map(|g| g.key)
            .collect();
        assert_eq!(keys, ["C", "B", "A", "D"]);
    }

    #[test]
    fn missing_group_key_is_unknown() {
        let records = vec![record(1, true, None), record(2, false, Some(" "))];
        let groups = top_groups(&records, GroupBy::Neighbourhood, 5);
        assert_eq!(
            groups,
            vec![GroupCount {
                key: UNKNOWN_GROUP.to_string(),
                count: 2
            }]
        );
    }

    #[test]
    fn counts_do_not_depend_on_order() {
        let mut records = in_neighbourhoods(&["A", "B", "A", "C"]);
        records[1].recovered = true;
        let forward = aggregate(&records);
        records.reverse();
        let backward = aggregate(&records);
        assert_eq!(forward.total, backward.total);
        assert_eq!(forward.recovered_count, backward.recovered_count);
        assert_eq!(forward.top_groups[0], backward.top_groups[0]);
    }

    #[test]
    fn filter_records_applies_status_year_and_limit() {
        let mut records: Vec<TheftRecord> = (0..6).map(|i| record(i, i % 2 == 0, None)).collect();
        records[0].occ_year = Some(2019);

        let filter = FilterState::default()
            .with_status(StatusFilter::Recovered)
            .with_year(YearFilter::Year(2020))
            .with_limit(1);
        let narrowed = filter_records(&records, &filter);
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].id, RecordId::Int(2));

        assert_eq!(filter_records(&narrowed, &filter), narrowed);
    }

    #[test]
    fn map_points_carry_icon_and_title() {
        let points = map_points(&[record(1, true, None), record(2, false, None)]);
        assert_eq!(points[0].icon, MarkerIcon::Recovered);
        assert_eq!(points[0].title, "RG bike - Recovered - D14");
        assert_eq!(points[1].title, "RG bike - Not Recovered - D14");
    }
}
