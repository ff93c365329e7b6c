#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bicycle theft incident records, query filters, and derived statistics.
//!
//! Records are immutable snapshots returned by the theft-data endpoint.
//! [`FilterState`] describes which records a query asks for, and
//! [`AggregateStats`] is what the aggregation engine derives from a record
//! set for display.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Group key substituted when a record has no value for the grouped field.
pub const UNKNOWN_GROUP: &str = "Unknown";

/// Default number of records requested per query.
pub const DEFAULT_LIMIT: u32 = 1000;

/// Identifier of a theft record. The backend emits either integers or
/// strings depending on the export it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric identifier.
    Int(i64),
    /// Textual identifier (e.g. `"GO-20201234"`).
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// A single bicycle theft incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheftRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lng: f64,
    /// Whether the bicycle was recovered.
    pub recovered: bool,
    /// Year the theft occurred.
    pub occ_year: Option<i32>,
    /// Neighbourhood name.
    pub neighbourhood: Option<String>,
    /// Bicycle manufacturer.
    pub bike_make: Option<String>,
    /// Bicycle type code (e.g. `"MT"`, `"RG"`).
    pub bike_type: Option<String>,
    /// Bicycle colour.
    pub bike_colour: Option<String>,
    /// Reported bicycle value.
    pub bike_cost: Option<f64>,
    /// Police division.
    pub division: Option<String>,
    /// Premises type where the theft occurred.
    pub premises_type: Option<String>,
}

/// Recovery status selection.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusFilter {
    /// Every record.
    #[default]
    All,
    /// Recovered bicycles only.
    Recovered,
    /// Bicycles still missing.
    #[strum(to_string = "not_recovered", serialize = "not-recovered")]
    NotRecovered,
}

impl StatusFilter {
    /// Returns the `status` query parameter value, or `None` for
    /// [`Self::All`].
    #[must_use]
    pub const fn query_value(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::Recovered => Some("RECOVERED"),
            Self::NotRecovered => Some("STOLEN"),
        }
    }

    /// Returns `true` if a record with the given recovery flag passes.
    #[must_use]
    pub const fn matches(self, recovered: bool) -> bool {
        match self {
            Self::All => true,
            Self::Recovered => recovered,
            Self::NotRecovered => !recovered,
        }
    }
}

/// Occurrence year selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearFilter {
    /// Every year.
    #[default]
    All,
    /// A single occurrence year.
    Year(i32),
}

impl YearFilter {
    /// Returns the `year` query parameter value, or `None` for
    /// [`Self::All`].
    #[must_use]
    pub const fn query_value(self) -> Option<i32> {
        match self {
            Self::All => None,
            Self::Year(year) => Some(year),
        }
    }

    /// Returns `true` if a record with the given occurrence year passes.
    #[must_use]
    pub fn matches(self, occ_year: Option<i32>) -> bool {
        match self {
            Self::All => true,
            Self::Year(year) => occ_year == Some(year),
        }
    }
}

impl std::fmt::Display for YearFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Year(year) => write!(f, "{year}"),
        }
    }
}

/// Error returned when a year selection is neither `all` nor an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseYearFilterError {
    /// The rejected input.
    pub input: String,
}

impl std::fmt::Display for ParseYearFilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid year '{}': expected 'all' or a year",
            self.input
        )
    }
}

impl std::error::Error for ParseYearFilterError {}

impl FromStr for YearFilter {
    type Err = ParseYearFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Year).map_err(|_| ParseYearFilterError {
            input: s.to_string(),
        })
    }
}

/// The record selection a query is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterState {
    /// Recovery status selection.
    pub status: StatusFilter,
    /// Occurrence year selection.
    pub year: YearFilter,
    /// Maximum number of records.
    pub limit: u32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            status: StatusFilter::All,
            year: YearFilter::All,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl FilterState {
    /// Returns a copy with `status` replaced.
    #[must_use]
    pub const fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// Returns a copy with `year` replaced.
    #[must_use]
    pub const fn with_year(mut self, year: YearFilter) -> Self {
        self.year = year;
        self
    }

    /// Returns a copy with `limit` replaced.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Translates the filter into query parameters, omitting wildcards.
    #[must_use]
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(3);
        if let Some(status) = self.status.query_value() {
            params.push(("status", status.to_string()));
        }
        if let Some(year) = self.year.query_value() {
            params.push(("year", year.to_string()));
        }
        params.push(("limit", self.limit.to_string()));
        params
    }

    /// Returns `true` if `record` satisfies the status and year selection.
    #[must_use]
    pub fn matches(&self, record: &TheftRecord) -> bool {
        self.status.matches(record.recovered) && self.year.matches(record.occ_year)
    }
}

/// Record attribute used to group records for top-N ranking.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupBy {
    /// Neighbourhood name.
    #[default]
    Neighbourhood,
    /// Police division.
    Division,
    /// Premises type.
    PremisesType,
    /// Bicycle type.
    BikeType,
    /// Bicycle manufacturer.
    BikeMake,
    /// Bicycle colour.
    BikeColour,
}

impl GroupBy {
    /// Returns the group key of `record`, or [`UNKNOWN_GROUP`] if the
    /// attribute is absent or blank.
    #[must_use]
    pub fn key_of(self, record: &TheftRecord) -> &str {
        let value = match self {
            Self::Neighbourhood => record.neighbourhood.as_deref(),
            Self::Division => record.division.as_deref(),
            Self::PremisesType => record.premises_type.as_deref(),
            Self::BikeType => record.bike_type.as_deref(),
            Self::BikeMake => record.bike_make.as_deref(),
            Self::BikeColour => record.bike_colour.as_deref(),
        };
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(UNKNOWN_GROUP)
    }
}

/// Number of records sharing one group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    /// The group key.
    pub key: String,
    /// Records in the group.
    pub count: usize,
}

/// Statistics derived from a record set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    /// Number of records.
    pub total: usize,
    /// Records marked recovered.
    pub recovered_count: usize,
    /// Records not marked recovered.
    pub not_recovered_count: usize,
    /// Share of recovered records, rounded to one decimal place.
    pub recovery_rate_percent: f64,
    /// Largest groups, descending by count, ties in first-seen order.
    pub top_groups: Vec<GroupCount>,
}

/// Marker style for a plotted record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MarkerIcon {
    /// Recovered bicycle.
    Recovered,
    /// Bicycle still missing.
    NotRecovered,
}

impl MarkerIcon {
    /// Human-readable status text.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Recovered => "Recovered",
            Self::NotRecovered => "Not Recovered",
        }
    }
}

/// A record reduced to what a map surface needs to plot it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lng: f64,
    /// Marker style.
    pub icon: MarkerIcon,
    /// Hover text.
    pub title: String,
}
