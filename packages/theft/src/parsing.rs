//! Decoding of theft-data response bodies.
//!
//! The body must be a JSON object with a `theft_data` array. Each element
//! is decoded independently: an element with unusable coordinates or a
//! mistyped field is dropped with a warning and the rest of the page is
//! kept.

use bike_recovery_theft_models::{RecordId, TheftRecord};
use serde::Deserialize;
use serde_json::Value;

use crate::TheftFetchError;

#[derive(Deserialize)]
struct TheftDataBody {
    theft_data: Vec<Value>,
}

#[derive(Deserialize)]
struct RawRecord {
    id: RecordId,
    lat: Option<Value>,
    lng: Option<Value>,
    recovered: bool,
    occ_year: Option<i32>,
    neighbourhood: Option<String>,
    bike_make: Option<String>,
    bike_type: Option<String>,
    bike_colour: Option<String>,
    bike_cost: Option<f64>,
    division: Option<String>,
    premises_type: Option<String>,
}

/// Decodes a theft-data response body.
///
/// # Errors
///
/// Returns [`TheftFetchError::Parse`] if the body is not JSON or has no
/// `theft_data` array.
pub fn decode_theft_data(body: &str) -> Result<Vec<TheftRecord>, TheftFetchError> {
    let body: TheftDataBody =
        serde_json::from_str(body).map_err(|e| TheftFetchError::Parse(e.to_string()))?;

    let total = body.theft_data.len();
    let records: Vec<TheftRecord> = body
        .theft_data
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match decode_record(value) {
            Ok(record) => Some(record),
            Err(reason) => {
                log::warn!("Dropping theft record at index {index}: {reason}");
                None
            }
        })
        .collect();

    if records.len() < total {
        log::warn!(
            "Dropped {} of {total} theft records",
            total - records.len()
        );
    }

    Ok(records)
}

fn decode_record(value: Value) -> Result<TheftRecord, String> {
    let raw: RawRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;

    let (lat, lng) = parse_lat_lng(raw.lat.as_ref(), raw.lng.as_ref())
        .ok_or_else(|| format!("record {} has missing or invalid coordinates", raw.id))?;

    Ok(TheftRecord {
        id: raw.id,
        lat,
        lng,
        recovered: raw.recovered,
        occ_year: raw.occ_year,
        neighbourhood: raw.neighbourhood,
        bike_make: raw.bike_make,
        bike_type: raw.bike_type,
        bike_colour: raw.bike_colour,
        bike_cost: raw.bike_cost,
        division: raw.division,
        premises_type: raw.premises_type,
    })
}

/// Parses lat/lng from JSON numbers or numeric strings. Returns `None` if
/// either is missing, non-numeric, non-finite, or out of range.
#[must_use]
pub fn parse_lat_lng(lat: Option<&Value>, lng: Option<&Value>) -> Option<(f64, f64)> {
    let latitude = parse_coordinate(lat?)?;
    let longitude = parse_coordinate(lng?)?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some((latitude, longitude))
}

fn parse_coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}
