//! Category mapping table loader.
//!
//! A mapping source is a CSV file with at least the columns
//! `Original Category` and `Encoded Value`, one row per category. Rows
//! lacking a label or a parsable integer are skipped; a file that cannot
//! be fetched or tokenized fails the whole load.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use bike_recovery_http::{ApiConfig, retry};
use bike_recovery_mapping_models::MappingEntry;

use crate::{MappingFetcher, MappingLoadError, MappingLoadErrorKind};

/// Header of the label column.
pub const LABEL_COLUMN: &str = "Original Category";

/// Header of the encoded value column.
pub const VALUE_COLUMN: &str = "Encoded Value";

/// Fetches `source` through `fetcher` and parses it into entries in file
/// order.
///
/// # Errors
///
/// Returns [`MappingLoadError`] attributed to `field` if the fetch fails,
/// the content cannot be parsed, or no usable rows remain.
pub async fn load_mapping(
    fetcher: &dyn MappingFetcher,
    field: &str,
    source: &str,
) -> Result<Vec<MappingEntry>, MappingLoadError> {
    log::debug!("Loading mapping for {field} from {source}");

    let text = fetcher
        .fetch(source)
        .await
        .map_err(|kind| MappingLoadError::new(field, kind))?;

    let entries = parse_mapping(field, &text)?;
    if entries.is_empty() {
        return Err(MappingLoadError::new(
            field,
            MappingLoadErrorKind::Empty {
                source_id: source.to_string(),
            },
        ));
    }

    log::info!("Loaded {} options for {field}", entries.len());
    Ok(entries)
}

/// Parses mapping CSV text into entries in file order.
///
/// Rows with an empty label or an unparsable value are skipped. A repeated
/// encoded value keeps its first row.
///
/// # Errors
///
/// Returns [`MappingLoadError`] if the CSV cannot be tokenized or the
/// header lacks one of the required columns.
pub fn parse_mapping(field: &str, text: &str) -> Result<Vec<MappingEntry>, MappingLoadError> {
    let parse_err = |message: String| {
        MappingLoadError::new(field, MappingLoadErrorKind::Parse(message))
    };

    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|e| parse_err(e.to_string()))?;
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| parse_err(format!("missing column '{name}'")))
    };
    let label_idx = column(LABEL_COLUMN)?;
    let value_idx = column(VALUE_COLUMN)?;

    let mut entries = Vec::new();
    let mut seen = BTreeSet::new();
    let mut skipped = 0_usize;

    for result in reader.records() {
        let record = result.map_err(|e| parse_err(e.to_string()))?;

        let label = record.get(label_idx).unwrap_or_default();
        let value = record.get(value_idx).and_then(parse_encoded_value);

        let Some(value) = value.filter(|_| !label.is_empty()) else {
            skipped += 1;
            continue;
        };

        if !seen.insert(value) {
            log::warn!("{field}: duplicate encoded value {value} for '{label}', keeping first");
            skipped += 1;
            continue;
        }

        entries.push(MappingEntry {
            label: label.to_string(),
            value,
        });
    }

    if skipped > 0 {
        log::debug!("{field}: skipped {skipped} unusable mapping rows");
    }

    Ok(entries)
}

/// Parses an encoded value cell. Accepts `"3"` and integral floats such as
/// `"3.0"`, which spreadsheet exports sometimes produce.
fn parse_encoded_value(cell: &str) -> Option<i64> {
    if let Ok(v) = cell.parse::<i64>() {
        return Some(v);
    }
    let v = cell.parse::<f64>().ok()?;
    #[allow(clippy::cast_possible_truncation)]
    let truncated = v as i64;
    (v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15).then_some(truncated)
}

/// Fetches mapping sources over HTTP relative to
/// [`ApiConfig::mapping_base_url`].
#[derive(Debug, Clone)]
pub struct HttpMappingFetcher {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpMappingFetcher {
    /// Creates a fetcher for the given config.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: config.build_client()?,
            config,
        })
    }
}

#[async_trait]
impl MappingFetcher for HttpMappingFetcher {
    async fn fetch(&self, source: &str) -> Result<String, MappingLoadErrorKind> {
        let url = self.config.mapping_url(source);

        let response = retry::send_with_retry(|| self.client.get(&url), self.config.max_retries)
            .await
            .map_err(|e| MappingLoadErrorKind::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MappingLoadErrorKind::Http(e.to_string()))?;

        decode_response(status, body)
    }
}

/// Accepts a mapping response body only under a success status.
fn decode_response(
    status: reqwest::StatusCode,
    body: String,
) -> Result<String, MappingLoadErrorKind> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(MappingLoadErrorKind::Status {
            status: status.as_u16(),
        })
    }
}

/// Reads mapping sources from a local directory.
#[derive(Debug, Clone)]
pub struct DirMappingFetcher {
    dir: PathBuf,
}

impl DirMappingFetcher {
    /// Creates a fetcher rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MappingFetcher for DirMappingFetcher {
    async fn fetch(&self, source: &str) -> Result<String, MappingLoadErrorKind> {
        let path = self.dir.join(source);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MappingLoadErrorKind::Io(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bike_recovery_http::testing::ScriptedServer;

    use super::*;

    struct FixtureFetcher(BTreeMap<&'static str, &'static str>);

    #[async_trait]
    impl MappingFetcher for FixtureFetcher {
        async fn fetch(&self, source: &str) -> Result<String, MappingLoadErrorKind> {
            self.0
                .get(source)
                .map(|s| (*s).to_string())
                .ok_or(MappingLoadErrorKind::Status { status: 404 })
        }
    }

    #[test]
    fn parses_rows_in_file_order() {
        let csv = "Original Category,Encoded Value\nTHEFT UNDER,2\nB&E,0\nTHEFT OF EBIKE UNDER $5000,1\n";
        let entries = parse_mapping("PRIMARY_OFFENCE", csv).unwrap();
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["THEFT UNDER", "B&E", "THEFT OF EBIKE UNDER $5000"]);
        assert_eq!(entries[1].value, 0);
    }

    #[test]
    fn skips_rows_without_label_or_value() {
        let csv = "Original Category,Encoded Value\n\
                   MOUNTAIN,0\n\
                   ,1\n\
                   ROAD,\n\
                   BMX,abc\n\
                   TANDEM\n\
                   OTHER,5\n";
        let entries = parse_mapping("BIKE_TYPE", csv).unwrap();
        assert_eq!(
            entries,
            vec![
                MappingEntry {
                    label: "MOUNTAIN".to_string(),
                    value: 0
                },
                MappingEntry {
                    label: "OTHER".to_string(),
                    value: 5
                },
            ]
        );
    }

    #[test]
    fn output_length_matches_usable_rows() {
        let rows = ["A,1", "B,2", ",3", "C,x", "D,4"];
        let csv = format!("Original Category,Encoded Value\n{}\n", rows.join("\n"));
        let usable = rows
            .iter()
            .filter(|r| {
                let (label, value) = r.split_once(',').unwrap();
                !label.is_empty() && value.parse::<i64>().is_ok()
            })
            .count();
        assert_eq!(parse_mapping("F", &csv).unwrap().len(), usable);
    }

    #[test]
    fn tolerates_bom_extra_columns_and_float_values() {
        let csv = "\u{feff}Index, Original Category , Encoded Value\n0, 14 D ,3.0\n1,51 D,4\n";
        let entries = parse_mapping("DIVISION", csv).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "14 D");
        assert_eq!(entries[0].value, 3);
    }

    #[test]
    fn duplicate_values_keep_first_row() {
        let csv = "Original Category,Encoded Value\nBLACK,1\nBLK,1\nWHITE,2\n";
        let entries = parse_mapping("BIKE_COLOUR", csv).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "BLACK");
    }

    #[test]
    fn missing_column_is_a_parse_error() {
        let err = parse_mapping("BIKE_MAKE", "Category,Value\nGIANT,1\n").unwrap_err();
        assert_eq!(err.field, "BIKE_MAKE");
        assert!(matches!(err.kind, MappingLoadErrorKind::Parse(_)));
    }

    #[tokio::test]
    async fn fetch_failure_is_attributed_to_field() {
        let fetcher = FixtureFetcher(BTreeMap::new());
        let err = load_mapping(&fetcher, "DIVISION", "mapping_DIVISION.csv")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MappingLoadError::new("DIVISION", MappingLoadErrorKind::Status { status: 404 })
        );
    }

    #[tokio::test]
    async fn header_only_source_is_empty_error() {
        let fetcher = FixtureFetcher(BTreeMap::from([(
            "mapping_BIKE_MAKE.csv",
            "Original Category,Encoded Value\n",
        )]));
        let err = load_mapping(&fetcher, "BIKE_MAKE", "mapping_BIKE_MAKE.csv")
            .await
            .unwrap_err();
        assert!(matches!(err.kind, MappingLoadErrorKind::Empty { .. }));
    }

    #[tokio::test]
    async fn repeated_loads_are_equal() {
        let fetcher = FixtureFetcher(BTreeMap::from([(
            "mapping_PREMISES_TYPE.csv",
            "Original Category,Encoded Value\nApartment,0\nHouse,3\nOutside,5\n",
        )]));
        let first = load_mapping(&fetcher, "PREMISES_TYPE", "mapping_PREMISES_TYPE.csv")
            .await
            .unwrap();
        let second = load_mapping(&fetcher, "PREMISES_TYPE", "mapping_PREMISES_TYPE.csv")
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn non_success_status_is_reported() {
        assert_eq!(
            decode_response(reqwest::StatusCode::NOT_FOUND, "Not Found".to_string()),
            Err(MappingLoadErrorKind::Status { status: 404 })
        );
        assert_eq!(
            decode_response(reqwest::StatusCode::OK, "a,b".to_string()),
            Ok("a,b".to_string())
        );
    }

    #[tokio::test]
    async fn http_fetcher_resolves_source_against_base_url() {
        let server = ScriptedServer::start(vec![(200, "Original Category,Encoded Value\nD11,0\n")])
            .await;
        let config = ApiConfig::default()
            .with_mapping_base_url(&format!("{}/data/", server.base_url()))
            .with_max_retries(0);
        let fetcher = HttpMappingFetcher::new(config).unwrap();

        let entries = load_mapping(&fetcher, "DIVISION", "mapping_DIVISION.csv")
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(
            server.requests()[0].line,
            "GET /data/mapping_DIVISION.csv HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn http_fetcher_maps_missing_source_to_status() {
        let server = ScriptedServer::start(vec![(404, "")]).await;
        let config = ApiConfig::default()
            .with_mapping_base_url(server.base_url())
            .with_max_retries(2);
        let fetcher = HttpMappingFetcher::new(config).unwrap();

        let err = load_mapping(&fetcher, "BIKE_COLOUR", "mapping_BIKE_COLOUR.csv")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            MappingLoadError::new("BIKE_COLOUR", MappingLoadErrorKind::Status { status: 404 })
        );
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn dir_fetcher_reports_missing_file_as_io() {
        let fetcher = DirMappingFetcher::new("/nonexistent/bike-recovery-mappings");
        let err = fetcher.fetch("mapping_DIVISION.csv").await.unwrap_err();
        assert!(matches!(err, MappingLoadErrorKind::Io(_)));
    }
}
