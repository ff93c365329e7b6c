#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Category mapping entries and model schema definitions.
//!
//! A prediction model variant declares an ordered list of input fields.
//! Categorical fields are backed by an external encoding table that maps
//! a human-readable label to the integer the predictor was trained on;
//! numeric fields are entered directly and validated against a
//! [`NumericFormat`] and optional bounds.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One row of a category encoding table.
///
/// Within a single field's mapping, `value` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Human-readable category label (e.g. `"THEFT UNDER"`).
    pub label: String,
    /// Encoded value sent to the predictor.
    pub value: i64,
}

/// Identifier of a prediction model variant (e.g. `"v1"`).
///
/// Kept as an open string rather than a closed enum so that new variants
/// can be registered without touching the components that consume them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVariant(String);

impl ModelVariant {
    /// Creates a variant identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelVariant {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ModelVariant {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a numeric field must be parsed.
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
pub enum NumericFormat {
    /// Whole numbers (days, years, counts).
    Integer,
    /// Floating point (coordinates, costs).
    Float,
}

/// Whether a field is chosen from an encoding table or typed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Value must be one of the encoded values of the field's mapping.
    Categorical {
        /// Mapping source identifier. Defaults to `mapping_<FIELD>.csv`.
        #[serde(default)]
        mapping_source: Option<String>,
    },
    /// Value is a number in the given format.
    Numeric {
        /// Integer or floating point.
        format: NumericFormat,
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default)]
        max: Option<f64>,
    },
}

/// A single input field of a model schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name as the predictor expects it (e.g. `"BIKE_COST"`).
    pub name: String,
    /// Human-readable label (e.g. `"Bike Cost"`).
    pub label: String,
    /// Example input shown next to the field.
    #[serde(default)]
    pub placeholder: Option<String>,
    /// Categorical or numeric.
    pub kind: FieldKind,
}

impl FieldSchema {
    /// Returns `true` if this field is backed by an encoding table.
    #[must_use]
    pub const fn is_categorical(&self) -> bool {
        matches!(self.kind, FieldKind::Categorical { .. })
    }

    /// Returns the mapping source identifier for a categorical field, or
    /// `None` for numeric fields.
    ///
    /// Falls back to `mapping_<FIELD>.csv` when the schema does not name
    /// one explicitly.
    #[must_use]
    pub fn mapping_source(&self) -> Option<String> {
        match &self.kind {
            FieldKind::Categorical { mapping_source } => Some(
                mapping_source
                    .clone()
                    .unwrap_or_else(|| format!("mapping_{}.csv", self.name)),
            ),
            FieldKind::Numeric { .. } => None,
        }
    }
}

/// The ordered field set required by one model variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Variant identifier (e.g. `"v1"`).
    pub variant: ModelVariant,
    /// Human-readable name (e.g. `"Model v1"`).
    pub name: String,
    /// Fields in submission/validation order.
    pub fields: Vec<FieldSchema>,
}

impl ModelSchema {
    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the categorical fields in schema order.
    pub fn categorical_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.is_categorical())
    }

    /// Returns all field names in schema order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}
