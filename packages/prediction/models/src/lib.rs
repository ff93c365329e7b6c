#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wire types for the prediction endpoint.
//!
//! A [`Payload`] serializes to a flat JSON object: `modelVersion` plus one
//! key per schema field. Categorical fields carry their encoded integer,
//! numeric fields carry the parsed number.

use std::collections::BTreeMap;

use bike_recovery_mapping_models::ModelVariant;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Name of the payload key carrying the model variant.
pub const MODEL_VERSION_KEY: &str = "modelVersion";

/// A validated field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    /// Encoded category or integer field.
    Integer(i64),
    /// Floating-point field.
    Float(f64),
}

impl std::fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// A complete prediction request for one model variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// The model variant the payload targets.
    #[serde(rename = "modelVersion")]
    pub variant: ModelVariant,
    /// One value per schema field, keyed by field name.
    #[serde(flatten)]
    pub fields: BTreeMap<String, PayloadValue>,
}

impl Payload {
    /// Returns every key the payload serializes to, `modelVersion`
    /// included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(MODEL_VERSION_KEY).chain(self.fields.keys().map(String::as_str))
    }
}

/// Class probabilities reported by the predictor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Probability {
    /// Probability the bicycle is recovered (0..1).
    pub recovered: f64,
    /// Probability the bicycle is not recovered (0..1).
    pub not_recovered: f64,
}

/// The predicted class, which the backend emits as a code or a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictedClass {
    /// Numeric class (`1` = recovered).
    Code(i64),
    /// Textual class.
    Label(String),
}

impl std::fmt::Display for PredictedClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(1) => f.write_str("Recovered"),
            Self::Code(_) => f.write_str("Not Recovered"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// A successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Predicted class.
    #[serde(default)]
    pub prediction: Option<PredictedClass>,
    /// Class probabilities.
    #[serde(default)]
    pub probability: Option<Probability>,
    /// Recovery likelihood as a percentage.
    pub recovered_probability_percent: f64,
    /// Advice lines for the reporter.
    #[serde(default)]
    pub advice: Vec<String>,
    /// Features the predictor consumed.
    #[serde(default, rename = "featuresUsed", alias = "features_used")]
    pub features_used: Vec<String>,
    /// Variant that produced the prediction.
    #[serde(default, rename = "modelVersion", alias = "model_version")]
    pub model_version: Option<String>,
}

impl PredictionResponse {
    /// Buckets [`Self::recovered_probability_percent`].
    #[must_use]
    pub fn likelihood_label(&self) -> LikelihoodLabel {
        LikelihoodLabel::from_percent(self.recovered_probability_percent)
    }
}

/// Coarse recovery likelihood bucket.
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
#[strum(serialize_all = "title_case")]
pub enum LikelihoodLabel {
    /// 70% and above.
    High,
    /// 40% up to 70%.
    Moderate,
    /// Below 40%.
    Low,
}

impl LikelihoodLabel {
    /// Lower bound (inclusive) of [`Self::High`].
    pub const HIGH_THRESHOLD: f64 = 70.0;

    /// Lower bound (inclusive) of [`Self::Moderate`].
    pub const MODERATE_THRESHOLD: f64 = 40.0;

    /// Buckets a percentage.
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        if percent >= Self::HIGH_THRESHOLD {
            Self::High
        } else if percent >= Self::MODERATE_THRESHOLD {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}
