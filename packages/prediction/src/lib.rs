#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Prediction form state, payload synthesis, and submission.
//!
//! [`form::PredictionForm`] holds the values entered for the active model
//! variant; [`form::build_payload`] validates them against the variant's
//! schema and loaded option lists, and [`client::PredictionClient`] submits
//! the resulting payload.

pub mod client;
pub mod form;

use bike_recovery_mapping::registry::UnknownVariantError;
use bike_recovery_mapping_models::ModelVariant;

pub use bike_recovery_prediction_models as models;

/// Why a form value was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationReason {
    /// No value, or only whitespace.
    #[error("is required")]
    Missing,

    /// A numeric field holds something that is not a number.
    #[error("must be a number")]
    NotANumber,

    /// An integer field holds a fractional number.
    #[error("must be a whole number")]
    NotAnInteger,

    /// A categorical field holds a value absent from its options.
    #[error("'{value}' is not one of the available options")]
    UnknownCategory {
        /// The rejected value.
        value: String,
    },

    /// A categorical field's options have not been loaded.
    #[error("has no loaded options")]
    OptionsNotLoaded,

    /// A numeric field lies outside its declared bounds.
    #[error("must be {}", range_text(.min, .max))]
    OutOfRange {
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Inclusive upper bound.
        max: Option<f64>,
    },
}

#[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
fn range_text(min: &Option<f64>, max: &Option<f64>) -> String {
    match (*min, *max) {
        (Some(min), Some(max)) => format!("between {min} and {max}"),
        (Some(min), None) => format!("at least {min}"),
        (None, Some(max)) => format!("at most {max}"),
        (None, None) => "in range".to_string(),
    }
}

/// A form value failed validation. Reported for the first offending field
/// in schema order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub reason: ValidationReason,
}

impl ValidationError {
    /// Creates an error for `field`.
    #[must_use]
    pub fn new(field: &str, reason: ValidationReason) -> Self {
        Self {
            field: field.to_string(),
            reason,
        }
    }
}

/// Errors that can occur while preparing or submitting a prediction.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    /// The form is incomplete or invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The form targets an unregistered variant.
    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariantError),

    /// The option lists were loaded for a different variant than the form
    /// targets.
    #[error("Options loaded for {options} cannot validate a {form} form")]
    OptionsVariantMismatch {
        /// The form's active variant.
        form: ModelVariant,
        /// The variant the options belong to.
        options: ModelVariant,
    },

    /// The predictor answered with an error.
    #[error("Prediction rejected with HTTP {http_status}: {message}")]
    Rejected {
        /// Numeric HTTP status code.
        http_status: u16,
        /// Server-supplied error message, or the status reason.
        message: String,
    },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The response body is not a prediction document.
    #[error("Parse error: {0}")]
    Parse(String),
}
