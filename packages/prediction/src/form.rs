//! Form state and payload synthesis.
//!
//! Validation is fail-fast: fields are checked in schema order and the
//! first problem is returned. This differs from mapping-table parsing,
//! where unusable rows are skipped, because a payload with a gap would be
//! rejected by the predictor anyway.

use std::collections::BTreeMap;

use bike_recovery_mapping::MappingLookup;
use bike_recovery_mapping::registry::{SchemaRegistry, UnknownVariantError};
use bike_recovery_mapping_models::{
    FieldKind, FieldSchema, MappingEntry, ModelSchema, ModelVariant, NumericFormat,
};
use bike_recovery_prediction_models::{Payload, PayloadValue};

use crate::{PredictionError, ValidationError, ValidationReason};

/// Raw values entered for a form, keyed by field name.
pub type FormValues = BTreeMap<String, String>;

/// Validates `values` against `schema` and builds the submission payload.
///
/// Categorical fields accept either an encoded value from the field's
/// options or one of the option labels (case-insensitive). Values for
/// fields outside `schema` are ignored.
///
/// # Errors
///
/// Returns [`ValidationError`] for the first field, in schema order, that
/// is missing or invalid.
pub fn build_payload(
    schema: &ModelSchema,
    values: &FormValues,
    options: &dyn MappingLookup,
) -> Result<Payload, ValidationError> {
    let mut fields = BTreeMap::new();

    for field in &schema.fields {
        let raw = values
            .get(&field.name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ValidationError::new(&field.name, ValidationReason::Missing))?;

        let value = validate_field(field, raw, options)
            .map_err(|reason| ValidationError::new(&field.name, reason))?;

        fields.insert(field.name.clone(), value);
    }

    Ok(Payload {
        variant: schema.variant.clone(),
        fields,
    })
}

fn validate_field(
    field: &FieldSchema,
    raw: &str,
    options: &dyn MappingLookup,
) -> Result<PayloadValue, ValidationReason> {
    match &field.kind {
        FieldKind::Categorical { .. } => {
            let entries = options
                .entries(&field.name)
                .ok_or(ValidationReason::OptionsNotLoaded)?;
            resolve_category(entries, raw).map(PayloadValue::Integer)
        }
        FieldKind::Numeric { format, min, max } => {
            let value = parse_number(*format, raw)?;
            let number = match value {
                #[allow(clippy::cast_precision_loss)]
                PayloadValue::Integer(v) => v as f64,
                PayloadValue::Float(v) => v,
            };
            let below = min.is_some_and(|min| number < min);
            let above = max.is_some_and(|max| number > max);
            if below || above {
                return Err(ValidationReason::OutOfRange {
                    min: *min,
                    max: *max,
                });
            }
            Ok(value)
        }
    }
}

fn resolve_category(entries: &[MappingEntry], raw: &str) -> Result<i64, ValidationReason> {
    raw.parse::<i64>()
        .ok()
        .filter(|encoded| entries.iter().any(|e| e.value == *encoded))
        .or_else(|| {
            entries
                .iter()
                .find(|e| e.label.eq_ignore_ascii_case(raw))
                .map(|e| e.value)
        })
        .ok_or_else(|| ValidationReason::UnknownCategory {
            value: raw.to_string(),
        })
}

fn parse_number(format: NumericFormat, raw: &str) -> Result<PayloadValue, ValidationReason> {
    match format {
        NumericFormat::Integer => raw.parse::<i64>().map(PayloadValue::Integer).map_err(|_| {
            if parse_float(raw).is_some() {
                ValidationReason::NotAnInteger
            } else {
                ValidationReason::NotANumber
            }
        }),
        NumericFormat::Float => parse_float(raw)
            .map(PayloadValue::Float)
            .ok_or(ValidationReason::NotANumber),
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Values entered for the active model variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionForm {
    variant: ModelVariant,
    values: FormValues,
}

impl PredictionForm {
    /// Creates an empty form for `variant`.
    #[must_use]
    pub const fn new(variant: ModelVariant) -> Self {
        Self {
            variant,
            values: BTreeMap::new(),
        }
    }

    /// Creates an empty form for the registry's default variant.
    #[must_use]
    pub fn with_default_variant(registry: &SchemaRegistry) -> Self {
        Self::new(registry.default_variant().clone())
    }

    /// Returns the active variant.
    #[must_use]
    pub const fn variant(&self) -> &ModelVariant {
        &self.variant
    }

    /// Returns every entered value.
    #[must_use]
    pub const fn values(&self) -> &FormValues {
        &self.values
    }

    /// Sets the value of `field`.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field.into(), value.into());
    }

    /// Returns the value of `field`, if set.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Clears every value.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Switches to `variant`, clearing all values. Returns the previous
    /// variant if it changed, so the caller can invalidate its cached
    /// options.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownVariantError`] if `variant` is not registered; the
    /// form is left untouched.
    pub fn switch_variant(
        &mut self,
        registry: &SchemaRegistry,
        variant: &str,
    ) -> Result<Option<ModelVariant>, UnknownVariantError> {
        let schema = registry.schema_for(variant)?;
        if schema.variant == self.variant {
            return Ok(None);
        }

        log::debug!("Switching prediction form from {} to {}", self.variant, schema.variant);
        self.values.clear();
        Ok(Some(std::mem::replace(
            &mut self.variant,
            schema.variant.clone(),
        )))
    }

    /// Validates the form against its variant's schema and `options`.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError::UnknownVariant`] if the active variant is
    /// not in `registry`, [`PredictionError::OptionsVariantMismatch`] if
    /// `options` were loaded for another variant, or
    /// [`PredictionError::Validation`] for the first invalid field.
    pub fn build_payload(
        &self,
        registry: &SchemaRegistry,
        options: &dyn MappingLookup,
    ) -> Result<Payload, PredictionError> {
        let schema = registry.schema_for(self.variant.as_str())?;
        if let Some(loaded_for) = options.variant().filter(|v| **v != self.variant) {
            return Err(PredictionError::OptionsVariantMismatch {
                form: self.variant.clone(),
                options: loaded_for.clone(),
            });
        }
        build_payload(schema, &self.values, options).map_err(PredictionError::from)
    }
}

#[cfg(test)]
mod tests {
    use bike_recovery_mapping::cache::{MappingList, VariantOptions};

    use super::*;

    fn options_for(schema: &ModelSchema) -> BTreeMap<String, Vec<MappingEntry>> {
        schema
            .categorical_fields()
            .map(|field| {
                let entries = vec![
                    MappingEntry {
                        label: "First".to_string(),
                        value: 0,
                    },
                    MappingEntry {
                        label: "Second".to_string(),
                        value: 7,
                    },
                ];
                (field.name.clone(), entries)
            })
            .collect()
    }

    fn complete_v1() -> FormValues {
        [
            ("PRIMARY_OFFENCE", "0"),
            ("BIKE_COST", "650.50"),
            ("LAT_WGS84", "43.65"),
            ("BIKE_MAKE", "7"),
            ("OCC_DOY", "120"),
            ("REPORT_YEAR", "2021"),
            ("NEIGHBOURHOOD_158", "second"),
            ("NEIGHBOURHOOD_140", "0"),
            ("REPORT_DAY", "14"),
            ("OCC_DAY", "13"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn first_blank_field_in_schema_order_is_reported() {
        let registry = SchemaRegistry::embedded();
        let schema = registry.schema_for("v1").unwrap();
        let options = options_for(schema);

        let mut values = complete_v1();
        values.insert("OCC_DAY".to_string(), String::new());
        values.insert("BIKE_MAKE".to_string(), "   ".to_string());

        let err = build_payload(schema, &values, &options).unwrap_err();
        assert_eq!(
            err,
            ValidationError::new("BIKE_MAKE", ValidationReason::Missing)
        );
    }

    #[test]
    fn complete_payload_has_exactly_schema_keys() {
        let registry = SchemaRegistry::embedded();
        let schema = registry.schema_for("v1").unwrap();
        let options = options_for(schema);

        let mut values = complete_v1();
        values.insert("DIVISION".to_string(), "0".to_string());

        let payload = build_payload(schema, &values, &options).unwrap();

        let mut expected: Vec<&str> = schema.field_names().collect();
        expected.push("modelVersion");
        expected.sort_unstable();
        let mut keys: Vec<&str> = payload.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, expected);

        assert_eq!(payload.variant.as_str(), "v1");
        assert_eq!(payload.fields["NEIGHBOURHOOD_158"], PayloadValue::Integer(7));
        assert_eq!(payload.fields["BIKE_COST"], PayloadValue::Float(650.5));
        assert_eq!(payload.fields["REPORT_YEAR"], PayloadValue::Integer(2021));
    }

    #[test]
    fn rejects_values_outside_the_options() {
        let registry = SchemaRegistry::embedded();
        let schema = registry.schema_for("v1").unwrap();
        let options = options_for(schema);

        let mut values = complete_v1();
        values.insert("PRIMARY_OFFENCE".to_string(), "3".to_string());

        let err = build_payload(schema, &values, &options).unwrap_err();
        assert_eq!(err.field, "PRIMARY_OFFENCE");
        assert!(matches!(err.reason, ValidationReason::UnknownCategory { .. }));
    }

    #[test]
    fn numeric_fields_follow_their_format() {
        let registry = SchemaRegistry::embedded();
        let schema = registry.schema_for("v1").unwrap();
        let options = options_for(schema);

        let mut values = complete_v1();
        values.insert("REPORT_YEAR".to_string(), "2021.5".to_string());
        let err = build_payload(schema, &values, &options).unwrap_err();
        assert_eq!(err.reason, ValidationReason::NotAnInteger);

        let mut values = complete_v1();
        values.insert("LAT_WGS84".to_string(), "north".to_string());
        let err = build_payload(schema, &values, &options).unwrap_err();
        assert_eq!(err.reason, ValidationReason::NotANumber);

        let mut values = complete_v1();
        values.insert("OCC_DAY".to_string(), "32".to_string());
        let err = build_payload(schema, &values, &options).unwrap_err();
        assert_eq!(err.field, "OCC_DAY");
        assert!(matches!(err.reason, ValidationReason::OutOfRange { .. }));
    }

    #[test]
    fn missing_options_are_reported() {
        let registry = SchemaRegistry::embedded();
        let schema = registry.schema_for("v1").unwrap();
        let err = build_payload(schema, &complete_v1(), &BTreeMap::<String, Vec<MappingEntry>>::new()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::new("PRIMARY_OFFENCE", ValidationReason::OptionsNotLoaded)
        );
    }

    #[test]
    fn switching_variant_clears_values() {
        let registry = SchemaRegistry::embedded();
        let mut form = PredictionForm::with_default_variant(&registry);
        form.set("BIKE_COST", "100");

        assert_eq!(form.switch_variant(&registry, "v1").unwrap(), None);
        assert_eq!(form.get("BIKE_COST"), Some("100"));

        let previous = form.switch_variant(&registry, "v2").unwrap();
        assert_eq!(previous, Some(ModelVariant::from("v1")));
        assert_eq!(form.variant().as_str(), "v2");
        assert!(form.values().is_empty());
    }

    #[test]
    fn unknown_variant_leaves_form_untouched() {
        let registry = SchemaRegistry::embedded();
        let mut form = PredictionForm::with_default_variant(&registry);
        form.set("BIKE_COST", "100");

        let err = form.switch_variant(&registry, "v9").unwrap_err();
        assert_eq!(err.variant, "v9");
        assert_eq!(form.variant().as_str(), "v1");
        assert_eq!(form.get("BIKE_COST"), Some("100"));
    }

    #[test]
    fn form_builds_payload_through_registry() {
        let registry = SchemaRegistry::embedded();
        let schema = registry.schema_for("v1").unwrap();
        let options = options_for(schema);

        let mut form = PredictionForm::with_default_variant(&registry);
        for (field, value) in complete_v1() {
            form.set(field, value);
        }
        assert!(form.build_payload(&registry, &options).is_ok());

        form.reset();
        assert!(matches!(
            form.build_payload(&registry, &options),
            Err(PredictionError::Validation(_))
        ));

        let orphan = PredictionForm::new(ModelVariant::from("v9"));
        assert!(matches!(
            orphan.build_payload(&registry, &options),
            Err(PredictionError::UnknownVariant(_))
        ));
    }

    #[test]
    fn options_for_another_variant_are_refused() {
        let registry = SchemaRegistry::embedded();
        let v1 = registry.schema_for("v1").unwrap();
        let v1_options = VariantOptions {
            variant: v1.variant.clone(),
            options: options_for(v1)
                .into_iter()
                .map(|(field, entries)| (field, MappingList::from(entries)))
                .collect(),
            failures: Vec::new(),
        };

        let mut form = PredictionForm::with_default_variant(&registry);
        for (field, value) in complete_v1() {
            form.set(field, value);
        }
        assert!(form.build_payload(&registry, &v1_options).is_ok());

        form.switch_variant(&registry, "v2").unwrap();
        let err = form.build_payload(&registry, &v1_options).unwrap_err();
        assert!(matches!(
            err,
            PredictionError::OptionsVariantMismatch { ref form, ref options }
                if form.as_str() == "v2" && options.as_str() == "v1"
        ));
    }
}
