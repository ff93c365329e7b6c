//! Model schema registry, loaded from embedded TOML configs.
//!
//! Each `.toml` file in `packages/mapping/schemas/` declares one model
//! variant and is baked into the binary at compile time via
//! [`include_str!`]. Adding a variant is as simple as creating a new TOML
//! file and adding it to the list below; nothing that consumes schemas
//! needs to change.

use std::collections::BTreeSet;

use bike_recovery_mapping_models::{FieldKind, ModelSchema, ModelVariant};

/// Schema TOML configs embedded at compile time, in registration order.
const SCHEMA_TOMLS: &[(&str, &str)] = &[
    ("v1", include_str!("../schemas/v1.toml")),
    ("v2", include_str!("../schemas/v2.toml")),
];

/// Total number of registered variants (used in tests).
#[cfg(test)]
const EXPECTED_VARIANT_COUNT: usize = 2;

/// The requested variant is not registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown model variant '{variant}'")]
pub struct UnknownVariantError {
    /// The variant identifier that was requested.
    pub variant: String,
}

/// A schema definition is malformed.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The TOML could not be deserialized.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Two fields in one schema share a name.
    #[error("{variant}: duplicate field '{field}'")]
    DuplicateField {
        /// Variant declaring the duplicate.
        variant: String,
        /// The repeated field name.
        field: String,
    },

    /// Two schemas declare the same variant.
    #[error("duplicate variant '{variant}'")]
    DuplicateVariant {
        /// The repeated variant identifier.
        variant: String,
    },

    /// A field definition is unusable.
    #[error("{variant}: invalid field '{field}': {message}")]
    InvalidField {
        /// Variant declaring the field.
        variant: String,
        /// The offending field.
        field: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The registry contains no schemas.
    #[error("no model schemas registered")]
    Empty,
}

/// Parses a single schema TOML document and validates it.
///
/// # Errors
///
/// Returns [`RegistryError`] if the TOML is malformed or the schema breaks
/// a field invariant.
pub fn parse_schema_toml(toml_str: &str) -> Result<ModelSchema, RegistryError> {
    let schema: ModelSchema = toml::de::from_str(toml_str)?;
    validate_schema(&schema)?;
    Ok(schema)
}

fn validate_schema(schema: &ModelSchema) -> Result<(), RegistryError> {
    let variant = schema.variant.to_string();
    let invalid = |field: &str, message: &str| RegistryError::InvalidField {
        variant: variant.clone(),
        field: field.to_string(),
        message: message.to_string(),
    };

    let mut seen = BTreeSet::new();

    for field in &schema.fields {
        if field.name.trim().is_empty() {
            return Err(invalid(&field.name, "empty name"));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(RegistryError::DuplicateField {
                variant: variant.clone(),
                field: field.name.clone(),
            });
        }
        match &field.kind {
            FieldKind::Categorical {
                mapping_source: Some(source),
            } if source.trim().is_empty() => {
                return Err(invalid(&field.name, "empty mapping source"));
            }
            FieldKind::Numeric {
                min: Some(min),
                max: Some(max),
                ..
            } if min > max => {
                return Err(invalid(&field.name, "min is greater than max"));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Lookup of model schemas by variant.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<ModelSchema>,
}

impl SchemaRegistry {
    /// Returns the registry of all embedded schemas.
    ///
    /// # Panics
    ///
    /// Panics if any embedded TOML config is malformed (this is a
    /// compile-time guarantee since the configs are embedded).
    #[must_use]
    pub fn embedded() -> Self {
        let schemas = SCHEMA_TOMLS
            .iter()
            .map(|(name, toml_str)| {
                parse_schema_toml(toml_str)
                    .unwrap_or_else(|e| panic!("Failed to parse schema '{name}.toml': {e}"))
            })
            .collect();
        Self::from_schemas(schemas)
            .unwrap_or_else(|e| panic!("Invalid embedded schema registry: {e}"))
    }

    /// Builds a registry from explicit schemas. The first schema is the
    /// default variant.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the list is empty, a variant repeats, or
    /// any schema is invalid.
    pub fn from_schemas(schemas: Vec<ModelSchema>) -> Result<Self, RegistryError> {
        if schemas.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = BTreeSet::new();
        for schema in &schemas {
            validate_schema(schema)?;
            if !seen.insert(&schema.variant) {
                return Err(RegistryError::DuplicateVariant {
                    variant: schema.variant.to_string(),
                });
            }
        }

        Ok(Self { schemas })
    }

    /// Returns the schema for `variant`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownVariantError`] if no schema is registered for it.
    pub fn schema_for(&self, variant: &str) -> Result<&ModelSchema, UnknownVariantError> {
        self.schemas
            .iter()
            .find(|s| s.variant.as_str() == variant)
            .ok_or_else(|| UnknownVariantError {
                variant: variant.to_string(),
            })
    }

    /// Returns the registered variants in registration order.
    pub fn variants(&self) -> impl Iterator<Item = &ModelVariant> {
        self.schemas.iter().map(|s| &s.variant)
    }

    /// Returns every registered schema in registration order.
    #[must_use]
    pub fn schemas(&self) -> &[ModelSchema] {
        &self.schemas
    }

    /// Returns the variant selected when nothing else has been chosen.
    #[must_use]
    pub fn default_variant(&self) -> &ModelVariant {
        // `from_schemas` rejects empty lists.
        &self.schemas[0].variant
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::embedded()
    }
}
