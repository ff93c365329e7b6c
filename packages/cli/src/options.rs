//! `options` and `schema` subcommands.

use std::sync::Arc;

use bike_recovery_cli_utils::{MultiProgress, OptionsProgress};
use bike_recovery_mapping::MappingFetcher;
use bike_recovery_mapping::cache::MappingCache;
use bike_recovery_mapping::models::{FieldKind, FieldSchema};
use bike_recovery_mapping::registry::SchemaRegistry;

/// Loads every categorical field of `variant` and prints its options.
pub async fn print_options(
    multi: &MultiProgress,
    fetcher: Arc<dyn MappingFetcher>,
    variant: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = SchemaRegistry::embedded();
    let schema = registry.schema_for(variant)?;
    let cache = MappingCache::new(fetcher);

    let options = cache
        .load_variant(schema, &OptionsProgress::new(multi))
        .await;

    for field in schema.categorical_fields() {
        let Some(entries) = options.options.get(&field.name) else {
            continue;
        };
        println!("{} ({})", field.label, field.name);
        for entry in entries.iter() {
            println!("  {:>5}  {}", entry.value, entry.label);
        }
        println!();
    }

    if options.is_complete() {
        Ok(())
    } else {
        Err(format!(
            "{} of {} option lists failed to load",
            options.failures.len(),
            schema.categorical_fields().count()
        )
        .into())
    }
}

/// Prints the fields of `variant` in schema order.
pub fn print_schema(variant: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = SchemaRegistry::embedded();
    let schema = registry.schema_for(variant)?;

    println!("{} ({})", schema.name, schema.variant);
    println!("{:<20} {:<28} {:<12} RULES", "FIELD", "LABEL", "KIND");
    println!("{}", "-".repeat(80));
    for field in &schema.fields {
        println!(
            "{:<20} {:<28} {:<12} {}",
            field.name,
            field.label,
            kind_name(field),
            rules(field)
        );
    }

    Ok(())
}

fn kind_name(field: &FieldSchema) -> String {
    match &field.kind {
        FieldKind::Categorical { .. } => "categorical".to_string(),
        FieldKind::Numeric { format, .. } => format.to_string(),
    }
}

fn rules(field: &FieldSchema) -> String {
    let mut rules = Vec::new();
    match &field.kind {
        FieldKind::Categorical { .. } => {
            if let Some(source) = field.mapping_source() {
                rules.push(format!("options from {source}"));
            }
        }
        FieldKind::Numeric { min, max, .. } => {
            if let Some(min) = min {
                rules.push(format!(">= {min}"));
            }
            if let Some(max) = max {
                rules.push(format!("<= {max}"));
            }
        }
    }
    if let Some(placeholder) = &field.placeholder {
        rules.push(format!("({placeholder})"));
    }
    rules.join(" ")
}
