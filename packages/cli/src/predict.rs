//! `predict` subcommand.

use std::sync::Arc;

use bike_recovery_cli_utils::{MultiProgress, OptionsProgress, request_spinner};
use bike_recovery_http::ApiConfig;
use bike_recovery_mapping::MappingFetcher;
use bike_recovery_mapping::cache::MappingCache;
use bike_recovery_mapping::registry::SchemaRegistry;
use bike_recovery_prediction::client::PredictionClient;
use bike_recovery_prediction::form::PredictionForm;
use bike_recovery_prediction::models::PredictionResponse;

/// Builds a payload from `FIELD=VALUE` assignments and submits it.
pub async fn run(
    multi: &MultiProgress,
    config: ApiConfig,
    fetcher: Arc<dyn MappingFetcher>,
    variant: &str,
    assignments: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = SchemaRegistry::embedded();
    let mut form = PredictionForm::with_default_variant(&registry);
    form.switch_variant(&registry, variant)?;

    let schema = registry.schema_for(variant)?;
    for assignment in assignments {
        let (field, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("expected FIELD=VALUE, got '{assignment}'"))?;
        let field = field.trim();
        if schema.field(field).is_none() {
            log::warn!("{field} is not a {variant} field, ignoring");
            continue;
        }
        form.set(field, value);
    }

    let cache = MappingCache::new(fetcher);
    let options = cache
        .load_variant(schema, &OptionsProgress::new(multi))
        .await;

    let payload = form.build_payload(&registry, &options)?;

    let client = PredictionClient::new(config)?;
    let spinner = request_spinner(multi, "Submitting prediction");
    let response = client.submit(&payload).await;
    spinner.finish_and_clear();

    print_response(&response?);
    Ok(())
}

fn print_response(response: &PredictionResponse) {
    println!(
        "Recovery likelihood: {:.1}% ({})",
        response.recovered_probability_percent,
        response.likelihood_label()
    );
    if let Some(prediction) = &response.prediction {
        println!("Prediction:          {prediction}");
    }
    if let Some(probability) = &response.probability {
        println!(
            "Probability:         recovered {:.3}, not recovered {:.3}",
            probability.recovered, probability.not_recovered
        );
    }
    if let Some(version) = &response.model_version {
        println!("Model:               {version}");
    }

    if !response.advice.is_empty() {
        println!();
        println!("Advice:");
        for line in &response.advice {
            println!("  - {line}");
        }
    }

    if !response.features_used.is_empty() {
        println!();
        println!("Features used: {}", response.features_used.join(", "));
    }
}
