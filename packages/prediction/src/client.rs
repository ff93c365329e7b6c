//! Prediction submission client.

use bike_recovery_http::{ApiConfig, retry};
use bike_recovery_prediction_models::{Payload, PredictionResponse};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::PredictionError;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Submits payloads to `POST {api}/predict/{variant}`.
#[derive(Debug, Clone)]
pub struct PredictionClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl PredictionClient {
    /// Creates a client for the given config.
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

    /// Submits `payload` to the endpoint for its variant.
    ///
    /// # Errors
    ///
    /// * [`PredictionError::Network`] if no response was received
    /// * [`PredictionError::Rejected`] if the predictor returned an error
    /// * [`PredictionError::Parse`] if the response is not a prediction
    pub async fn submit(&self, payload: &Payload) -> Result<PredictionResponse, PredictionError> {
        let url = self
            .config
            .api_url(&format!("/predict/{}", payload.variant));

        log::debug!("Submitting {} prediction to {url}", payload.variant);

        // The predictor answers bad input with a 500 as well, so only
        // transport failures are worth re-sending.
        let response = retry::send_with_transport_retry(
            || self.client.post(&url).json(payload),
            self.config.max_retries,
        )
        .await
        .map_err(|e| PredictionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PredictionError::Network(e.to_string()))?;

        let prediction = decode_response(status, &body)?;
        log::info!(
            "Prediction for {}: {}% ({})",
            payload.variant,
            prediction.recovered_probability_percent,
            prediction.likelihood_label()
        );
        Ok(prediction)
    }
}

/// Interprets a prediction response. An `{ "error": ... }` body is a
/// rejection even when it arrives with a success status.
fn decode_response(status: StatusCode, body: &str) -> Result<PredictionResponse, PredictionError> {
    if let Ok(ErrorBody { error }) = serde_json::from_str(body) {
        return Err(PredictionError::Rejected {
            http_status: status.as_u16(),
            message: error,
        });
    }

    if !status.is_success() {
        return Err(PredictionError::Rejected {
            http_status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        });
    }

    serde_json::from_str(body).map_err(|e| PredictionError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bike_recovery_http::testing::ScriptedServer;
    use bike_recovery_mapping_models::ModelVariant;
    use bike_recovery_prediction_models::PayloadValue;

    use super::*;

    fn v2_payload() -> Payload {
        Payload {
            variant: ModelVariant::from("v2"),
            fields: BTreeMap::from([
                ("BIKE_COST".to_string(), PayloadValue::Float(899.5)),
                ("DIVISION".to_string(), PayloadValue::Integer(3)),
            ]),
        }
    }

    fn client_for(server: &ScriptedServer) -> PredictionClient {
        let config = ApiConfig::default()
            .with_api_base_url(server.base_url())
            .with_max_retries(2);
        PredictionClient::new(config).unwrap()
    }

    #[test]
    fn success_body_decodes() {
        let prediction = decode_response(
            StatusCode::OK,
            r#"{"prediction": 0, "recovered_probability_percent": 41.2}"#,
        )
        .unwrap();
        assert!((prediction.recovered_probability_percent - 41.2).abs() < f64::EPSILON);
    }

    #[test]
    fn error_body_is_rejected_with_its_message() {
        let err = decode_response(
            StatusCode::BAD_REQUEST,
            r#"{"error": "Missing field: OCC_DOW"}"#,
        )
        .unwrap_err();
        match err {
            PredictionError::Rejected {
                http_status,
                message,
            } => {
                assert_eq!(http_status, 400);
                assert_eq!(message, "Missing field: OCC_DOW");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn error_body_with_ok_status_is_rejected() {
        let err = decode_response(StatusCode::OK, r#"{"error": "Model not loaded"}"#).unwrap_err();
        assert!(matches!(err, PredictionError::Rejected { http_status: 200, .. }));
    }

    #[test]
    fn garbage_success_body_is_a_parse_error() {
        let err = decode_response(StatusCode::OK, "<html></html>").unwrap_err();
        assert!(matches!(err, PredictionError::Parse(_)));
    }

    #[test]
    fn non_json_failure_uses_status_reason() {
        let err = decode_response(StatusCode::SERVICE_UNAVAILABLE, "down").unwrap_err();
        assert!(
            matches!(err, PredictionError::Rejected { http_status: 503, ref message } if message == "Service Unavailable")
        );
    }

    #[tokio::test]
    async fn payload_is_posted_to_variant_endpoint() {
        let server = ScriptedServer::start(vec![(
            200,
            r#"{"prediction": 1, "recovered_probability_percent": 72.0, "modelVersion": "v2"}"#,
        )])
        .await;

        let prediction = client_for(&server).submit(&v2_payload()).await.unwrap();

        assert_eq!(prediction.model_version.as_deref(), Some("v2"));
        let requests = server.requests();
        assert_eq!(requests[0].line, "POST /predict/v2 HTTP/1.1");
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"modelVersion": "v2", "BIKE_COST": 899.5, "DIVISION": 3})
        );
    }

    #[tokio::test]
    async fn server_error_rejection_is_not_resent() {
        let server = ScriptedServer::start(vec![(
            500,
            r#"{"error": "could not convert string to float"}"#,
        )])
        .await;

        let err = client_for(&server).submit(&v2_payload()).await.unwrap_err();

        assert!(matches!(
            err,
            PredictionError::Rejected { http_status: 500, ref message }
                if message == "could not convert string to float"
        ));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_predictor_is_a_network_error() {
        let config = ApiConfig::default()
            .with_api_base_url("http://127.0.0.1:9")
            .with_max_retries(0);
        let client = PredictionClient::new(config).unwrap();
        let payload = Payload {
            variant: ModelVariant::from("v1"),
            fields: BTreeMap::new(),
        };
        let err = client.submit(&payload).await.unwrap_err();
        assert!(matches!(err, PredictionError::Network(_)));
    }
}
