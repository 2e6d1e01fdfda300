// HTTP client for the temperature forecasting model
use crate::application::inference::{ForecastModel, InferenceError};
use crate::domain::prediction::ForecastResult;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ForecastRequest<'a> {
    temperaturas: &'a [f64],
}

pub struct HttpForecastModel {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    batch_size: usize,
}

impl HttpForecastModel {
    pub fn new(url: String, api_key: Option<String>, batch_size: usize, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create forecast HTTP client")?;

        Ok(Self {
            client,
            url,
            api_key: api_key.filter(|key| !key.is_empty()),
            batch_size,
        })
    }
}

#[async_trait]
impl ForecastModel for HttpForecastModel {
    async fn predict(&self, values: &[f64]) -> Result<ForecastResult, InferenceError> {
        if values.len() != self.batch_size {
            return Err(InferenceError::InputCount {
                expected: self.batch_size,
                actual: values.len(),
            });
        }

        let mut request = self
            .client
            .post(&self.url)
            .json(&ForecastRequest { temperaturas: values });
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        tracing::debug!(url = %self.url, count = values.len(), "Sending forecast request");
        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
        parse_forecast_response(body)
    }
}

/// Extract `body.prediccion`. The model gateway sometimes wraps `body` as a
/// JSON-encoded string.
pub fn parse_forecast_response(response: Value) -> Result<ForecastResult, InferenceError> {
    let body = match response.get("body") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .map_err(|e| InferenceError::MalformedResponse(format!("body is not JSON: {}", e)))?,
        Some(body @ Value::Object(_)) => body.clone(),
        Some(_) => return Err(InferenceError::MalformedResponse("body is not an object".into())),
        None => return Err(InferenceError::MalformedResponse("missing body".into())),
    };

    let forecast = body
        .get("prediccion")
        .cloned()
        .ok_or_else(|| InferenceError::MalformedResponse("missing body.prediccion".into()))?;

    Ok(ForecastResult::new(forecast, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object_body() {
        let result = parse_forecast_response(json!({"statusCode": 200, "body": {"prediccion": [31.4]}})).unwrap();
        assert_eq!(result.forecast_value(), Some(31.4));
        assert_eq!(result.raw_response["statusCode"], json!(200));
    }

    #[test]
    fn test_parse_string_body() {
        let result = parse_forecast_response(json!({"body": "{\"prediccion\": 18.2}"})).unwrap();
        assert_eq!(result.forecast_value(), Some(18.2));
    }

    #[test]
    fn test_parse_rejects_missing_prediction() {
        assert!(matches!(
            parse_forecast_response(json!({"body": {"other": 1}})),
            Err(InferenceError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_forecast_response(json!({"prediccion": 1})),
            Err(InferenceError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_input_count_is_rejected_before_sending() {
        let model = HttpForecastModel::new("http://127.0.0.1:9/predict".into(), None, 60, Duration::from_secs(1)).unwrap();
        let err = model.predict(&[20.0; 59]).await.unwrap_err();
        assert!(matches!(err, InferenceError::InputCount { expected: 60, actual: 59 }));
    }
}
