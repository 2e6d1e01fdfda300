// HTTP client for the person detection model
use crate::application::inference::{DetectionModel, InferenceError};
use crate::domain::image::{Detection, DetectionResult, DetectionSummary};
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::time::Duration;

pub struct HttpDetectionModel {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpDetectionModel {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create detection HTTP client")?;

        Ok(Self {
            client,
            url,
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl DetectionModel for HttpDetectionModel {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult, InferenceError> {
        let payload = json!({ "body": { "image": STANDARD.encode(image) } });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        tracing::debug!(url = %self.url, size = image.len(), "Sending detection request");
        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let response: Value = resp
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
        parse_detection_response(response)
    }
}

/// Accepts either `{statusCode, body}` envelopes (body as object or JSON
/// string) or a bare body object. A missing `detections` list means no
/// detections.
pub fn parse_detection_response(response: Value) -> Result<DetectionResult, InferenceError> {
    let Value::Object(envelope) = &response else {
        return Err(InferenceError::MalformedResponse("response is not an object".into()));
    };

    if let Some(code) = envelope.get("statusCode") {
        let code = code.as_u64().unwrap_or_default();
        if code != 200 {
            return Err(InferenceError::Status {
                status: u16::try_from(code).unwrap_or(u16::MAX),
                body: envelope.get("body").map(Value::to_string).unwrap_or_default(),
            });
        }
    }

    let body = match envelope.get("body") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .map_err(|e| InferenceError::MalformedResponse(format!("body is not JSON: {}", e)))?,
        Some(body @ Value::Object(_)) => body.clone(),
        Some(_) => return Err(InferenceError::MalformedResponse("body is not an object".into())),
        None if envelope.contains_key("statusCode") => {
            return Err(InferenceError::MalformedResponse("missing body".into()));
        }
        None => response.clone(),
    };

    let detections: Vec<Detection> = match body.get("detections") {
        Some(list) => serde_json::from_value(list.clone())
            .map_err(|e| InferenceError::MalformedResponse(format!("bad detections: {}", e)))?,
        None => Vec::new(),
    };

    let summary = DetectionSummary::from_detections(
        detections,
        body.get("image_size").cloned(),
        body.get("processing_time").cloned(),
    );

    Ok(DetectionResult {
        summary,
        raw_response: response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope_with_string_body() {
        let body = json!({
            "detections": [
                {"class": "person", "confidence": 0.91, "bbox": [1, 2, 3, 4]},
                {"class": "bicycle", "confidence": 0.4, "bbox": [5, 6, 7, 8]}
            ],
            "image_size": [640, 480],
            "processing_time": 0.31
        });
        let response = json!({"statusCode": 200, "body": body.to_string()});

        let result = parse_detection_response(response).unwrap();
        assert!(result.summary.has_persons);
        assert_eq!(result.summary.total_persons, 1);
        assert_eq!(result.summary.persons[0].confidence, 0.91);
        assert_eq!(result.summary.image_size, Some(json!([640, 480])));
    }

    #[test]
    fn test_parse_bare_body_without_detections() {
        let result = parse_detection_response(json!({"processing_time": 0.1})).unwrap();
        assert!(!result.summary.has_persons);
        assert_eq!(result.summary.total_persons, 0);
    }

    #[test]
    fn test_parse_error_status_code() {
        let err = parse_detection_response(json!({"statusCode": 500, "body": "boom"})).unwrap_err();
        assert!(matches!(err, InferenceError::Status { status: 500, .. }));
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            parse_detection_response(json!({"statusCode": 200, "body": "not json"})),
            Err(InferenceError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_detection_response(json!([1, 2])),
            Err(InferenceError::MalformedResponse(_))
        ));
    }
}
