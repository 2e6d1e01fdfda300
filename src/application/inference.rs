// Inference and camera capabilities
use crate::domain::image::DetectionResult;
use crate::domain::prediction::ForecastResult;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Expected exactly {expected} input values, got {actual}")]
    InputCount { expected: usize, actual: usize },

    #[error("Inference request failed: {0}")]
    Request(String),

    #[error("Inference request timed out")]
    Timeout,

    #[error("Inference service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InferenceError::Timeout
        } else {
            InferenceError::Request(e.to_string())
        }
    }
}

/// Numeric forecasting model fed with one batch of readings
#[async_trait]
pub trait ForecastModel: Send + Sync {
    async fn predict(&self, values: &[f64]) -> Result<ForecastResult, InferenceError>;
}

/// Object detection model fed with one camera frame
#[async_trait]
pub trait DetectionModel: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult, InferenceError>;
}

/// A single captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> anyhow::Result<Frame>;
}
