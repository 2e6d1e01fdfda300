// HTTP snapshot camera
use crate::application::inference::{Frame, FrameSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpCamera {
    client: reqwest::Client,
    capture_url: String,
}

impl HttpCamera {
    pub fn new(capture_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create camera HTTP client")?;
        Ok(Self { client, capture_url })
    }
}

#[async_trait]
impl FrameSource for HttpCamera {
    async fn capture(&self) -> Result<Frame> {
        let resp = self
            .client
            .get(&self.capture_url)
            .send()
            .await
            .with_context(|| format!("Failed to reach camera at {}", self.capture_url))?;

        if !resp.status().is_success() {
            anyhow::bail!("Camera returned status {}", resp.status());
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let data = resp.bytes().await.context("Failed to read camera frame")?;
        if data.is_empty() {
            anyhow::bail!("Camera returned an empty frame");
        }

        Ok(Frame {
            data: data.to_vec(),
            content_type,
        })
    }
}
