// Capture service - Periodic camera capture, storage and person detection
use crate::application::alert_service::AlertDispatcher;
use crate::application::blob_store::BlobStore;
use crate::application::inference::{DetectionModel, FrameSource};
use crate::domain::alert::Alert;
use crate::domain::image::{DetectionSummary, NewImage, base_metadata};
use crate::infrastructure::mime::resolve_content_type;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Delay between the end of one tick and the start of the next
    pub interval: Duration,
    /// Value of the `source` metadata field on stored frames
    pub source_tag: String,
    /// Detections on this camera are reported as intrusions
    pub restricted: bool,
}

/// What one capture tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Nothing was stored
    CaptureFailed(String),
    /// The frame was stored but not analysed
    DetectionFailed { image_id: Uuid, reason: String },
    Analysed {
        image_id: Uuid,
        summary: DetectionSummary,
        alert: Option<Alert>,
    },
}

pub struct CaptureLoop {
    camera: Arc<dyn FrameSource>,
    detector: Arc<dyn DetectionModel>,
    images: Arc<dyn BlobStore>,
    alerts: AlertDispatcher,
    settings: CaptureSettings,
}

impl CaptureLoop {
    pub fn new(
        camera: Arc<dyn FrameSource>,
        detector: Arc<dyn DetectionModel>,
        images: Arc<dyn BlobStore>,
        alerts: AlertDispatcher,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            camera,
            detector,
            images,
            alerts,
            settings,
        }
    }

    /// Tick, sleep, repeat until shutdown. Ticks never overlap: a slow tick
    /// stretches the effective period instead.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.settings.interval.as_secs(), "Capture loop started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.tick().await {
                TickOutcome::CaptureFailed(reason) => {
                    tracing::warn!(reason = %reason, "Capture failed, skipping tick");
                }
                TickOutcome::DetectionFailed { image_id, reason } => {
                    tracing::warn!(image_id = %image_id, reason = %reason, "Detection failed for stored frame");
                }
                TickOutcome::Analysed { image_id, summary, alert } => {
                    tracing::info!(
                        image_id = %image_id,
                        total_persons = summary.total_persons,
                        alert = alert.as_ref().map(Alert::kind).unwrap_or("none"),
                        "Capture tick completed"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        tracing::info!("Capture loop stopped");
    }

    /// One capture-store-detect-merge cycle
    pub async fn tick(&self) -> TickOutcome {
        let frame = match self.camera.capture().await {
            Ok(frame) => frame,
            Err(e) => return TickOutcome::CaptureFailed(e.to_string()),
        };

        let captured_at = Utc::now();
        let filename = format!("captura_{}.jpg", captured_at.format("%Y%m%d_%H%M%S"));
        let content_type = resolve_content_type(frame.content_type.as_deref(), &filename, "image/jpeg");

        let mut metadata = base_metadata(&content_type, captured_at);
        metadata.insert("source".into(), json!(self.settings.source_tag));
        metadata.insert("capture_timestamp".into(), json!(captured_at.to_rfc3339()));

        let stored = match self
            .images
            .put(NewImage {
                data: frame.data.clone(),
                filename,
                content_type,
                metadata,
            })
            .await
        {
            Ok(stored) => stored,
            Err(e) => return TickOutcome::CaptureFailed(format!("failed to store frame: {}", e)),
        };
        tracing::debug!(image_id = %stored.id, size = stored.size, "Frame stored");

        let detection = match self.detector.detect(&frame.data).await {
            Ok(detection) => detection,
            Err(e) => {
                return TickOutcome::DetectionFailed {
                    image_id: stored.id,
                    reason: e.to_string(),
                };
            }
        };

        let summary = detection.summary;
        if let Err(e) = self
            .images
            .merge_metadata(&stored.id.to_string(), summary.to_metadata(Utc::now()))
            .await
        {
            tracing::error!(image_id = %stored.id, error = %e, "Failed to merge detection metadata");
        }

        let alert = self
            .alerts
            .dispatch_detection(stored.id, &summary, self.settings.restricted)
            .map(|(alert, _)| alert);

        TickOutcome::Analysed {
            image_id: stored.id,
            summary,
            alert,
        }
    }
}
