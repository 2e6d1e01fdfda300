// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::application::alert_service::{AlertDispatcher, AlertTopics};
use crate::application::batch_service::BatchInferenceTrigger;
use crate::application::capture_service::{CaptureLoop, CaptureSettings};
use crate::application::image_service::ImageService;
use crate::application::ingest_service::{IngestService, IngestTopics};
use crate::infrastructure::config::load_config;
use crate::infrastructure::detection_client::HttpDetectionModel;
use crate::infrastructure::forecast_client::HttpForecastModel;
use crate::infrastructure::http_camera::HttpCamera;
use crate::infrastructure::memory_blob_store::InMemoryBlobStore;
use crate::infrastructure::memory_repository::InMemoryRepository;
use crate::infrastructure::mqtt_transport::{RumqttConnector, TransportClient, TransportSettings, qos_from_level};
use crate::presentation::app_state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_config()?;
    let shutdown = CancellationToken::new();

    // Storage (infrastructure layer)
    let repository = Arc::new(InMemoryRepository::new());
    let images = Arc::new(InMemoryBlobStore::new());

    // Broker transport
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let connector = Arc::new(RumqttConnector::new(
        config.mqtt.host.clone(),
        config.mqtt.port,
        config.mqtt.client_id.clone(),
        config.mqtt.keep_alive(),
        config.mqtt.connect_timeout(),
        config.mqtt.subscribe.clone(),
    ));
    let transport = TransportClient::new(
        connector,
        TransportSettings {
            retry_backoff: config.mqtt.reconnect_backoff(),
            publish_wait: config.mqtt.publish_wait(),
            qos: qos_from_level(config.mqtt.qos),
            notification_topic: config.pipeline.notification_topic.clone(),
        },
        inbound_tx,
    );
    let publisher = Arc::new(transport.clone());

    // Inference backends
    let forecast = Arc::new(HttpForecastModel::new(
        config.forecast.url.clone(),
        config.forecast.api_key.clone(),
        config.pipeline.batch_size,
        config.forecast.timeout(),
    )?);
    let detector = Arc::new(HttpDetectionModel::new(
        config.detection.url.clone(),
        config.detection.api_key.clone(),
        config.detection.timeout(),
    )?);
    let camera = Arc::new(HttpCamera::new(config.camera.capture_url.clone(), config.camera.timeout())?);

    // Services (application layer)
    let alerts = AlertDispatcher::new(
        publisher.clone(),
        AlertTopics {
            temperature: config.pipeline.temperature_alert_topic.clone(),
            person: config.pipeline.person_alert_topic.clone(),
        },
    );
    let trigger = BatchInferenceTrigger::new(
        repository.clone(),
        repository.clone(),
        forecast,
        alerts.clone(),
        config.pipeline.batch_size,
    );
    let ingest_service = IngestService::new(
        repository.clone(),
        repository.clone(),
        publisher,
        trigger,
        IngestTopics {
            temperature: config.pipeline.temperature_topic.clone(),
            notification: config.pipeline.notification_topic.clone(),
            location: config.pipeline.location.clone(),
        },
    );
    let image_service = ImageService::new(images.clone());
    let capture = CaptureLoop::new(
        camera,
        detector,
        images,
        alerts,
        CaptureSettings {
            interval: config.camera.interval(),
            source_tag: config.camera.source_tag.clone(),
            restricted: config.camera.restricted,
        },
    );

    // Background tasks
    transport.connect().await;
    let bridge = tokio::spawn(ingest_service.clone().consume(inbound_rx, shutdown.clone()));
    let capture_task = tokio::spawn(capture.run(shutdown.clone()));

    // Build router (presentation layer)
    let state = Arc::new(AppState {
        ingest_service,
        image_service,
    });
    let router = presentation::router(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!(addr = %addr, broker = %transport.state().broker_address, "Starting greenhouse telemetry service");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    // Drain background work
    shutdown.cancel();
    transport.close().await;
    for (name, task) in [("bridge", bridge), ("capture", capture_task)] {
        if let Err(e) = task.await {
            tracing::warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Service stopped");
    Ok(())
}
