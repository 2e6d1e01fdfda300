// Presentation layer - HTTP handlers and routing
pub mod app_state;
pub mod error;
pub mod handlers;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    delete_image, get_image, health_check, list_images, list_predictions, list_readings, mqtt_status,
    process_temperatures, receive_reading, upload_image,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/mensaje", post(receive_reading))
        .route("/api/mensajes", get(list_readings))
        .route("/api/predicciones", get(list_predictions))
        .route("/api/procesar-temperaturas", post(process_temperatures))
        .route("/api/mqtt/status", get(mqtt_status))
        .route("/api/upload", post(upload_image))
        .route("/api/images", get(list_images))
        .route("/api/image/:id", get(get_image).delete(delete_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
