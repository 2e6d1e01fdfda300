// HTTP request handlers
use crate::application::error::ServiceError;
use crate::domain::paging::{Page, PageRequest};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub topic: Option<String>,
    pub source: Option<String>,
}

impl PageQuery {
    fn page(&self) -> PageRequest {
        PageRequest::new(self.limit, self.skip)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    pub topic: Option<String>,
    #[serde(default, alias = "value")]
    pub valor: Option<Value>,
}

fn paged<T: Serialize>(page: Page<T>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "total": page.total,
        "limit": page.limit,
        "skip": page.skip,
        "data": page.data,
    }))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn receive_reading(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReadingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let topic = request
        .topic
        .ok_or_else(|| ServiceError::Validation("Field 'topic' is required".into()))?;
    let value = request
        .valor
        .ok_or_else(|| ServiceError::Validation("Field 'valor' is required".into()))?;

    let reading = state.ingest_service.ingest(&topic, value).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Reading stored",
            "id": reading.id,
            "parse_error": reading.parse_error,
        })),
    ))
}

pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ServiceError> {
    let page = state
        .ingest_service
        .list_readings(query.topic.as_deref(), query.page())
        .await?;
    Ok(paged(page))
}

pub async fn list_predictions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ServiceError> {
    Ok(paged(state.ingest_service.list_predictions(query.page()).await?))
}

/// Run a forecast batch on demand
pub async fn process_temperatures(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ServiceError> {
    let prediction = state.ingest_service.process_now().await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Prediction completed",
        "prediction": prediction,
    })))
}

pub async fn mqtt_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ServiceError> {
    let status = state.ingest_service.status().await?;
    Ok(Json(json!({
        "status": "success",
        "mqtt": status,
    })))
}

/// Multipart upload: an `image` file part and an optional `metadata` JSON part
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut image: Option<(String, Option<String>, Bytes)> = None;
    let mut metadata: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::Validation(format!("Failed to read image: {}", e)))?;
                image = Some((filename, content_type, data));
            }
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::Validation(format!("Failed to read metadata: {}", e)))?;
                metadata = Some(text);
            }
            _ => {}
        }
    }

    let (filename, content_type, data) =
        image.ok_or_else(|| ServiceError::Validation("No image file provided".into()))?;

    let stored = state
        .image_service
        .upload(&filename, content_type.as_deref(), data.to_vec(), metadata.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Image uploaded",
            "id": stored.id,
            "filename": stored.filename,
            "content_type": stored.content_type,
            "size": stored.size,
            "metadata": stored.metadata,
        })),
    ))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let (data, image) = state.image_service.get(&id).await?;
    let disposition = content_disposition(&image.filename);
    Ok((
        [
            (header::CONTENT_TYPE, image.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Bytes::from(data),
    ))
}

/// Quoted-string filename; control characters, quotes and backslashes are dropped
fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    format!("inline; filename=\"{}\"", safe)
}

pub async fn list_images(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ServiceError> {
    let page = state
        .image_service
        .list(query.source.as_deref(), query.page())
        .await?;
    Ok(paged(page))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    state.image_service.delete(&id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Image deleted",
        "id": id,
    })))
}
