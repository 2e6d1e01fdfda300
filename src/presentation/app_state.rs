// Application state for HTTP handlers
use crate::application::image_service::ImageService;
use crate::application::ingest_service::IngestService;

#[derive(Clone)]
pub struct AppState {
    pub ingest_service: IngestService,
    pub image_service: ImageService,
}
