// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod detection_client;
pub mod forecast_client;
pub mod http_camera;
pub mod memory_blob_store;
pub mod memory_repository;
pub mod mime;
pub mod mqtt_transport;
