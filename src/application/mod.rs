// Application layer - Pipeline use cases and capability traits
pub mod alert_service;
pub mod batch_service;
pub mod blob_store;
pub mod capture_service;
pub mod error;
pub mod image_service;
pub mod inference;
pub mod ingest_service;
pub mod publisher;
pub mod reading_repository;
