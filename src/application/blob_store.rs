// Blob store capability for captured and uploaded images
use crate::domain::image::{Metadata, NewImage, StoredImage};
use crate::domain::paging::{Page, PageRequest};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Invalid image id: {0}")]
    InvalidId(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Filter applied when listing images
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    /// Only images whose metadata `source` equals this tag
    pub source: Option<String>,
}

impl ImageFilter {
    pub fn matches(&self, image: &StoredImage) -> bool {
        match &self.source {
            Some(source) => image
                .metadata
                .get("source")
                .and_then(|v| v.as_str())
                .is_some_and(|s| s == source),
            None => true,
        }
    }
}

/// Validate the textual form of an image id
pub fn parse_image_id(id: &str) -> Result<Uuid, BlobError> {
    Uuid::parse_str(id.trim()).map_err(|_| BlobError::InvalidId(id.to_string()))
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, image: NewImage) -> Result<StoredImage, BlobError>;

    /// Payload bytes together with the stored descriptor
    async fn get(&self, id: &str) -> Result<(Vec<u8>, StoredImage), BlobError>;

    async fn delete(&self, id: &str) -> Result<(), BlobError>;

    /// Newest first
    async fn list(&self, filter: &ImageFilter, page: PageRequest) -> Result<Page<StoredImage>, BlobError>;

    /// Read-merge-write of the metadata map; not atomic against concurrent writers
    async fn merge_metadata(&self, id: &str, fields: Metadata) -> Result<StoredImage, BlobError>;
}
