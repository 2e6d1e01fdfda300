// Image service - Upload, fetch, list and delete stored images
use crate::application::blob_store::{BlobStore, ImageFilter};
use crate::application::error::ServiceError;
use crate::domain::image::{Metadata, NewImage, StoredImage, base_metadata};
use crate::domain::paging::{Page, PageRequest};
use crate::infrastructure::mime::resolve_content_type;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct ImageService {
    store: Arc<dyn BlobStore>,
}

impl ImageService {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Store an uploaded image. `metadata_json`, when present, must be a JSON
    /// object; its fields are layered over the base metadata.
    pub async fn upload(
        &self,
        filename: &str,
        declared_type: Option<&str>,
        data: Vec<u8>,
        metadata_json: Option<&str>,
    ) -> Result<StoredImage, ServiceError> {
        if filename.trim().is_empty() {
            return Err(ServiceError::Validation("The uploaded file has no name".into()));
        }

        let extra = match metadata_json {
            Some(raw) if !raw.trim().is_empty() => parse_metadata(raw)?,
            _ => Metadata::new(),
        };

        let content_type = resolve_content_type(declared_type, filename, "application/octet-stream");
        let mut metadata = base_metadata(&content_type, Utc::now());
        metadata.extend(extra);

        let stored = self
            .store
            .put(NewImage {
                data,
                filename: filename.to_string(),
                content_type,
                metadata,
            })
            .await?;

        tracing::info!(image_id = %stored.id, filename = %stored.filename, size = stored.size, "Image stored");
        Ok(stored)
    }

    pub async fn get(&self, id: &str) -> Result<(Vec<u8>, StoredImage), ServiceError> {
        Ok(self.store.get(id).await?)
    }

    /// Newest first, optionally only images tagged with `source`
    pub async fn list(&self, source: Option<&str>, page: PageRequest) -> Result<Page<StoredImage>, ServiceError> {
        let filter = ImageFilter {
            source: source.map(str::to_string),
        };
        Ok(self.store.list(&filter, page).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.store.delete(id).await?;
        tracing::info!(image_id = %id, "Image deleted");
        Ok(())
    }
}

fn parse_metadata(raw: &str) -> Result<Metadata, ServiceError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServiceError::Validation("Metadata must be a JSON object".into())),
        Err(_) => Err(ServiceError::Validation("Metadata is not valid JSON".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_blob_store::InMemoryBlobStore;
    use serde_json::json;
    use uuid::Uuid;

    fn service() -> ImageService {
        ImageService::new(Arc::new(InMemoryBlobStore::new()))
    }

    #[tokio::test]
    async fn test_upload_then_fetch_round_trip() {
        let service = service();
        let bytes = vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3];

        let stored = service
            .upload("plant.png", Some("image/png"), bytes.clone(), Some(r#"{"greenhouse": "north"}"#))
            .await
            .unwrap();
        let (data, fetched) = service.get(&stored.id.to_string()).await.unwrap();

        assert_eq!(data, bytes);
        assert_eq!(fetched.content_type, "image/png");
        assert_eq!(fetched.metadata["greenhouse"], json!("north"));
        assert_eq!(fetched.metadata["content_type"], json!("image/png"));
    }

    #[tokio::test]
    async fn test_content_type_guessed_from_extension() {
        let service = service();
        let stored = service
            .upload("leaf.webp", Some("application/octet-stream"), vec![1, 2, 3], None)
            .await
            .unwrap();
        assert_eq!(stored.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let service = service();
        assert!(matches!(
            service.upload("", None, vec![1], None).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.upload("a.jpg", None, vec![1], Some("{not json")).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.upload("a.jpg", None, vec![1], Some("[1, 2]")).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_source() {
        let service = service();
        service
            .upload("a.jpg", None, vec![1], Some(r#"{"source": "esp32cam"}"#))
            .await
            .unwrap();
        service.upload("b.jpg", None, vec![2], None).await.unwrap();

        let camera = service.list(Some("esp32cam"), PageRequest::default()).await.unwrap();
        assert_eq!(camera.total, 1);
        assert_eq!(camera.data[0].filename, "a.jpg");
        assert_eq!(service.list(None, PageRequest::default()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_delete_distinguishes_malformed_and_missing() {
        let service = service();
        assert!(matches!(service.delete("xyz").await, Err(ServiceError::Validation(_))));
        assert!(matches!(
            service.delete(&Uuid::new_v4().to_string()).await,
            Err(ServiceError::NotFound(_))
        ));

        let stored = service.upload("a.jpg", None, vec![1], None).await.unwrap();
        service.delete(&stored.id.to_string()).await.unwrap();
        assert!(matches!(
            service.get(&stored.id.to_string()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
