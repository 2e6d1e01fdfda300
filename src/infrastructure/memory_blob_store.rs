// In-memory blob store for captured and uploaded images
use crate::application::blob_store::{BlobError, BlobStore, ImageFilter, parse_image_id};
use crate::domain::image::{Metadata, NewImage, StoredImage};
use crate::domain::paging::{Page, PageRequest};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
struct Entry {
    seq: u64,
    data: Vec<u8>,
    image: StoredImage,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Uuid, Entry>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    inner: RwLock<Inner>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, image: NewImage) -> Result<StoredImage, BlobError> {
        let stored = StoredImage {
            id: Uuid::new_v4(),
            filename: image.filename,
            content_type: image.content_type,
            size: image.data.len(),
            uploaded_at: Utc::now(),
            metadata: image.metadata,
        };

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            stored.id,
            Entry {
                seq,
                data: image.data,
                image: stored.clone(),
            },
        );
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<(Vec<u8>, StoredImage), BlobError> {
        let key = parse_image_id(id)?;
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&key)
            .map(|entry| (entry.data.clone(), entry.image.clone()))
            .ok_or_else(|| BlobError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), BlobError> {
        let key = parse_image_id(id)?;
        self.inner
            .write()
            .await
            .entries
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &ImageFilter, page: PageRequest) -> Result<Page<StoredImage>, BlobError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|entry| filter.matches(&entry.image))
            .collect();
        matching.sort_by(|a, b| b.image.uploaded_at.cmp(&a.image.uploaded_at).then(b.seq.cmp(&a.seq)));

        let total = matching.len();
        let data = page.apply(matching.into_iter().map(|entry| entry.image.clone()));
        Ok(Page::new(total, page, data))
    }

    async fn merge_metadata(&self, id: &str, fields: Metadata) -> Result<StoredImage, BlobError> {
        let key = parse_image_id(id)?;

        // read
        let mut metadata = {
            let inner = self.inner.read().await;
            let entry = inner
                .entries
                .get(&key)
                .ok_or_else(|| BlobError::NotFound(id.to_string()))?;
            entry.image.metadata.clone()
        };

        // merge
        metadata.extend(fields);

        // write
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .get_mut(&key)
            .ok_or_else(|| BlobError::NotFound(id.to_string()))?;
        entry.image.metadata = metadata;
        Ok(entry.image.clone())
    }
}
