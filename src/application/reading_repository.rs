// Repository traits for reading and prediction records
use crate::domain::paging::{Page, PageRequest};
use crate::domain::prediction::Prediction;
use crate::domain::reading::Reading;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Persist a reading; no deduplication
    async fn insert_reading(&self, reading: &Reading) -> anyhow::Result<()>;

    /// Count unprocessed readings on a topic that carry a numeric value
    async fn count_unprocessed(&self, topic: &str) -> anyhow::Result<usize>;

    /// Oldest unprocessed numeric readings on a topic, by receipt time then insertion order
    async fn oldest_unprocessed(&self, topic: &str, limit: usize) -> anyhow::Result<Vec<Reading>>;

    /// Flag readings as consumed by a batch. Returns how many flipped from unprocessed.
    async fn mark_processed(&self, ids: &[Uuid]) -> anyhow::Result<usize>;

    /// Newest first, optionally restricted to one topic
    async fn list_readings(&self, topic: Option<&str>, page: PageRequest) -> anyhow::Result<Page<Reading>>;

    async fn count_received_since(&self, since: DateTime<Utc>) -> anyhow::Result<usize>;

    async fn latest_reading(&self) -> anyhow::Result<Option<Reading>>;
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn insert_prediction(&self, prediction: &Prediction) -> anyhow::Result<()>;

    /// Newest first
    async fn list_predictions(&self, page: PageRequest) -> anyhow::Result<Page<Prediction>>;

    async fn count_predictions(&self) -> anyhow::Result<usize>;
}
