// In-memory repository implementation for readings and predictions
use crate::application::reading_repository::{PredictionRepository, ReadingRepository};
use crate::domain::paging::{Page, PageRequest};
use crate::domain::prediction::Prediction;
use crate::domain::reading::Reading;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Readings and predictions kept in insertion order. Each write is atomic
/// with respect to other single-record writes.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    readings: RwLock<Vec<Reading>>,
    predictions: RwLock<Vec<Prediction>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_batch_candidate(reading: &Reading, topic: &str) -> bool {
        !reading.processed && reading.topic == topic && reading.numeric_value().is_some()
    }

    /// Newest first; on equal timestamps the later insertion wins
    fn newest_first<T>(items: &[T], at: impl Fn(&T) -> DateTime<Utc>) -> Vec<&T> {
        let mut indexed: Vec<(usize, &T)> = items.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| at(b).cmp(&at(a)).then(ib.cmp(ia)));
        indexed.into_iter().map(|(_, item)| item).collect()
    }
}

#[async_trait]
impl ReadingRepository for InMemoryRepository {
    async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        self.readings.write().await.push(reading.clone());
        Ok(())
    }

    async fn count_unprocessed(&self, topic: &str) -> Result<usize> {
        let readings = self.readings.read().await;
        Ok(readings
            .iter()
            .filter(|r| Self::is_batch_candidate(r, topic))
            .count())
    }

    async fn oldest_unprocessed(&self, topic: &str, limit: usize) -> Result<Vec<Reading>> {
        let readings = self.readings.read().await;
        let mut candidates: Vec<&Reading> = readings
            .iter()
            .filter(|r| Self::is_batch_candidate(r, topic))
            .collect();
        // stable sort keeps insertion order for equal timestamps
        candidates.sort_by_key(|r| r.received_at);
        Ok(candidates.into_iter().take(limit).cloned().collect())
    }

    async fn mark_processed(&self, ids: &[Uuid]) -> Result<usize> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let mut readings = self.readings.write().await;
        let mut marked = 0;
        for reading in readings.iter_mut() {
            if !reading.processed && wanted.contains(&reading.id) {
                reading.processed = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn list_readings(&self, topic: Option<&str>, page: PageRequest) -> Result<Page<Reading>> {
        let readings = self.readings.read().await;
        let matching: Vec<Reading> = readings
            .iter()
            .filter(|r| topic.is_none_or(|t| r.topic == t))
            .cloned()
            .collect();
        let ordered = Self::newest_first(matching.as_slice(), |r| r.received_at);
        let data = page.apply(ordered.into_iter().cloned());
        Ok(Page::new(matching.len(), page, data))
    }

    async fn count_received_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let readings = self.readings.read().await;
        Ok(readings.iter().filter(|r| r.received_at >= since).count())
    }

    async fn latest_reading(&self) -> Result<Option<Reading>> {
        let readings = self.readings.read().await;
        Ok(Self::newest_first(readings.as_slice(), |r| r.received_at)
            .first()
            .map(|r| (*r).clone()))
    }
}

#[async_trait]
impl PredictionRepository for InMemoryRepository {
    async fn insert_prediction(&self, prediction: &Prediction) -> Result<()> {
        self.predictions.write().await.push(prediction.clone());
        Ok(())
    }

    async fn list_predictions(&self, page: PageRequest) -> Result<Page<Prediction>> {
        let predictions = self.predictions.read().await;
        let ordered = Self::newest_first(predictions.as_slice(), |p| p.created_at);
        let data = page.apply(ordered.into_iter().cloned());
        Ok(Page::new(predictions.len(), page, data))
    }

    async fn count_predictions(&self) -> Result<usize> {
        Ok(self.predictions.read().await.len())
    }
}
