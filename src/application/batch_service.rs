// Batch inference service - Turn a full window of readings into a prediction
use crate::application::alert_service::AlertDispatcher;
use crate::application::error::ServiceError;
use crate::application::inference::ForecastModel;
use crate::application::reading_repository::{PredictionRepository, ReadingRepository};
use crate::domain::prediction::Prediction;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 60;

#[derive(Clone)]
pub struct BatchInferenceTrigger {
    readings: Arc<dyn ReadingRepository>,
    predictions: Arc<dyn PredictionRepository>,
    model: Arc<dyn ForecastModel>,
    alerts: AlertDispatcher,
    batch_size: usize,
    // Serializes batch extraction so two triggers never claim the same readings
    running: Arc<Mutex<()>>,
}

impl BatchInferenceTrigger {
    pub fn new(
        readings: Arc<dyn ReadingRepository>,
        predictions: Arc<dyn PredictionRepository>,
        model: Arc<dyn ForecastModel>,
        alerts: AlertDispatcher,
        batch_size: usize,
    ) -> Self {
        Self {
            readings,
            predictions,
            model,
            alerts,
            batch_size,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run one batch over the oldest unprocessed readings of `topic`.
    ///
    /// Returns `Ok(None)` without side effects when fewer than a full batch
    /// is available. The prediction is persisted before its readings are
    /// marked processed, so a failure in between can only re-offer those
    /// readings to a later batch, never lose a completed inference.
    pub async fn run_batch(&self, topic: &str) -> Result<Option<Prediction>, ServiceError> {
        let _guard = self.running.lock().await;

        let batch = self.readings.oldest_unprocessed(topic, self.batch_size).await?;
        if batch.len() < self.batch_size {
            tracing::warn!(
                topic = %topic,
                available = batch.len(),
                required = self.batch_size,
                "Not enough unprocessed readings for a batch"
            );
            return Ok(None);
        }

        let mut values = Vec::with_capacity(self.batch_size);
        let mut ids: Vec<Uuid> = Vec::with_capacity(self.batch_size);
        for reading in &batch {
            if let Some(value) = reading.numeric_value() {
                values.push(value);
                ids.push(reading.id);
            }
        }
        if values.len() != self.batch_size {
            tracing::warn!(topic = %topic, usable = values.len(), "Batch contains non-numeric readings, skipping");
            return Ok(None);
        }

        tracing::info!(topic = %topic, count = values.len(), "Sending batch to forecast model");
        let result = match self.model.predict(&values).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Forecast inference failed");
                return Err(e.into());
            }
        };

        let prediction = Prediction::new(values, result, ids);
        self.predictions.insert_prediction(&prediction).await?;

        let marked = self.readings.mark_processed(&prediction.source_reading_ids).await?;
        if marked != prediction.source_reading_ids.len() {
            tracing::warn!(
                prediction_id = %prediction.id,
                marked,
                expected = prediction.source_reading_ids.len(),
                "Some batch readings were already processed"
            );
        }

        tracing::info!(
            prediction_id = %prediction.id,
            forecast = %prediction.result.forecast,
            "Prediction completed and stored"
        );

        let _ = self.alerts.dispatch_prediction(&prediction);
        Ok(Some(prediction))
    }
}
