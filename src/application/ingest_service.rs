// Ingest service - Store sensor readings, forward them, and trigger batches
use crate::application::batch_service::BatchInferenceTrigger;
use crate::application::error::ServiceError;
use crate::application::publisher::{InboundMessage, MessagePublisher, OutboundMessage};
use crate::application::reading_repository::{PredictionRepository, ReadingRepository};
use crate::domain::connection::ConnectionState;
use crate::domain::notification::Notification;
use crate::domain::paging::{Page, PageRequest};
use crate::domain::prediction::Prediction;
use crate::domain::reading::Reading;
use chrono::{Duration, Local, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct IngestTopics {
    /// Readings on this topic are numeric and feed the forecast batches
    pub temperature: String,
    /// Where each parsed temperature reading is forwarded
    pub notification: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastMessage {
    pub topic: String,
    pub value: Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub connection: ConnectionState,
    pub temperature_topic: String,
    pub messages_last_24h: usize,
    pub unprocessed_temperatures: usize,
    pub batch_size: usize,
    pub total_predictions: usize,
    pub last_message: Option<LastMessage>,
}

#[derive(Clone)]
pub struct IngestService {
    readings: Arc<dyn ReadingRepository>,
    predictions: Arc<dyn PredictionRepository>,
    publisher: Arc<dyn MessagePublisher>,
    trigger: BatchInferenceTrigger,
    topics: IngestTopics,
}

impl IngestService {
    pub fn new(
        readings: Arc<dyn ReadingRepository>,
        predictions: Arc<dyn PredictionRepository>,
        publisher: Arc<dyn MessagePublisher>,
        trigger: BatchInferenceTrigger,
        topics: IngestTopics,
    ) -> Self {
        Self {
            readings,
            predictions,
            publisher,
            trigger,
            topics,
        }
    }

    /// Store one reading. The record is always written, even when a
    /// temperature value cannot be parsed. A parsed temperature is forwarded
    /// to the notification topic first, then the batch threshold is checked.
    pub async fn ingest(&self, topic: &str, value: Value) -> Result<Reading, ServiceError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ServiceError::Validation("Field 'topic' is required".into()));
        }
        if value.is_null() {
            return Err(ServiceError::Validation("Field 'valor' is required".into()));
        }

        let is_temperature = topic == self.topics.temperature;
        let reading = if is_temperature {
            Reading::numeric(topic.to_string(), value, Utc::now())
        } else {
            Reading::new(topic.to_string(), value, Utc::now())
        };

        if let Some(error) = &reading.parse_error {
            tracing::warn!(topic = %topic, raw = %reading.raw_value, error = %error, "Could not parse reading value, storing raw");
        }

        self.readings.insert_reading(&reading).await?;
        tracing::info!(reading_id = %reading.id, topic = %topic, value = %reading.raw_value, "Reading stored");

        if !is_temperature {
            return Ok(reading);
        }

        if let Some(value) = reading.numeric_value() {
            self.forward_reading(&reading, value).await;
            self.check_batch().await;
        }

        Ok(reading)
    }

    async fn forward_reading(&self, reading: &Reading, value: f64) {
        let notification = Notification::new("temperatura", &self.topics.location, format!("{}", value), Local::now())
            .with_field("topic", json!(reading.topic))
            .with_field("reading_id", json!(reading.id));

        let message = OutboundMessage::Json(notification.into_json());
        if let Err(e) = self.publisher.publish(&self.topics.notification, message).await {
            tracing::warn!(reading_id = %reading.id, error = %e, "Could not forward reading notification");
        }
    }

    /// Runs batches until fewer than a full window is pending, so readings
    /// that crossed a threshold during another ingest's batch are not left behind.
    async fn check_batch(&self) {
        loop {
            let pending = match self.readings.count_unprocessed(&self.topics.temperature).await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to count unprocessed temperatures");
                    return;
                }
            };

            tracing::debug!(pending, "Unprocessed temperature readings");
            if pending < self.trigger.batch_size() {
                return;
            }

            tracing::info!(pending, "Batch threshold reached, running forecast");
            match self.trigger.run_batch(&self.topics.temperature).await {
                Ok(Some(_)) => {}
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "Batch inference failed");
                    return;
                }
            }
        }
    }

    /// Run a batch on demand; fails when a full batch is not available
    pub async fn process_now(&self) -> Result<Prediction, ServiceError> {
        let required = self.trigger.batch_size();
        let available = self.readings.count_unprocessed(&self.topics.temperature).await?;
        if available < required {
            return Err(ServiceError::InsufficientData { available, required });
        }

        self.trigger
            .run_batch(&self.topics.temperature)
            .await?
            .ok_or(ServiceError::InsufficientData { available, required })
    }

    pub async fn list_readings(&self, topic: Option<&str>, page: PageRequest) -> Result<Page<Reading>, ServiceError> {
        Ok(self.readings.list_readings(topic, page).await?)
    }

    pub async fn list_predictions(&self, page: PageRequest) -> Result<Page<Prediction>, ServiceError> {
        Ok(self.predictions.list_predictions(page).await?)
    }

    pub async fn status(&self) -> Result<PipelineStatus, ServiceError> {
        let since = Utc::now() - Duration::hours(24);
        let last_message = self.readings.latest_reading().await?.map(|r| LastMessage {
            topic: r.topic,
            value: r.raw_value,
            timestamp: r.received_at.to_rfc3339(),
        });

        Ok(PipelineStatus {
            connection: self.publisher.connection_state(),
            temperature_topic: self.topics.temperature.clone(),
            messages_last_24h: self.readings.count_received_since(since).await?,
            unprocessed_temperatures: self.readings.count_unprocessed(&self.topics.temperature).await?,
            batch_size: self.trigger.batch_size(),
            total_predictions: self.predictions.count_predictions().await?,
            last_message,
        })
    }

    /// Feed messages received on subscribed topics into `ingest` until shutdown
    pub async fn consume(self, mut inbound: mpsc::Receiver<InboundMessage>, shutdown: CancellationToken) {
        tracing::info!("Inbound reading bridge started");
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let payload = String::from_utf8_lossy(&message.payload).trim().to_string();
            if let Err(e) = self.ingest(&message.topic, Value::String(payload)).await {
                tracing::error!(topic = %message.topic, error = %e, "Failed to ingest inbound message");
            }
        }
        tracing::info!("Inbound reading bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alert_service::tests::RecordingPublisher;
    use crate::application::alert_service::{AlertDispatcher, AlertTopics};
    use crate::application::batch_service::DEFAULT_BATCH_SIZE;
    use crate::application::batch_service::tests::FixedForecast;
    use crate::domain::notification::CANONICAL_FIELDS;
    use crate::infrastructure::memory_repository::InMemoryRepository;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    struct Harness {
        service: IngestService,
        repo: Arc<InMemoryRepository>,
        model: Arc<FixedForecast>,
        publisher: Arc<RecordingPublisher>,
    }

    fn harness() -> Harness {
        let repo = Arc::new(InMemoryRepository::new());
        let model = Arc::new(FixedForecast::new(json!(24.0)));
        let publisher = Arc::new(RecordingPublisher::default());
        let alerts = AlertDispatcher::new(
            publisher.clone(),
            AlertTopics {
                temperature: "alertas/temperatura".into(),
                person: "alertas/personas".into(),
            },
        );
        let trigger = BatchInferenceTrigger::new(repo.clone(), repo.clone(), model.clone(), alerts, DEFAULT_BATCH_SIZE);
        let service = IngestService::new(
            repo.clone(),
            repo.clone(),
            publisher.clone(),
            trigger,
            IngestTopics {
                temperature: "sensor/temperatura".into(),
                notification: "sistema/notificaciones".into(),
                location: "invernadero".into(),
            },
        );
        Harness {
            service,
            repo,
            model,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_batch_fires_on_sixtieth_reading() {
        let h = harness();
        let mut ids = Vec::new();
        for i in 0..59 {
            let reading = h.service.ingest("sensor/temperatura", json!(21.0 + i as f64 * 0.1)).await.unwrap();
            ids.push(reading.id);
        }
        assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.repo.count_predictions().await.unwrap(), 0);

        let last = h.service.ingest("sensor/temperatura", json!("27.3")).await.unwrap();
        ids.push(last.id);

        assert_eq!(h.model.calls.load(Ordering::SeqCst), 1);
        let page = h.service.list_predictions(PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].source_reading_ids, ids);
        assert_eq!(h.repo.count_unprocessed("sensor/temperatura").await.unwrap(), 0);
    }

    fn assert_disjoint_batches(predictions: &[Prediction], expected: usize) -> HashSet<Uuid> {
        assert_eq!(predictions.len(), expected);
        let mut seen = HashSet::new();
        for prediction in predictions {
            assert_eq!(prediction.source_reading_ids.len(), DEFAULT_BATCH_SIZE);
            for id in &prediction.source_reading_ids {
                assert!(seen.insert(*id), "reading {} used by two predictions", id);
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_consecutive_batches_use_disjoint_windows() {
        let h = harness();
        let mut ids = Vec::new();
        for i in 0..150 {
            let reading = h.service.ingest("sensor/temperatura", json!(20 + i % 7)).await.unwrap();
            ids.push(reading.id);
        }

        assert_eq!(h.model.calls.load(Ordering::SeqCst), 2);
        let page = h
            .service
            .list_predictions(PageRequest::new(Some(100), None))
            .await
            .unwrap();
        let used = assert_disjoint_batches(&page.data, 2);
        assert_eq!(used, ids[..120].iter().copied().collect::<HashSet<_>>());

        // Newest first: the older window belongs to the second entry
        assert_eq!(page.data[1].source_reading_ids, ids[..60]);
        assert_eq!(page.data[0].source_reading_ids, ids[60..120]);
        assert_eq!(h.repo.count_unprocessed("sensor/temperatura").await.unwrap(), 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallel_ingest_never_shares_readings() {
        let h = harness();
        let tasks: Vec<_> = (0..180)
            .map(|i| {
                let service = h.service.clone();
                tokio::spawn(async move { service.ingest("sensor/temperatura", json!(18 + i % 10)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.model.calls.load(Ordering::SeqCst), 3);
        let page = h
            .service
            .list_predictions(PageRequest::new(Some(100), None))
            .await
            .unwrap();
        let used = assert_disjoint_batches(&page.data, 3);
        assert_eq!(used.len(), 180);
        assert_eq!(h.repo.count_unprocessed("sensor/temperatura").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notification_precedes_temperature_alert() {
        let h = harness();
        let mut last = None;
        for _ in 0..60 {
            last = Some(h.service.ingest("sensor/temperatura", json!(24)).await.unwrap());
        }
        let last_id = json!(last.unwrap().id);

        // Alerts are published from a spawned task
        let mut alert_at = None;
        for _ in 0..100 {
            alert_at = h
                .publisher
                .messages
                .lock()
                .unwrap()
                .iter()
                .position(|(topic, _)| topic == "alertas/temperatura");
            if alert_at.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let alert_at = alert_at.expect("temperature alert was not published");

        let notification_at = h
            .publisher
            .messages
            .lock()
            .unwrap()
            .iter()
            .position(|(topic, message)| {
                topic == "sistema/notificaciones"
                    && matches!(message, OutboundMessage::Json(map) if map.get("reading_id") == Some(&last_id))
            })
            .expect("notification for the sixtieth reading");
        assert!(notification_at < alert_at);
    }

    #[tokio::test]
    async fn test_unparseable_temperature_is_still_stored() {
        let h = harness();
        let reading = h.service.ingest("sensor/temperatura", json!("error")).await.unwrap();

        assert!(reading.parse_error.is_some());
        let page = h.service.list_readings(None, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(h.publisher.published_on("sistema/notificaciones").is_empty());
    }

    #[tokio::test]
    async fn test_parsed_temperature_is_forwarded() {
        let h = harness();
        h.service.ingest("sensor/temperatura", json!(22.5)).await.unwrap();

        let forwarded = h.publisher.published_on("sistema/notificaciones");
        assert_eq!(forwarded.len(), 1);
        match &forwarded[0] {
            OutboundMessage::Json(map) => {
                for field in CANONICAL_FIELDS {
                    assert!(map.contains_key(field));
                }
                assert_eq!(map["value"], json!("22.5"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_topics_are_stored_without_forwarding() {
        let h = harness();
        h.service.ingest("actuador/ventilador", json!("ON")).await.unwrap();

        assert!(h.publisher.messages.lock().unwrap().is_empty());
        let page = h.service.list_readings(Some("actuador/ventilador"), PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let h = harness();
        assert!(matches!(
            h.service.ingest("  ", json!(1)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            h.service.ingest("sensor/temperatura", Value::Null).await,
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(h.service.list_readings(None, PageRequest::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_manual_processing_requires_full_batch() {
        let h = harness();
        for _ in 0..10 {
            h.service.ingest("sensor/temperatura", json!(25)).await.unwrap();
        }
        assert!(matches!(
            h.service.process_now().await,
            Err(ServiceError::InsufficientData { available: 10, required: 60 })
        ));
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let h = harness();
        h.service.ingest("sensor/temperatura", json!(19.5)).await.unwrap();
        h.service.ingest("actuador/bombillo", json!("OFF")).await.unwrap();

        let status = h.service.status().await.unwrap();
        assert_eq!(status.messages_last_24h, 2);
        assert_eq!(status.unprocessed_temperatures, 1);
        assert_eq!(status.total_predictions, 0);
        assert_eq!(status.last_message.unwrap().topic, "actuador/bombillo");
        assert!(status.connection.connected);
    }

    #[tokio::test]
    async fn test_inbound_bridge_ingests_payloads() {
        let h = harness();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let bridge = tokio::spawn(h.service.clone().consume(rx, shutdown.clone()));

        tx.send(InboundMessage {
            topic: "sensor/temperatura".into(),
            payload: b"23.1".to_vec(),
        })
        .await
        .unwrap();
        drop(tx);
        bridge.await.unwrap();

        let page = h.service.list_readings(None, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].numeric_value(), Some(23.1));
    }
}
