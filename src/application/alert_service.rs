// Alert service - Classify inference results and publish alerts
use crate::application::publisher::{MessagePublisher, OutboundMessage};
use crate::domain::alert::Alert;
use crate::domain::image::DetectionSummary;
use crate::domain::prediction::Prediction;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AlertTopics {
    pub temperature: String,
    pub person: String,
}

/// Sole writer to the alert topics. Publishing is fire-and-forget: it runs
/// on its own task so a slow or absent broker never holds up the producer.
#[derive(Clone)]
pub struct AlertDispatcher {
    publisher: Arc<dyn MessagePublisher>,
    topics: AlertTopics,
}

impl AlertDispatcher {
    pub fn new(publisher: Arc<dyn MessagePublisher>, topics: AlertTopics) -> Self {
        Self { publisher, topics }
    }

    pub fn dispatch_prediction(&self, prediction: &Prediction) -> (Alert, JoinHandle<bool>) {
        let alert = Alert::from_prediction(prediction);
        let handle = self.dispatch(alert.clone());
        (alert, handle)
    }

    /// Returns `None` when the frame shows nobody
    pub fn dispatch_detection(
        &self,
        image_id: Uuid,
        summary: &DetectionSummary,
        restricted: bool,
    ) -> Option<(Alert, JoinHandle<bool>)> {
        let alert = Alert::from_detection(image_id, summary, restricted)?;
        let handle = self.dispatch(alert.clone());
        Some((alert, handle))
    }

    /// Publish on the alert's topic. The handle resolves to whether the
    /// broker accepted the message; callers are free to drop it.
    pub fn dispatch(&self, alert: Alert) -> JoinHandle<bool> {
        let topic = self.topic_for(&alert).to_string();
        let publisher = self.publisher.clone();

        tokio::spawn(async move {
            let message = match serde_json::to_value(alert.to_message()) {
                Ok(Value::Object(map)) => OutboundMessage::Json(map),
                Ok(_) => return false,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode alert");
                    return false;
                }
            };

            match publisher.publish(&topic, message).await {
                Ok(()) => {
                    tracing::info!(topic = %topic, kind = alert.kind(), "Alert published");
                    true
                }
                Err(e) => {
                    tracing::error!(topic = %topic, kind = alert.kind(), error = %e, "Alert publish failed");
                    false
                }
            }
        })
    }

    fn topic_for(&self, alert: &Alert) -> &str {
        match alert {
            Alert::Temperature(_) => &self.topics.temperature,
            Alert::PersonDetection(_) | Alert::Intrusion(_) => &self.topics.person,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::publisher::TransportError;
    use crate::domain::connection::ConnectionState;
    use crate::domain::image::Detection;
    use crate::domain::prediction::ForecastResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Publisher double recording every message
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub messages: Mutex<Vec<(String, OutboundMessage)>>,
        pub offline: bool,
    }

    impl RecordingPublisher {
        pub fn offline() -> Self {
            Self {
                offline: true,
                ..Default::default()
            }
        }

        pub fn published_on(&self, topic: &str) -> Vec<OutboundMessage> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MessagePublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<(), TransportError> {
            if self.offline {
                return Err(TransportError::NotConnected {
                    broker: "test:1883".into(),
                });
            }
            self.messages.lock().unwrap().push((topic.to_string(), message));
            Ok(())
        }

        fn connection_state(&self) -> ConnectionState {
            let mut state = ConnectionState::disconnected("test:1883".into());
            state.connected = !self.offline;
            state
        }
    }

    fn topics() -> AlertTopics {
        AlertTopics {
            temperature: "alertas/temperatura".into(),
            person: "alertas/personas".into(),
        }
    }

    #[tokio::test]
    async fn test_temperature_alert_is_published() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = AlertDispatcher::new(publisher.clone(), topics());
        let prediction = Prediction::new(vec![], ForecastResult::new(json!(12.0), json!({})), vec![]);

        let (alert, handle) = dispatcher.dispatch_prediction(&prediction);
        assert!(handle.await.unwrap());
        assert_eq!(alert.kind(), "temperature");

        let published = publisher.published_on("alertas/temperatura");
        assert_eq!(published.len(), 1);
        match &published[0] {
            OutboundMessage::Json(map) => {
                assert_eq!(map["type"], json!("temperature"));
                assert_eq!(map["notification"]["priority"], json!("high"));
                assert_eq!(map["payload"]["classification"], json!("low"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_detection_is_dropped() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = AlertDispatcher::new(publisher.clone(), topics());

        assert!(dispatcher
            .dispatch_detection(Uuid::new_v4(), &DetectionSummary::default(), false)
            .is_none());
        assert!(publisher.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_person_alert_goes_to_person_topic() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = AlertDispatcher::new(publisher.clone(), topics());
        let persons = (0..3)
            .map(|_| Detection {
                class: "person".into(),
                confidence: 0.7,
                bbox: json!([0, 0, 5, 5]),
            })
            .collect();
        let summary = DetectionSummary::from_detections(persons, None, None);

        let (_, handle) = dispatcher
            .dispatch_detection(Uuid::new_v4(), &summary, false)
            .unwrap();
        assert!(handle.await.unwrap());

        let published = publisher.published_on("alertas/personas");
        assert_eq!(published.len(), 1);
        match &published[0] {
            OutboundMessage::Json(map) => assert_eq!(map["payload"]["total_persons"], json!(3)),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let publisher = Arc::new(RecordingPublisher::offline());
        let dispatcher = AlertDispatcher::new(publisher, topics());
        let prediction = Prediction::new(vec![], ForecastResult::new(json!(25.0), json!({})), vec![]);

        let (_, handle) = dispatcher.dispatch_prediction(&prediction);
        assert!(!handle.await.unwrap());
    }
}
