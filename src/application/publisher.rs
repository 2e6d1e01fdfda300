// Message bus seam used by the pipeline to publish and receive messages
use crate::domain::connection::ConnectionState;
use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Not connected to broker {broker}")]
    NotConnected { broker: String },

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport is closed")]
    Closed,
}

/// Outbound payload: raw text, or a JSON object
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Json(Map<String, Value>),
}

/// A message received on a subscribed topic
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Best-effort publisher. A failed publish is reported, never fatal.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<(), TransportError>;

    fn connection_state(&self) -> ConnectionState;
}
