// Broker connection state
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub broker_address: String,
    pub last_error: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn disconnected(broker_address: String) -> Self {
        Self {
            connected: false,
            broker_address,
            last_error: None,
            since: None,
        }
    }
}
