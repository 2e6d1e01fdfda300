// Notification message shape shared with downstream consumers
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const DEFAULT_SENSOR: &str = "camara";
pub const DEFAULT_LOCATION: &str = "invernadero";
pub const DEFAULT_VALUE: &str = "Alerta de detección";

/// Fields every message on the notification topic carries
pub const CANONICAL_FIELDS: [&str; 6] = ["sensor", "date", "time", "location", "value", "isNew"];

/// A complete notification. Built through this type, a message can never
/// miss a canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub sensor: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub value: String,
    #[serde(rename = "isNew")]
    pub is_new: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Notification {
    pub fn new(sensor: &str, location: &str, value: String, at: DateTime<Local>) -> Self {
        Self {
            sensor: sensor.to_string(),
            date: at.format("%Y-%m-%d").to_string(),
            time: at.format("%H:%M:%S").to_string(),
            location: location.to_string(),
            value,
            is_new: "true".to_string(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn into_json(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Fill every missing canonical field with its default.
/// Returns the names of the fields that had to be added.
pub fn normalize(message: &mut Map<String, Value>, now: DateTime<Local>) -> Vec<&'static str> {
    let mut filled = Vec::new();
    for field in CANONICAL_FIELDS {
        if message.contains_key(field) {
            continue;
        }
        let default = match field {
            "sensor" => json!(DEFAULT_SENSOR),
            "date" => json!(now.format("%Y-%m-%d").to_string()),
            "time" => json!(now.format("%H:%M:%S").to_string()),
            "location" => json!(DEFAULT_LOCATION),
            "value" => json!(DEFAULT_VALUE),
            _ => json!("true"),
        };
        message.insert(field.to_string(), default);
        filled.push(field);
    }
    filled
}
