// Sensor reading domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Parsed form of a reading's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
}

impl ReadingValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReadingValue::Number(n) => Some(*n),
            ReadingValue::Text(_) => None,
        }
    }

    /// Keep the value as delivered, without coercion
    fn verbatim(raw: &Value) -> Self {
        match raw {
            Value::Number(n) => n
                .as_f64()
                .map(ReadingValue::Number)
                .unwrap_or_else(|| ReadingValue::Text(n.to_string())),
            Value::String(s) => ReadingValue::Text(s.clone()),
            other => ReadingValue::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub topic: String,
    pub value: ReadingValue,
    pub raw_value: Value,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl Reading {
    /// A reading whose value is stored as delivered
    pub fn new(topic: String, raw_value: Value, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            value: ReadingValue::verbatim(&raw_value),
            raw_value,
            received_at,
            processed: false,
            parse_error: None,
        }
    }

    /// A reading whose value must be numeric. A value that fails coercion
    /// is kept verbatim with a parse-error marker instead of being dropped.
    pub fn numeric(topic: String, raw_value: Value, received_at: DateTime<Utc>) -> Self {
        let mut reading = Self::new(topic, raw_value, received_at);
        match coerce_number(&reading.raw_value) {
            Ok(n) => reading.value = ReadingValue::Number(n),
            Err(e) => reading.parse_error = Some(e),
        }
        reading
    }

    pub fn numeric_value(&self) -> Option<f64> {
        if self.parse_error.is_some() {
            return None;
        }
        self.value.as_f64()
    }
}

/// Coerce a raw payload value into a finite float
pub fn coerce_number(raw: &Value) -> Result<f64, String> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(format!("value {} is not a finite number", raw)),
    }
}
