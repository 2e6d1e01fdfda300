// Prediction domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Output of one numeric inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub forecast: Value,
    pub raw_response: Value,
}

impl ForecastResult {
    pub fn new(forecast: Value, raw_response: Value) -> Self {
        Self {
            forecast,
            raw_response,
        }
    }

    /// The single scalar forecast, when the model returned something numeric.
    /// Accepts a number, a numeric string, or a one-element array of either.
    pub fn forecast_value(&self) -> Option<f64> {
        fn scalar(value: &Value) -> Option<f64> {
            match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
        }

        let value = match &self.forecast {
            Value::Array(items) if items.len() == 1 => scalar(&items[0]),
            other => scalar(other),
        };
        value.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub inputs: Vec<f64>,
    pub result: ForecastResult,
    pub source_reading_ids: Vec<Uuid>,
}

impl Prediction {
    pub fn new(inputs: Vec<f64>, result: ForecastResult, source_reading_ids: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            inputs,
            result,
            source_reading_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forecast_value_shapes() {
        let result = |v: Value| ForecastResult::new(v, json!({}));
        assert_eq!(result(json!(24.2)).forecast_value(), Some(24.2));
        assert_eq!(result(json!("31.5")).forecast_value(), Some(31.5));
        assert_eq!(result(json!([18.0])).forecast_value(), Some(18.0));
        assert_eq!(result(json!("N/A")).forecast_value(), None);
        assert_eq!(result(json!([1.0, 2.0])).forecast_value(), None);
        assert_eq!(result(Value::Null).forecast_value(), None);
    }
}
