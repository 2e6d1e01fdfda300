// Alert domain model - classification of inference results
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::image::{Detection, DetectionSummary};
use super::prediction::Prediction;

/// Forecasts below this are "low"
pub const TEMPERATURE_LOW_BOUND: f64 = 20.0;
/// Forecasts above this are "high"
pub const TEMPERATURE_HIGH_BOUND: f64 = 37.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureBand {
    Low,
    Normal,
    High,
}

impl TemperatureBand {
    /// Both bounds belong to the normal band
    pub fn classify(value: f64) -> Self {
        if value < TEMPERATURE_LOW_BOUND {
            TemperatureBand::Low
        } else if value > TEMPERATURE_HIGH_BOUND {
            TemperatureBand::High
        } else {
            TemperatureBand::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureBand::Low => "low",
            TemperatureBand::Normal => "normal",
            TemperatureBand::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBody {
    pub title: String,
    pub body: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureAlert {
    pub timestamp: DateTime<Utc>,
    pub prediction_id: Uuid,
    pub forecast: Option<f64>,
    pub band: TemperatureBand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonAlert {
    pub timestamp: DateTime<Utc>,
    pub image_id: Uuid,
    pub total_persons: usize,
    pub detections: Vec<Detection>,
}

/// A classified alert, one variant per alert type
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Temperature(TemperatureAlert),
    PersonDetection(PersonAlert),
    Intrusion(PersonAlert),
}

/// Wire form of an alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub notification: NotificationBody,
    pub payload: Value,
}

impl Alert {
    /// Temperature alert for a completed batch. A forecast that is not a
    /// number falls back to the normal band rather than raising an alarm.
    pub fn from_prediction(prediction: &Prediction) -> Self {
        let forecast = prediction.result.forecast_value();
        let band = match forecast {
            Some(value) => TemperatureBand::classify(value),
            None => {
                tracing::warn!(
                    prediction_id = %prediction.id,
                    forecast = %prediction.result.forecast,
                    "Forecast is not numeric, classifying as normal"
                );
                TemperatureBand::Normal
            }
        };

        Alert::Temperature(TemperatureAlert {
            timestamp: Utc::now(),
            prediction_id: prediction.id,
            forecast,
            band,
        })
    }

    /// Person alert for a detection result; `None` when nobody was seen.
    /// Frames from a restricted camera are reported as intrusions.
    pub fn from_detection(image_id: Uuid, summary: &DetectionSummary, restricted: bool) -> Option<Self> {
        if summary.total_persons == 0 {
            return None;
        }

        let alert = PersonAlert {
            timestamp: Utc::now(),
            image_id,
            total_persons: summary.total_persons,
            detections: summary.persons.clone(),
        };

        Some(if restricted {
            Alert::Intrusion(alert)
        } else {
            Alert::PersonDetection(alert)
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Alert::Temperature(_) => "temperature",
            Alert::PersonDetection(_) => "person_detection",
            Alert::Intrusion(_) => "intrusion",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Alert::Temperature(t) if t.band == TemperatureBand::Normal => Severity::Info,
            Alert::Temperature(_) | Alert::PersonDetection(_) => Severity::Warning,
            Alert::Intrusion(_) => Severity::Critical,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Alert::Temperature(t) if t.band == TemperatureBand::Normal => Priority::Normal,
            _ => Priority::High,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Alert::Temperature(t) => match (t.band, t.forecast) {
                (TemperatureBand::Low, Some(v)) => format!("Forecast temperature {:.1}°C is below {:.0}°C", v, TEMPERATURE_LOW_BOUND),
                (TemperatureBand::High, Some(v)) => format!("Forecast temperature {:.1}°C is above {:.0}°C", v, TEMPERATURE_HIGH_BOUND),
                (_, Some(v)) => format!("Forecast temperature {:.1}°C is within range", v),
                (_, None) => "Forecast unavailable, temperature assumed normal".to_string(),
            },
            Alert::PersonDetection(p) => format!("{} person(s) detected", p.total_persons),
            Alert::Intrusion(p) => format!("Intrusion: {} person(s) in a restricted area", p.total_persons),
        }
    }

    pub fn notification(&self) -> NotificationBody {
        let title = match self {
            Alert::Temperature(t) => match t.band {
                TemperatureBand::Low => "Low temperature forecast",
                TemperatureBand::Normal => "Temperature forecast",
                TemperatureBand::High => "High temperature forecast",
            },
            Alert::PersonDetection(_) => "Person detected",
            Alert::Intrusion(_) => "Intrusion detected",
        };

        NotificationBody {
            title: title.to_string(),
            body: self.message(),
            priority: self.priority(),
        }
    }

    fn payload(&self) -> Value {
        match self {
            Alert::Temperature(t) => json!({
                "prediction_id": t.prediction_id,
                "forecast": t.forecast,
                "classification": t.band.as_str(),
            }),
            Alert::PersonDetection(p) | Alert::Intrusion(p) => json!({
                "image_id": p.image_id,
                "total_persons": p.total_persons,
                "detections": p.detections,
            }),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Alert::Temperature(t) => t.timestamp,
            Alert::PersonDetection(p) | Alert::Intrusion(p) => p.timestamp,
        }
    }

    pub fn to_message(&self) -> AlertMessage {
        AlertMessage {
            kind: self.kind().to_string(),
            timestamp: self.timestamp(),
            severity: self.severity(),
            message: self.message(),
            notification: self.notification(),
            payload: self.payload(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prediction::ForecastResult;

    fn prediction(forecast: Value) -> Prediction {
        Prediction::new(vec![], ForecastResult::new(forecast, json!({})), vec![])
    }

    fn band_of(alert: &Alert) -> TemperatureBand {
        match alert {
            Alert::Temperature(t) => t.band,
            other => panic!("unexpected alert {:?}", other),
        }
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(TemperatureBand::classify(20.0), TemperatureBand::Normal);
        assert_eq!(TemperatureBand::classify(37.0), TemperatureBand::Normal);
        assert_eq!(TemperatureBand::classify(19.99), TemperatureBand::Low);
        assert_eq!(TemperatureBand::classify(37.01), TemperatureBand::High);
    }

    #[test]
    fn test_non_numeric_forecast_is_normal() {
        let alert = Alert::from_prediction(&prediction(json!("N/A")));
        assert_eq!(band_of(&alert), TemperatureBand::Normal);
        assert_eq!(alert.priority(), Priority::Normal);
        assert_eq!(alert.severity(), Severity::Info);
    }

    #[test]
    fn test_abnormal_forecast_is_high_priority() {
        let alert = Alert::from_prediction(&prediction(json!(40.2)));
        assert_eq!(band_of(&alert), TemperatureBand::High);
        assert_eq!(alert.notification().priority, Priority::High);

        let message = alert.to_message();
        assert_eq!(message.kind, "temperature");
        assert_eq!(message.payload["classification"], json!("high"));
    }

    #[test]
    fn test_detection_alerts() {
        let empty = DetectionSummary::default();
        assert!(Alert::from_detection(Uuid::new_v4(), &empty, false).is_none());

        let summary = DetectionSummary::from_detections(
            vec![Detection {
                class: "person".into(),
                confidence: 0.8,
                bbox: json!([1, 2, 3, 4]),
            }],
            None,
            None,
        );
        let alert = Alert::from_detection(Uuid::new_v4(), &summary, false).unwrap();
        assert_eq!(alert.kind(), "person_detection");
        assert_eq!(alert.to_message().payload["total_persons"], json!(1));

        let intrusion = Alert::from_detection(Uuid::new_v4(), &summary, true).unwrap();
        assert_eq!(intrusion.kind(), "intrusion");
        assert_eq!(intrusion.severity(), Severity::Critical);
    }
}
