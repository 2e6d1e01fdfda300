// Stored image and detection domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

pub type Metadata = Map<String, Value>;

/// Descriptor of an image held by the blob store. The payload itself
/// stays with the store and is only returned by `get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub uploaded_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// An image about to be written to the blob store
#[derive(Debug, Clone)]
pub struct NewImage {
    pub data: Vec<u8>,
    pub filename: String,
    pub content_type: String,
    pub metadata: Metadata,
}

/// Metadata every stored image starts with
pub fn base_metadata(content_type: &str, now: DateTime<Utc>) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("timestamp".into(), json!(now.to_rfc3339()));
    metadata.insert("content_type".into(), json!(content_type));
    metadata
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub bbox: Value,
}

impl Detection {
    pub fn is_person(&self) -> bool {
        self.class == "person"
    }
}

/// Person-centric digest of one image inference call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub has_persons: bool,
    pub total_persons: usize,
    pub persons: Vec<Detection>,
    pub image_size: Option<Value>,
    pub processing_time: Option<Value>,
}

impl DetectionSummary {
    pub fn from_detections(
        detections: Vec<Detection>,
        image_size: Option<Value>,
        processing_time: Option<Value>,
    ) -> Self {
        let persons: Vec<Detection> = detections.into_iter().filter(Detection::is_person).collect();
        Self {
            has_persons: !persons.is_empty(),
            total_persons: persons.len(),
            persons,
            image_size,
            processing_time,
        }
    }

    /// Fields merged into the stored image's metadata after inference
    pub fn to_metadata(&self, detected_at: DateTime<Utc>) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("has_persons".into(), json!(self.has_persons));
        metadata.insert("total_persons".into(), json!(self.total_persons));
        metadata.insert("persons".into(), json!(self.persons));
        metadata.insert(
            "image_size".into(),
            self.image_size.clone().unwrap_or(Value::Null),
        );
        metadata.insert(
            "processing_time".into(),
            self.processing_time.clone().unwrap_or(Value::Null),
        );
        metadata.insert("detection_timestamp".into(), json!(detected_at.to_rfc3339()));
        metadata
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub summary: DetectionSummary,
    pub raw_response: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class: &str) -> Detection {
        Detection {
            class: class.to_string(),
            confidence: 0.9,
            bbox: json!([0, 0, 10, 10]),
        }
    }

    #[test]
    fn test_only_persons_are_counted() {
        let summary = DetectionSummary::from_detections(
            vec![detection("person"), detection("dog"), detection("person")],
            Some(json!([640, 480])),
            Some(json!(0.12)),
        );
        assert!(summary.has_persons);
        assert_eq!(summary.total_persons, 2);
        assert!(summary.persons.iter().all(Detection::is_person));
    }

    #[test]
    fn test_summary_metadata_fields() {
        let summary = DetectionSummary::from_detections(vec![detection("cat")], None, None);
        let metadata = summary.to_metadata(Utc::now());
        assert_eq!(metadata["has_persons"], json!(false));
        assert_eq!(metadata["total_persons"], json!(0));
        assert_eq!(metadata["image_size"], Value::Null);
        assert!(metadata.contains_key("detection_timestamp"));
    }
}
