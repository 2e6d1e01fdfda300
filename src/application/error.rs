// Application error taxonomy
use crate::application::blob_store::BlobError;
use crate::application::inference::InferenceError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed client input, never retried
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Not enough unprocessed readings to build a batch: {available}/{required}")]
    InsufficientData { available: usize, required: usize },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<BlobError> for ServiceError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::InvalidId(id) => ServiceError::Validation(format!("Invalid image id: {}", id)),
            BlobError::NotFound(id) => ServiceError::NotFound(format!("Image not found: {}", id)),
            BlobError::Backend(e) => ServiceError::Storage(e),
        }
    }
}
