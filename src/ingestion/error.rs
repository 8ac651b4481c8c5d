//! Error types for the acquisition pipeline

use crate::ingestion::retry::FailureKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Area too large for DVF API: {0}")]
    AreaTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Retry classification of a fetch failure.
    /// `None` for errors that are not produced by a network call.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            IngestError::AreaTooLarge(_) => Some(FailureKind::RateLimitOrAreaTooLarge),
            IngestError::NotFound(_) => Some(FailureKind::NotFound),
            IngestError::Http { .. } | IngestError::Network(_) | IngestError::Json(_) => {
                Some(FailureKind::Transient)
            }
            IngestError::Validation(_) | IngestError::RetriesExhausted { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IngestError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_classification() {
        assert_eq!(
            IngestError::AreaTooLarge("bbox".into()).failure_kind(),
            Some(FailureKind::RateLimitOrAreaTooLarge)
        );
        assert_eq!(
            IngestError::NotFound("x".into()).failure_kind(),
            Some(FailureKind::NotFound)
        );
        assert_eq!(
            IngestError::Http {
                status: 503,
                url: "http://dvf".into()
            }
            .failure_kind(),
            Some(FailureKind::Transient)
        );
        assert_eq!(IngestError::Validation("empty".into()).failure_kind(), None);
    }

    #[test]
    fn test_exhausted_message_includes_cause() {
        let err = IngestError::RetriesExhausted {
            attempts: 3,
            source: Box::new(IngestError::Http {
                status: 500,
                url: "http://dvf/mutations/".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "Request failed after 3 attempts: HTTP error 500 from http://dvf/mutations/"
        );
    }
}
