//! Error taxonomy for the analysis flow.

use axum::http::StatusCode;
use serde::Serialize;

/// Every failure a single analysis request can end with.
///
/// None of these are fatal to the process: the cached client and the
/// secret store are left untouched and the next request starts clean.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No document was provided")]
    MissingDocument,

    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String, status: StatusCode },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    /// Document larger than the configured upload limit.
    pub fn too_large(size: usize, limit: usize) -> Self {
        Self::InvalidDocument {
            reason: format!("document is {} bytes, limit is {} bytes", size, limit),
            status: StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Upload cut off by the request body limit, before its size is known.
    pub fn upload_too_large(limit: usize) -> Self {
        Self::InvalidDocument {
            reason: format!("upload exceeds the limit of {} bytes", limit),
            status: StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Document that is not a PDF.
    pub fn unsupported_type(detail: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: detail.into(),
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    /// Short machine-readable tag for the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingDocument => "missing_document",
            Self::InvalidDocument { .. } => "invalid_document",
            Self::Configuration(_) => "configuration_error",
            Self::Analysis(_) => "analysis_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingDocument => StatusCode::BAD_REQUEST,
            Self::InvalidDocument { status, .. } => *status,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Analysis(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        }
    }
}

/// JSON shape returned to the page on failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(PipelineError::MissingDocument.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            PipelineError::too_large(30, 20).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            PipelineError::upload_too_large(20).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            PipelineError::unsupported_type("not a pdf").status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            PipelineError::configuration("missing key").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PipelineError::analysis("boom").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_body_keeps_underlying_message() {
        let body = PipelineError::analysis("connection reset by peer").body();
        assert_eq!(body.kind, "analysis_error");
        assert!(body.error.contains("connection reset by peer"));
    }
}
