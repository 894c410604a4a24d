//! Error taxonomy for the video service and its HTTP rendering.

use crate::media_tools::MediaToolError;
use crate::upload::UploadStage;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    /// Missing or invalid bearer token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Valid identity acting on a record it does not own
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Bad identifier, unsupported format, malformed request
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body over the configured upload ceiling
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Probe or remux subprocess failed
    #[error("{stage} failed: {source}")]
    ToolInvocation {
        stage: UploadStage,
        #[source]
        source: MediaToolError,
    },

    /// Upload to or signing by the object store failed
    #[error("Object storage error: {0:#}")]
    Storage(anyhow::Error),

    /// The object is in the bucket but its reference was not persisted
    #[error("Failed to commit storage reference {reference}: {cause:#}")]
    Commit {
        reference: String,
        cause: anyhow::Error,
    },

    /// A stored reference that cannot be split into bucket and key
    #[error("Malformed storage reference on video {0}")]
    MalformedReference(uuid::Uuid),

    /// Writing the inbound stream to scratch space failed
    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Metadata store error: {0:#}")]
    Database(anyhow::Error),
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl VideoError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            VideoError::Authentication(_) => StatusCode::UNAUTHORIZED,
            VideoError::Authorization(_) => StatusCode::FORBIDDEN,
            VideoError::Validation(_) => StatusCode::BAD_REQUEST,
            VideoError::NotFound(_) => StatusCode::NOT_FOUND,
            VideoError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            VideoError::ToolInvocation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VideoError::Storage(_) => StatusCode::BAD_GATEWAY,
            VideoError::Commit { .. } => StatusCode::SERVICE_UNAVAILABLE,
            VideoError::MalformedReference(_)
            | VideoError::Staging(_)
            | VideoError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code, one per taxonomy kind
    pub fn code(&self) -> &'static str {
        match self {
            VideoError::Authentication(_) => "AUTHENTICATION_ERROR",
            VideoError::Authorization(_) => "AUTHORIZATION_ERROR",
            VideoError::Validation(_) => "VALIDATION_ERROR",
            VideoError::NotFound(_) => "NOT_FOUND",
            VideoError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            VideoError::ToolInvocation { .. } => "TOOL_INVOCATION_ERROR",
            VideoError::Storage(_) => "STORAGE_ERROR",
            VideoError::Commit { .. } => "COMMIT_ERROR",
            VideoError::MalformedReference(_) => "MALFORMED_REFERENCE",
            VideoError::Staging(_) => "STAGING_ERROR",
            VideoError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Short caller-facing message. Tool and storage detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            VideoError::Authentication(msg)
            | VideoError::Authorization(msg)
            | VideoError::Validation(msg)
            | VideoError::NotFound(msg)
            | VideoError::PayloadTooLarge(msg) => msg.clone(),
            VideoError::ToolInvocation { stage, .. } => match stage {
                UploadStage::Probing => "Couldn't determine video aspect ratio".to_string(),
                UploadStage::Remuxing => "Couldn't process video for fast start".to_string(),
                other => format!("{} failed", other),
            },
            VideoError::Storage(_) => "Couldn't reach video storage".to_string(),
            VideoError::Commit { .. } => "Couldn't update video record".to_string(),
            VideoError::MalformedReference(_) => "Couldn't generate signed URL".to_string(),
            VideoError::Staging(_) => "Couldn't stage uploaded video".to_string(),
            VideoError::Database(_) => "Couldn't load video record".to_string(),
        }
    }
}

impl IntoResponse for VideoError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            warn!(error = %self, code = self.code(), "Request rejected");
        }

        let body = ErrorResponse {
            error: self.public_message(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}
