//! Error types for StoryLens.

use std::fmt;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Which external pipeline an error or status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    ImageToText,
    TextToSpeech,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::ImageToText => "image-to-text",
            PipelineKind::TextToSpeech => "text-to-speech",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Rejections raised while reading the uploaded image, before anything is stored.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No image file uploaded")]
    MissingFile,

    #[error("Only image files are allowed! (got {})", or_none(.content_type))]
    NotAnImage { content_type: String },

    #[error("File too large: images must be at most {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Unexpected field: {0}")]
    UnexpectedField(String),

    #[error("Only one image file may be uploaded")]
    MultipleFiles,

    #[error("Malformed multipart request: {0}")]
    Malformed(String),
}

fn or_none(content_type: &str) -> &str {
    if content_type.is_empty() {
        "none"
    } else {
        content_type
    }
}

/// Failures of a pipeline's construction or invocation.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("{kind} pipeline could not be loaded: {message}")]
    Load { kind: PipelineKind, message: String },

    #[error("{kind} pipeline not available: {reason}")]
    Unavailable { kind: PipelineKind, reason: String },

    #[error("{kind} pipeline failed: {message}")]
    Invocation { kind: PipelineKind, message: String },

    #[error("{kind} pipeline timed out after {}s", .after.as_secs())]
    Timeout { kind: PipelineKind, after: Duration },
}

impl PipelineError {
    pub fn load(kind: PipelineKind, message: impl Into<String>) -> Self {
        PipelineError::Load {
            kind,
            message: message.into(),
        }
    }

    pub fn invocation(kind: PipelineKind, message: impl Into<String>) -> Self {
        PipelineError::Invocation {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("No text could be extracted from the image")]
    Empty,
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Text-to-speech pipeline not available: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Failed(PipelineError),

    #[error("No audio data generated")]
    NoAudio,
}

impl From<PipelineError> for SynthesisError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Unavailable { reason, .. } => SynthesisError::Unavailable(reason),
            other => SynthesisError::Failed(other),
        }
    }
}

/// Failures that end an upload request after the image has been read.
#[derive(Error, Debug)]
pub enum StoryError {
    #[error("Failed to store uploaded image: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// HTTP-facing error, rendered as the JSON bodies the browser client expects.
#[derive(Debug)]
pub enum ApiError {
    InvalidUpload(UploadError),
    ExtractionFailed(ExtractionError),
    Internal(String),
    NotFound { path: String, method: String },
}

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::ExtractionFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::InvalidUpload(err) => json!({ "error": err.to_string() }),
            ApiError::ExtractionFailed(err) => json!({
                "error": "Failed to extract text from image",
                "details": err.to_string(),
            }),
            ApiError::Internal(details) => json!({
                "error": "Internal server error",
                "details": details,
            }),
            ApiError::NotFound { path, method } => json!({
                "error": "Route not found",
                "path": path,
                "method": method,
            }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::InvalidUpload(err)
    }
}

impl From<StoryError> for ApiError {
    fn from(err: StoryError) -> Self {
        match err {
            StoryError::Extraction(err) => ApiError::ExtractionFailed(err),
            StoryError::Storage(err) => {
                error!("Upload storage failed: {}", err);
                ApiError::internal(err.to_string())
            }
        }
    }
}
