// HTTP error taxonomy
use actix_web::error::{BlockingError, JsonPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("inference failed: {0}")]
    Inference(#[from] anyhow::Error),

    #[error("inference was cancelled: {0}")]
    Blocking(#[from] BlockingError),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Inference(_) | Self::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Server-side causes stay in the log.
        let message = match self {
            Self::Validation(msg) | Self::PayloadTooLarge(msg) => msg.clone(),
            Self::Inference(e) => {
                error!("sentiment inference failed: {:#}", e);
                "sentiment inference failed".to_string()
            }
            Self::Blocking(e) => {
                error!("blocking inference task failed: {}", e);
                "sentiment inference failed".to_string()
            }
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse { error: message })
    }
}

/// Turns JSON extractor failures into the JSON error shape: oversized
/// bodies get 413, everything else (bad syntax, missing or mistyped
/// fields) is a 400.
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!("rejected request to {}: {}", req.path(), err);
    match err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            ApiError::PayloadTooLarge(format!("request body too large: {err}")).into()
        }
        _ => ApiError::validation(format!("invalid request body: {err}")).into(),
    }
}
