use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::ingest::probe::ProbeError;
use crate::ingest::publish::PublishError;
use crate::ingest::stage::StageError;
use crate::models::ErrorResponse;
use crate::store::StoreError;

/// Every failure a request can end in. Each variant maps to its own status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("staging failed: {0}")]
    Stage(#[from] StageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Probe(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Publish(_) => StatusCode::BAD_GATEWAY,
            ApiError::Stage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client. Internal causes stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m) => m.clone(),
            ApiError::Probe(_) => "Couldn't read video dimensions".to_string(),
            ApiError::Publish(_) => "Couldn't store video".to_string(),
            ApiError::Stage(_) | ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound("Couldn't find video".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() || status == StatusCode::UNPROCESSABLE_ENTITY {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
