use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use pinchat_crypto::CryptoError;
use pinchat_db::{StoreError, UniqueField};
use pinchat_types::api::ErrorBody;

/// Every failure the service surfaces. Messages are meant for end users and
/// never carry hashes, keys or backend details.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("decryption failed")]
    Decryption,

    #[error("upstream service unavailable")]
    UpstreamUnavailable,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    /// Stable machine-readable kind, used as the `error` field of responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Expired(_) => "expired",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Decryption => "decryption_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Internal => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::Expired(_) => StatusCode::GONE,
            Self::InvalidArgument(_) | Self::Decryption => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(UniqueField::Email) => Self::Conflict("Email already registered".into()),
            StoreError::Conflict(UniqueField::Pin) => Self::Conflict("PIN already in use".into()),
            StoreError::Unavailable(detail) => {
                error!("Storage failure: {}", detail);
                Self::UpstreamUnavailable
            }
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKey => Self::InvalidArgument(e.to_string()),
            CryptoError::Decryption => Self::Decryption,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
