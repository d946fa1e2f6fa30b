use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crate::models::{ErrorBody, ErrorResponse};
use crate::sprite::BuildError;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum AppError {
    Database(sqlx::Error),
    Internal(String),
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    PayloadTooLarge(String),
    RateLimited { retry_after: u64 },
    /// A sprite source could not be downloaded or is not audio.
    Fetch(String),
    /// The concatenation/encoding step failed.
    Encode(String),
    /// The finished sprite could not be stored.
    Upload(String),
    /// Blob store or another external service is unavailable.
    Upstream(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "invalid_request",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "already_exists",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Fetch(_) => "fetch_failed",
            AppError::Encode(_) => "encode_failed",
            AppError::Upload(_) => "upload_failed",
            AppError::Upstream(_) => "upstream_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Fetch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upload(_) => StatusCode::BAD_GATEWAY,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Database(e) => {
                tracing::error!("database error: {e}");
                "internal database error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e}");
                "internal server error".to_string()
            }
            AppError::Encode(e) => {
                tracing::error!("sprite encode error: {e}");
                "failed to build the soundboard sprite".to_string()
            }
            AppError::Upload(e) => {
                tracing::error!("sprite upload error: {e}");
                "failed to store the soundboard sprite".to_string()
            }
            AppError::Upstream(e) => {
                tracing::error!("upstream error: {e}");
                "storage service unavailable".to_string()
            }
            AppError::Fetch(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::PayloadTooLarge(msg) => msg.clone(),
            AppError::RateLimited { retry_after } => {
                format!("rate limited, retry after {retry_after}s")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.message(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after } = &self {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound("resource not found".to_string()),
            _ => AppError::Database(e),
        }
    }
}

impl From<BuildError> for AppError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Fetch(msg) => AppError::Fetch(msg),
            BuildError::Encode(msg) => AppError::Encode(msg),
            BuildError::Upload(msg) => AppError::Upload(msg),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::Denied(msg) => AppError::Forbidden(msg),
            StorageError::Unavailable(msg) => AppError::Upstream(msg),
        }
    }
}
