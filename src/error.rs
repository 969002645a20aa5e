use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Every failure a request can end with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("no user matches '{0}'")]
    OwnerNotFound(String),

    #[error("Email already registered")]
    DuplicateAccount,

    #[error("Invalid email or password")]
    InvalidCredential,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    /// Stable machine-readable code, safe for clients to branch on.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::OwnerNotFound(_) => "owner_not_found",
            AppError::DuplicateAccount => "duplicate_account",
            AppError::InvalidCredential => "invalid_credential",
            AppError::Store(_) => "store_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::OwnerNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateAccount => StatusCode::CONFLICT,
            AppError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, code = self.code(), "request failed");
            // Store details stay in the logs.
            "Internal server error".to_string()
        } else {
            warn!(error = %self, code = self.code(), "request rejected");
            self.to_string()
        };
        (
            status,
            Json(ErrorBody {
                error: self.code(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(
            AppError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::OwnerNotFound("a@x.com".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::DuplicateAccount.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::InvalidCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Store(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::DuplicateAccount.code(), "duplicate_account");
        assert_eq!(AppError::InvalidCredential.code(), "invalid_credential");
        assert_eq!(AppError::OwnerNotFound("u".into()).code(), "owner_not_found");
        assert_eq!(
            AppError::Store(sqlx::Error::PoolClosed).code(),
            "store_error"
        );
    }

    #[tokio::test]
    async fn server_errors_hide_details() {
        let res = AppError::Store(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "store_error");
        assert_eq!(body["message"], "Internal server error");
    }
}
