use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Request-terminating error taxonomy. Channel delivery failures are not
/// part of this enum — they are recovered inside the dispatcher and reported
/// through its per-channel result map.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    DuplicateIdentity(String),

    #[error("device {0} not found")]
    UnknownDevice(String),

    #[error("probe {0} not found")]
    UnknownProbe(String),

    #[error("user not found")]
    UnknownUser,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::DuplicateIdentity(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownDevice(_)
            | ApiError::UnknownProbe(_)
            | ApiError::UnknownUser
            | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Log the underlying cause; the response body stays generic.
            tracing::error!(error = ?self, "request failed");
        }
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

/// True when the error is a Postgres unique-constraint violation. Used to
/// map insert races onto `DuplicateIdentity` instead of a 500.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::DuplicateIdentity("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownDevice("d".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Unauthorized("nope").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
