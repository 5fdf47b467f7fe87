//! Failures answered by the drinks handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// A request that could not be served
///
/// Authorization failures never pass through here; they are answered by
/// the route guards.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed drink or route does not exist
    #[error("resource not found")]
    NotFound,

    /// The request body could not be used
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// The store failed
    #[error("server error")]
    Internal(#[source] StoreError),
}

impl ApiError {
    /// The status the error is answered with
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "resource not found",
            Self::Unprocessable(_) => "unprocessable",
            Self::Internal(_) => "server error",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::Conflict(_) => Self::Unprocessable(err.to_string()),
            StoreError::Unavailable(_) => Self::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(err) => {
                let error: &(dyn std::error::Error + 'static) = err;
                tracing::error!(error, "drink store failed");
            }
            Self::Unprocessable(detail) => {
                tracing::debug!(detail, "request body rejected");
            }
            Self::NotFound => {}
        }

        let status = self.status();
        let body = json!({
            "success": false,
            "error": status.as_u16(),
            "message": self.message(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_meaning() {
        assert_eq!(
            ApiError::from(StoreError::NotFound(4)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::Conflict("water".to_owned())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(StoreError::Unavailable("disk on fire".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_names_the_status() {
        let response = ApiError::Unprocessable("title missing".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
