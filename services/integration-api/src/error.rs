//! HTTP boundary mapping for core errors
//!
//! The mapping rules: `NotAuthorized` → 401 (the caller must restart the
//! authorization flow), constraint violations → 400 with an actionable
//! message, vendor-side failures → 502 (they are not this service's fault),
//! remaining storage failures → 500. Vendor failures keep their upstream
//! status and body in the response detail so an operator can act without
//! grepping logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ifood_auth::{Error as AuthError, StoreError};
use ifood_guard::Error as GuardError;

/// Error returned by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Guard(GuardError),
    Auth(AuthError),
    NotFound(String),
}

impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        ApiError::Guard(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Auth(AuthError::Store(err))
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::InvalidMerchantRef(_) => StatusCode::BAD_REQUEST,
        StoreError::Io(_) | StoreError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Guard(GuardError::NotAuthorized { .. }) => StatusCode::UNAUTHORIZED,
            ApiError::Guard(GuardError::RenewalFailed { .. })
            | ApiError::Guard(GuardError::AuthenticationRejected { .. })
            | ApiError::Guard(GuardError::Http(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Guard(GuardError::Store(err)) => store_status(err),
            ApiError::Auth(AuthError::UpstreamAuth { .. })
            | ApiError::Auth(AuthError::Protocol(_))
            | ApiError::Auth(AuthError::Http(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Auth(AuthError::Store(err)) => store_status(err),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Guard(err) => err.to_string(),
            ApiError::Auth(err) => err.to_string(),
            ApiError::NotFound(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.message() }));
        (status, body).into_response()
    }
}
