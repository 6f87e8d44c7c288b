use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::store::StoreError;

/// Errors raised by the HTML page handlers.
#[derive(Debug)]
pub enum AppError {
    Store(StoreError),
    Template(askama::Error),
    Session(tower_sessions::session::Error),
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let cause = match self {
            AppError::NotFound => return (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Store(e) => e.to_string(),
            AppError::Template(e) => format!("template error: {e}"),
            AppError::Session(e) => format!("session error: {e}"),
        };
        tracing::error!(%cause, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(StoreError::Database(e))
    }
}

impl From<askama::Error> for AppError {
    fn from(e: askama::Error) -> Self {
        AppError::Template(e)
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(e: tower_sessions::session::Error) -> Self {
        AppError::Session(e)
    }
}
