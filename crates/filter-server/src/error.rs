use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::types::FilterMode;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Filter text must not be empty")]
    EmptyText,

    #[error("A {mode} filter for '{text}' already exists")]
    Duplicate { mode: FilterMode, text: String },

    #[error("Invalid comment pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Filter {0} not found")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl FilterError {
    fn status(&self) -> StatusCode {
        match self {
            FilterError::EmptyText | FilterError::InvalidPattern { .. } => StatusCode::BAD_REQUEST,
            FilterError::Duplicate { .. } => StatusCode::CONFLICT,
            FilterError::NotFound(_) => StatusCode::NOT_FOUND,
            FilterError::Database(_) | FilterError::Pool(_) | FilterError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("[Filter] {self}");
        }
        (
            status,
            Json(json!({ "status": "error", "message": self.to_string() })),
        )
            .into_response()
    }
}
