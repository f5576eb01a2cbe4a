use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// A required query parameter is missing or malformed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputValidationError {
    #[error("missing required parameter: {0}")]
    Missing(&'static str),

    #[error("invalid value for {param}: {reason}")]
    Invalid { param: &'static str, reason: String },
}

/// The transaction store could not produce records
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("transaction store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction store query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("extraction worker failed: {0}")]
    Worker(String),

    #[error("extraction timed out after {0}s")]
    Timeout(u64),
}

/// A record that cannot be folded into the graph without misrepresenting value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("record #{index} (tx {hash}) has an empty {field}")]
    EmptyAddress {
        index: usize,
        hash: String,
        field: &'static str,
    },

    #[error("record #{index} (tx {hash}) has a negative amount {amount}")]
    NegativeAmount {
        index: usize,
        hash: String,
        amount: String,
    },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] InputValidationError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DataSource(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Aggregation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
