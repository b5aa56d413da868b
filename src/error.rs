//! Error handling.

use axum::{
    extract::rejection::QueryRejection,
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

/// Salary statistics server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum SalaryStatsError {
    /// A required argument was missing or blank
    #[error("{0}")]
    InvalidArgument(String),

    /// The observation store or a dataset file is absent
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Error executing a database statement
    #[error("error querying the salary database")]
    Database(#[from] rusqlite::Error),

    /// Error reading a CSV dataset
    #[error("failed to read salary dataset")]
    Dataset(#[from] csv::Error),

    /// A dataset record contains a value that cannot be parsed
    #[error("invalid {field} value {value:?} in dataset record {record}")]
    InvalidDatasetValue {
        record: u64,
        field: &'static str,
        value: String,
    },

    /// Error (de)serialising a stored aggregate
    #[error("failed to (de)serialise stored aggregate")]
    Serialisation(#[from] serde_json::Error),

    /// Error formatting or parsing a timestamp
    #[error("failed to format timestamp")]
    TimestampFormat(#[from] time::error::Format),

    /// Error deserialising the request query string
    #[error("request query is not valid")]
    RequestQueryRejection(#[from] QueryRejection),

    /// Error validating request data (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// A report task panicked or was cancelled
    #[error("report task failed")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl IntoResponse for SalaryStatsError {
    /// Convert from a `SalaryStatsError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }

    /// Return a 400 bad request ErrorResponse
    fn bad_request<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Return a 500 internal server error ErrorResponse
    fn internal_server_error<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<SalaryStatsError> for ErrorResponse {
    /// Convert from a `SalaryStatsError` into an `ErrorResponse`.
    fn from(error: SalaryStatsError) -> Self {
        let response = match &error {
            // Bad request
            SalaryStatsError::InvalidArgument(_)
            | SalaryStatsError::RequestQueryRejection(_)
            | SalaryStatsError::RequestDataValidation(_) => Self::bad_request(&error),

            // Internal server error
            SalaryStatsError::DataUnavailable(_)
            | SalaryStatsError::Database(_)
            | SalaryStatsError::Dataset(_)
            | SalaryStatsError::InvalidDatasetValue { .. }
            | SalaryStatsError::Serialisation(_)
            | SalaryStatsError::TimestampFormat(_)
            | SalaryStatsError::SemaphoreAcquireError(_)
            | SalaryStatsError::TryFromInt(_)
            | SalaryStatsError::TaskJoin(_) => Self::internal_server_error(&error),
        };

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
