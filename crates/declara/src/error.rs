use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::declaration::DeclarationServiceError;
use crate::workflows::delivery::DeliveryServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Coarse error taxonomy shared by every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// User-correctable input problem.
    Validation,
    /// Amount could not be determined; blocks submission.
    Resolution,
    /// Operation not allowed from the current lifecycle state.
    State,
    /// Lost a race against another writer; retry the whole operation.
    Conflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Resolution => "resolution",
            ErrorKind::State => "state",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::Resolution => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::State | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error payload: `{kind, message, field_path?, errors?}`.
pub(crate) fn error_response(
    kind: ErrorKind,
    message: String,
    field_path: Option<String>,
    errors: Option<Value>,
) -> Response {
    let mut payload = json!({
        "kind": kind.label(),
        "message": message,
    });
    if let Some(path) = field_path {
        payload["field_path"] = Value::String(path);
    }
    if let Some(errors) = errors {
        payload["errors"] = errors;
    }
    (kind.status(), Json(payload)).into_response()
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Declaration(DeclarationServiceError),
    Delivery(DeliveryServiceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Declaration(err) => write!(f, "declaration error: {}", err),
            AppError::Delivery(err) => write!(f, "delivery error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Declaration(err) => Some(err),
            AppError::Delivery(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Declaration(err) => err.into_response(),
            AppError::Delivery(err) => err.into_response(),
            other => error_response(ErrorKind::Internal, other.to_string(), None, None),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<DeclarationServiceError> for AppError {
    fn from(value: DeclarationServiceError) -> Self {
        Self::Declaration(value)
    }
}

impl From<DeliveryServiceError> for AppError {
    fn from(value: DeliveryServiceError) -> Self {
        Self::Delivery(value)
    }
}
