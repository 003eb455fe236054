//! Startup and command failures of the survey runtime.
//!
//! Request-level failures are [`ApplicationServiceError`]s mapped in the
//! application router; `AppError` covers what happens before or around it.
//!
//! [`ApplicationServiceError`]: crate::workflows::survey::applications::ApplicationServiceError

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::survey::SurveyConfigError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    /// The survey fixture failed to import or its load checks.
    Survey(SurveyConfigError),
}

impl AppError {
    /// Stable slug reported alongside the message.
    pub const fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Telemetry(_) => "telemetry",
            AppError::Io(_) => "io",
            AppError::Survey(_) => "survey_fixture",
        }
    }

    /// Exit code for the CLI: fixture problems are data errors, the rest
    /// are environment errors.
    pub const fn exit_code(&self) -> u8 {
        match self {
            AppError::Survey(_) => 65,
            AppError::Config(_) => 78,
            AppError::Telemetry(_) | AppError::Io(_) => 74,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "invalid configuration: {err}"),
            AppError::Telemetry(err) => write!(f, "could not start logging: {err}"),
            AppError::Io(err) => write!(f, "i/o failure: {err}"),
            AppError::Survey(err) => write!(f, "survey fixture rejected: {err}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Survey(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Survey(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Config(_) | AppError::Telemetry(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({ "error": self.to_string(), "kind": self.kind() }));
        (status, body).into_response()
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

impl From<SurveyConfigError> for AppError {
    fn from(value: SurveyConfigError) -> Self {
        Self::Survey(value)
    }
}
