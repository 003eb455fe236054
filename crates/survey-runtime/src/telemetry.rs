//! Log subscriber for the survey runtime.
//!
//! Application audit events are emitted on the `audit` target; unless
//! disabled they stay visible at info even when the base level is quieter.

use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug)]
pub enum TelemetryError {
    /// `APP_LOG_LEVEL` (plus the audit directive) is not a valid filter.
    Filter { directives: String, source: ParseError },
    /// A global subscriber was already installed.
    AlreadyInstalled(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Filter { directives, source } => {
                write!(f, "log filter '{directives}' is not valid: {source}")
            }
            TelemetryError::AlreadyInstalled(err) => {
                write!(f, "log subscriber already installed: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Filter { source, .. } => Some(source),
            TelemetryError::AlreadyInstalled(err) => Some(&**err),
        }
    }
}

/// Install the global subscriber. `RUST_LOG`, when set and valid, replaces
/// the configured directives entirely.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.audit_log)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::AlreadyInstalled)
}

fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    let directives = directives(config);
    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::Filter { directives, source })
}

/// Configured level plus `audit=info`, unless the level already names the
/// audit target or audit logging is off.
fn directives(config: &TelemetryConfig) -> String {
    let level = config.log_level.trim();
    let mentions_audit = level
        .split(',')
        .any(|directive| directive.trim().starts_with(AUDIT_TARGET));
    if !config.audit_log || mentions_audit {
        return level.to_string();
    }
    if level.is_empty() {
        format!("{AUDIT_TARGET}=info")
    } else {
        format!("{level},{AUDIT_TARGET}=info")
    }
}
