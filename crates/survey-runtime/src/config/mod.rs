use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::survey::applications::{FormSettings, UploadPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub forms: FormsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let audit_log = env::var("APP_AUDIT_LOG").map_or(true, |raw| {
            !matches!(raw.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no")
        });

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                audit_log,
            },
            forms: FormsConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Keep application audit events at info regardless of `log_level`.
    pub audit_log: bool,
}

/// Survey fixture location, consent question, and upload limits.
#[derive(Debug, Clone)]
pub struct FormsConfig {
    /// `None` serves the bundled default survey.
    pub survey_fixture: Option<PathBuf>,
    pub consent_question: String,
    pub uploads: UploadPolicy,
}

impl FormsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut uploads = UploadPolicy::default();
        if let Ok(raw) = env::var("APP_DOCUMENTS_MAX_PER_APPLICATION") {
            uploads.max_documents_per_application = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber("APP_DOCUMENTS_MAX_PER_APPLICATION"))?;
        }
        if let Ok(raw) = env::var("APP_DOCUMENTS_MAX_FILE_SIZE") {
            uploads.max_file_size = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber("APP_DOCUMENTS_MAX_FILE_SIZE"))?;
        }
        if let Ok(raw) = env::var("APP_DOCUMENTS_ALLOWED_EXTENSIONS") {
            let extensions: Vec<String> = raw
                .split(',')
                .map(|item| item.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|item| !item.is_empty())
                .collect();
            if !extensions.is_empty() {
                uploads.allowed_extensions = extensions;
            }
        }

        let consent_question = env::var("APP_CONSENT_QUESTION")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| FormSettings::default().consent_question);

        Ok(Self {
            survey_fixture: env::var_os("APP_SURVEY_FIXTURE").map(PathBuf::from),
            consent_question,
            uploads,
        })
    }

    pub fn form_settings(&self) -> FormSettings {
        FormSettings {
            consent_question: self.consent_question.clone(),
            ..FormSettings::default()
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber(name) => {
                write!(f, "{name} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
