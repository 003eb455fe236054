use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{ApplicationId, ApplicationRecord, StatusChange};

/// Storage abstraction for the application aggregate.
///
/// `update_with` is the only mutation path for an existing record: the
/// closure runs while the implementation holds the record exclusively, and
/// its changes are committed only when it returns `Ok`.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError>;
    fn update_with<T, E, F>(&self, id: &ApplicationId, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut ApplicationRecord) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Sanitized representation of an application's review state.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Status history as exposed over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct StatusHistoryView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub history: Vec<StatusChange>,
}

impl ApplicationRecord {
    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application.id.clone(),
            status: self.application.status.label(),
            submitted_at: self.application.submitted_at,
        }
    }

    pub fn history_view(&self) -> StatusHistoryView {
        StatusHistoryView {
            application_id: self.application.id.clone(),
            status: self.application.status.label(),
            history: self.history.clone(),
        }
    }
}
