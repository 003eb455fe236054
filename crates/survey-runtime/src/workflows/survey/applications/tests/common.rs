use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use crate::workflows::survey::applications::documents::{
    BranchRules, DocumentRequirementChecker, DocumentStore, DocumentStoreError,
    DocumentVersionStatus, InMemoryDocumentRegistry, LatestVersion, UploadPolicy, UploadRequest,
    UploadTicket,
};
use crate::workflows::survey::applications::domain::{
    AnswerItem, Application, ApplicationId, ApplicationRecord, ApplicationStatus,
};
use crate::workflows::survey::applications::repository::{ApplicationRepository, RepositoryError};
use crate::workflows::survey::applications::{application_router, ApplicationService, FormSettings};
use crate::workflows::survey::catalog::SurveyCatalog;

pub(super) type MemoryService = ApplicationService<MemoryRepository, InMemoryDocumentRegistry>;

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

pub(super) fn catalog() -> Arc<SurveyCatalog> {
    Arc::new(SurveyCatalog::bundled().expect("bundled survey loads"))
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<MemoryRepository>,
    Arc<InMemoryDocumentRegistry>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let registry = Arc::new(InMemoryDocumentRegistry::new(UploadPolicy::default()));
    let checker = Arc::new(DocumentRequirementChecker::new(
        registry.clone(),
        BranchRules::default(),
    ));
    let service = ApplicationService::new(
        catalog(),
        repository.clone(),
        checker,
        FormSettings::default(),
    )
    .with_today(today());
    (service, repository, registry)
}

pub(super) fn service_with<R, D>(repository: Arc<R>, store: Arc<D>) -> ApplicationService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let checker = Arc::new(DocumentRequirementChecker::new(store, BranchRules::default()));
    ApplicationService::new(catalog(), repository, checker, FormSettings::default())
        .with_today(today())
}

pub(super) fn item(code: &str, value: Value) -> AnswerItem {
    AnswerItem::new(code, value)
}

pub(super) fn intro_answers(who: &str) -> Vec<AnswerItem> {
    vec![item("q_agree", json!(true)), item("q_who_fills", json!(who))]
}

pub(super) fn basic_answers() -> Vec<AnswerItem> {
    vec![
        item("q_full_name", json!("  Anna Petrova ")),
        item("q_dob", json!("1990-04-12")),
        item("q_phone", json!("+7 (999) 123-45-67")),
    ]
}

pub(super) fn child_basic_answers() -> Vec<AnswerItem> {
    vec![
        item("q_full_name", json!("Misha Petrov")),
        item("q_dob", json!("2015-06-15")),
        item("q_phone", json!("+79990001122")),
    ]
}

/// Walks an adult applicant (`self`) up to the final step.
pub(super) fn adult_draft(service: &MemoryService) -> ApplicationId {
    let view = service
        .create_session("default", None)
        .expect("session created");
    let id = view.application_id;
    service.advance(&id, &intro_answers("self")).expect("intro done");
    service.advance(&id, &basic_answers()).expect("basic done");
    service
        .advance(&id, &[item("q_employment", json!("unemployed"))])
        .expect("adult step done");
    id
}

/// Completes and stores a ready version for `requirement_code`.
pub(super) fn upload(registry: &InMemoryDocumentRegistry, id: &ApplicationId, requirement_code: &str) {
    let ticket = registry
        .request_upload(id, Some(requirement_code), None, "scan.pdf", "application/pdf", 2048)
        .expect("upload slot");
    registry
        .complete_upload(&ticket.version_id, false)
        .expect("upload completes");
}

pub(super) fn draft_record(id: &str) -> ApplicationRecord {
    let now = Utc
        .with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    ApplicationRecord::new(Application {
        id: ApplicationId(id.to_string()),
        survey_code: "default".to_string(),
        status: ApplicationStatus::Draft,
        current_step: Some("intro".to_string()),
        current_stage: 1,
        applicant_type: None,
        created_at: now,
        updated_at: now,
        submitted_at: None,
    })
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: &ApplicationId) -> Option<ApplicationRecord> {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.remove(id);
        Ok(())
    }

    fn update_with<T, E, F>(&self, id: &ApplicationId, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut ApplicationRecord) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let current = guard.get(id).ok_or(RepositoryError::NotFound)?;
        let mut working = current.clone();
        let outcome = mutation(&mut working)?;
        guard.insert(id.clone(), working);
        Ok(outcome)
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &ApplicationId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_with<T, E, F>(&self, _id: &ApplicationId, _mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut ApplicationRecord) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }
}

pub(super) struct UnavailableDocuments;

impl DocumentStore for UnavailableDocuments {
    fn list_latest_versions(
        &self,
        _application: &ApplicationId,
    ) -> Result<Vec<LatestVersion>, DocumentStoreError> {
        Err(DocumentStoreError::Unavailable("storage offline".to_string()))
    }

    fn start_upload(
        &self,
        _application: &ApplicationId,
        _request: &UploadRequest,
    ) -> Result<UploadTicket, DocumentStoreError> {
        Err(DocumentStoreError::Unavailable("storage offline".to_string()))
    }

    fn finish_upload(
        &self,
        _application: &ApplicationId,
        _version_id: &str,
        _mark_available: bool,
    ) -> Result<DocumentVersionStatus, DocumentStoreError> {
        Err(DocumentStoreError::Unavailable("storage offline".to_string()))
    }

    fn discard(&self, _application: &ApplicationId) -> Result<(), DocumentStoreError> {
        Err(DocumentStoreError::Unavailable("storage offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}

pub(super) fn router_with_service(service: MemoryService) -> axum::Router {
    application_router(Arc::new(service))
}
