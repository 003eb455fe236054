use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::documents::{DocumentStore, DocumentStoreError, UploadRequest};
use super::domain::{AnswerItem, ApplicationId, ApplicationStatus};
use super::repository::{ApplicationRepository, RepositoryError};
use super::service::{ApplicationService, ApplicationServiceError};

/// Router builder exposing the questionnaire and review endpoints.
pub fn application_router<R, D>(service: Arc<ApplicationService<R, D>>) -> Router
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/forms/:survey_code/sessions",
            post(create_session_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(draft_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/answers",
            patch(patch_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/next",
            post(next_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/submit",
            post(submit_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            patch(status_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/history",
            get(history_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/chat",
            get(chat_prompt_handler::<R, D>).post(chat_answer_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/documents",
            get(documents_handler::<R, D>).post(upload_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/documents/:version_id/complete",
            post(complete_upload_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/comments",
            get(comments_handler::<R, D>).post(add_comment_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/consent",
            get(consents_handler::<R, D>).post(consent_handler::<R, D>),
        )
        .route(
            "/api/v1/applications/:application_id/audit",
            get(audit_handler::<R, D>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub applicant_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatchRequest {
    #[serde(default)]
    pub answers: Vec<AnswerItem>,
    #[serde(default, alias = "step_code")]
    pub step: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub answers: Vec<AnswerItem>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: ApplicationStatus,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatAnswerRequest {
    pub question_code: String,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteUploadRequest {
    #[serde(default)]
    pub mark_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub is_urgent: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    #[serde(default)]
    pub consent_type: Option<String>,
    pub is_given: bool,
    #[serde(default)]
    pub actor: Option<String>,
}

pub(crate) async fn create_session_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(survey_code): Path<String>,
    axum::Json(request): axum::Json<CreateSessionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    match service.create_session(&survey_code, request.applicant_type.as_deref()) {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn draft_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    match service.draft(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn patch_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<PatchRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.apply_patch(&id, &request.answers, request.step.as_deref()) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn next_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<PatchRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    match service.advance(&ApplicationId(application_id), &request.answers) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.submit(&id, &request.answers, request.actor.as_deref()) {
        Ok(view) => (StatusCode::ACCEPTED, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<StatusChangeRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.change_status(&id, request.status, request.actor.as_deref()) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    match service.history(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn chat_prompt_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    match service.active_question(&ApplicationId(application_id)) {
        Ok(Some(prompt)) => {
            let text = prompt.text();
            let payload = json!({ "prompt": prompt, "text": text });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(None) => {
            let payload = json!({ "prompt": null, "finished": true });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn chat_answer_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ChatAnswerRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.answer_turn(&id, &request.question_code, &request.text) {
        Ok(reply) => (StatusCode::OK, axum::Json(reply)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn upload_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<UploadRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    match service.request_upload(&ApplicationId(application_id), &request) {
        Ok(ticket) => (StatusCode::CREATED, axum::Json(ticket)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn complete_upload_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path((application_id, version_id)): Path<(String, String)>,
    request: Option<axum::Json<CompleteUploadRequest>>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let mark_available = request.map_or(false, |axum::Json(request)| request.mark_available);
    let id = ApplicationId(application_id);
    match service.complete_upload(&id, &version_id, mark_available) {
        Ok(status) => {
            let payload = json!({ "version_id": version_id, "status": status });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn documents_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.documents(&id) {
        Ok(documents) => {
            let payload = json!({ "application_id": id, "documents": documents });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn add_comment_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<CommentRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.add_comment(&id, &request.text, request.author.as_deref(), request.is_urgent) {
        Ok(comment) => (StatusCode::CREATED, axum::Json(comment)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn comments_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.comments(&id) {
        Ok(comments) => {
            let payload = json!({ "application_id": id, "comments": comments });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn consent_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ConsentRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.record_consent(
        &id,
        request.consent_type.as_deref(),
        request.is_given,
        request.actor.as_deref(),
    ) {
        Ok(consent) => (StatusCode::CREATED, axum::Json(consent)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn consents_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.consents(&id) {
        Ok(consents) => {
            let payload = json!({ "application_id": id, "consents": consents });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn audit_handler<R, D>(
    State(service): State<Arc<ApplicationService<R, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = ApplicationId(application_id);
    match service.audit_log(&id) {
        Ok(entries) => {
            let payload = json!({ "application_id": id, "audit": entries });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: ApplicationServiceError) -> Response {
    let (status, payload) = match &error {
        ApplicationServiceError::Validation(errors) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": error.to_string(), "errors": errors }),
        ),
        ApplicationServiceError::ConsentDeclined => (
            StatusCode::BAD_REQUEST,
            json!({ "error": error.to_string(), "consent_declined": true }),
        ),
        ApplicationServiceError::UnknownQuestion(_) | ApplicationServiceError::UnknownStep(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": error.to_string() }))
        }
        ApplicationServiceError::Documents(
            DocumentStoreError::ContentType(_)
            | DocumentStoreError::Extension(_)
            | DocumentStoreError::TooLarge { .. }
            | DocumentStoreError::LimitReached { .. },
        ) => (StatusCode::BAD_REQUEST, json!({ "error": error.to_string() })),
        ApplicationServiceError::UnknownSurvey(_)
        | ApplicationServiceError::Documents(
            DocumentStoreError::UnknownDocument(_) | DocumentStoreError::UnknownVersion(_),
        )
        | ApplicationServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, json!({ "error": error.to_string() }))
        }
        ApplicationServiceError::Transition(_)
        | ApplicationServiceError::Repository(RepositoryError::Conflict) => {
            (StatusCode::CONFLICT, json!({ "error": error.to_string() }))
        }
        ApplicationServiceError::Documents(DocumentStoreError::Unavailable(_))
        | ApplicationServiceError::Repository(RepositoryError::Unavailable(_)) => {
            warn!(%error, "collaborator unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": error.to_string(), "retryable": true }),
            )
        }
    };
    (status, axum::Json(payload)).into_response()
}
