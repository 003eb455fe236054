//! Document upload slots for an application.
//!
//! Bytes travel straight to object storage; the service only issues slots,
//! confirms them, and reports what the requirement check will see.

use tracing::{debug, info};

use super::documents::{
    DocumentStore, DocumentVersionStatus, LatestVersion, UploadRequest, UploadTicket,
};
use super::domain::{ApplicationId, FieldError};
use super::repository::ApplicationRepository;
use super::service::{ApplicationService, ApplicationServiceError};

impl<R, D> ApplicationService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    /// Reserve an upload slot. A requirement code must name one of the
    /// survey's document requirements.
    pub fn request_upload(
        &self,
        id: &ApplicationId,
        request: &UploadRequest,
    ) -> Result<UploadTicket, ApplicationServiceError> {
        let record = self.load(id)?;
        let survey = self.survey_for(&record)?;
        if let Some(code) = request.requirement_code.as_deref() {
            let known = survey
                .document_requirements
                .iter()
                .any(|requirement| requirement.code == code);
            if !known {
                return Err(ApplicationServiceError::Validation(vec![FieldError::new(
                    "requirement_code",
                    format!("unknown document requirement '{code}'"),
                )]));
            }
        }

        let ticket = self.document_store().start_upload(id, request)?;
        info!(
            application_id = %id,
            document_id = ticket.document_id,
            version = ticket.version,
            requirement = request.requirement_code.as_deref().unwrap_or("-"),
            "upload slot issued"
        );
        Ok(ticket)
    }

    /// Confirm that the bytes for `version_id` reached storage.
    pub fn complete_upload(
        &self,
        id: &ApplicationId,
        version_id: &str,
        mark_available: bool,
    ) -> Result<DocumentVersionStatus, ApplicationServiceError> {
        self.load(id)?;
        let status = self
            .document_store()
            .finish_upload(id, version_id, mark_available)?;
        debug!(application_id = %id, version_id, status = status.label(), "upload completed");
        Ok(status)
    }

    /// Latest version status per requirement-linked document.
    pub fn documents(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<LatestVersion>, ApplicationServiceError> {
        self.load(id)?;
        Ok(self.document_store().list_latest_versions(id)?)
    }
}
