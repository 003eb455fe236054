//! Application drafts, submission, and review on top of the survey runtime.

mod chat;
pub mod documents;
pub mod domain;
mod journal;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;
mod uploads;
pub mod validation;
pub mod views;

#[cfg(test)]
mod tests;

pub use chat::{interpret, ChatPrompt, ChatReply, SKIP_WORDS};
pub use documents::{
    BranchRules, DocumentRequirementChecker, DocumentStore, DocumentStoreError, DocumentVersion,
    DocumentVersionStatus, InMemoryDocumentRegistry, LatestVersion, UploadPolicy, UploadRequest,
    UploadTicket,
};
pub use domain::{
    AnswerItem, ApplicantType, Application, ApplicationId, ApplicationRecord, ApplicationStatus,
    AuditAction, AuditEntry, Comment, ConsentRecord, FieldError, StatusChange,
    PERSONAL_DATA_CONSENT,
};
pub use repository::{
    ApplicationRepository, ApplicationStatusView, RepositoryError, StatusHistoryView,
};
pub use router::application_router;
pub use service::{ApplicationService, ApplicationServiceError, FormSettings};
pub use status::StateTransitionError;
pub use validation::{validate_required, AnswerValidator};
pub use views::{DraftView, QuestionView, StepView};
