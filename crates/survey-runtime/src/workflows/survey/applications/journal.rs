//! Comments, consent decisions, and the audit trail kept on each record.

use chrono::{DateTime, Utc};
use tracing::info;

use super::documents::DocumentStore;
use super::domain::{
    ApplicationId, ApplicationRecord, AuditAction, AuditEntry, Comment, ConsentRecord, FieldError,
    PERSONAL_DATA_CONSENT,
};
use super::repository::ApplicationRepository;
use super::service::{ApplicationService, ApplicationServiceError};

impl<R, D> ApplicationService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    pub fn add_comment(
        &self,
        id: &ApplicationId,
        text: &str,
        author: Option<&str>,
        is_urgent: bool,
    ) -> Result<Comment, ApplicationServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApplicationServiceError::Validation(vec![FieldError::new(
                "comment",
                "comment text must not be empty",
            )]));
        }

        self.mutate(id, |_, _, record| {
            let now = Utc::now();
            let comment = Comment {
                id: record.comments.iter().map(|comment| comment.id).max().unwrap_or(0) + 1,
                author: author.map(str::to_string),
                text: text.to_string(),
                is_urgent,
                created_at: now,
            };
            record.comments.push(comment.clone());
            let detail = is_urgent.then(|| "urgent".to_string());
            audit(record, AuditAction::CommentAdd, author, detail, now);
            Ok(comment)
        })
    }

    /// Newest first.
    pub fn comments(&self, id: &ApplicationId) -> Result<Vec<Comment>, ApplicationServiceError> {
        let mut comments = self.load(id)?.comments;
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    /// Upsert the decision for `consent_type` (personal data by default).
    /// Withdrawing consent is recorded; it does not delete the application.
    pub fn record_consent(
        &self,
        id: &ApplicationId,
        consent_type: Option<&str>,
        is_given: bool,
        actor: Option<&str>,
    ) -> Result<ConsentRecord, ApplicationServiceError> {
        let consent_type = consent_type
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
            .unwrap_or(PERSONAL_DATA_CONSENT);
        self.mutate(id, |_, _, record| {
            let now = Utc::now();
            let consent = upsert_consent(record, consent_type, is_given, actor, now);
            let state = if is_given { "given" } else { "withdrawn" };
            audit(
                record,
                AuditAction::Consent,
                actor,
                Some(format!("{consent_type}: {state}")),
                now,
            );
            Ok(consent)
        })
    }

    pub fn consents(&self, id: &ApplicationId) -> Result<Vec<ConsentRecord>, ApplicationServiceError> {
        Ok(self.load(id)?.consents)
    }

    /// Oldest first, in the order the actions were committed.
    pub fn audit_log(&self, id: &ApplicationId) -> Result<Vec<AuditEntry>, ApplicationServiceError> {
        Ok(self.load(id)?.audit)
    }
}

pub(crate) fn upsert_consent(
    record: &mut ApplicationRecord,
    consent_type: &str,
    is_given: bool,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> ConsentRecord {
    let consent = ConsentRecord {
        consent_type: consent_type.to_string(),
        is_given,
        actor: actor.map(str::to_string),
        given_at: is_given.then_some(now),
        recorded_at: now,
    };
    match record
        .consents
        .iter_mut()
        .find(|existing| existing.consent_type == consent_type)
    {
        Some(existing) => {
            let given_at = if is_given { existing.given_at.or(Some(now)) } else { None };
            *existing = ConsentRecord {
                given_at,
                ..consent.clone()
            };
            existing.clone()
        }
        None => {
            record.consents.push(consent.clone());
            consent
        }
    }
}

/// Append to the record's trail and mirror the entry to the `audit` target.
pub(crate) fn audit(
    record: &mut ApplicationRecord,
    action: AuditAction,
    actor: Option<&str>,
    detail: Option<String>,
    at: DateTime<Utc>,
) {
    info!(
        target: "audit",
        application_id = %record.application.id,
        %action,
        actor = actor.unwrap_or("-"),
        detail = detail.as_deref().unwrap_or(""),
        "application audit"
    );
    record.audit.push(AuditEntry {
        action,
        actor: actor.map(str::to_string),
        detail,
        at,
    });
}
