use serde_json::json;

use super::common::*;
use crate::workflows::survey::applications::domain::{ApplicationId, ApplicationStatus, AuditAction};
use crate::workflows::survey::applications::repository::RepositoryError;
use crate::workflows::survey::applications::ApplicationServiceError;

#[test]
fn comments_are_listed_newest_first() {
    let (service, _, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    service.add_comment(&id, "first", Some("operator"), false).expect("comment");
    let second = service.add_comment(&id, " second ", None, true).expect("comment");
    assert_eq!(second.id, 2);
    assert_eq!(second.text, "second");

    let comments = service.comments(&id).expect("comments");
    let texts: Vec<&str> = comments.iter().map(|comment| comment.text.as_str()).collect();
    assert_eq!(texts, vec!["second", "first"]);

    match service.add_comment(&id, "  ", None, false) {
        Err(ApplicationServiceError::Validation(errors)) => assert_eq!(errors[0].field, "comment"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn consent_is_upserted_per_type() {
    let (service, repository, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    let given = service.record_consent(&id, None, true, Some("applicant")).expect("consent");
    assert_eq!(given.consent_type, "personal_data");
    assert!(given.given_at.is_some());

    let withdrawn = service
        .record_consent(&id, Some("personal_data"), false, Some("applicant"))
        .expect("consent");
    assert!(!withdrawn.is_given);
    assert_eq!(withdrawn.given_at, None);

    service.record_consent(&id, Some("marketing"), true, None).expect("consent");

    let stored = repository.stored(&id).expect("withdrawal keeps the record");
    assert_eq!(stored.consents.len(), 2);
    assert!(!stored.consents[0].is_given);
}

#[test]
fn answering_the_consent_question_records_consent_once() {
    let (service, repository, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    service.apply_patch(&id, &[item("q_agree", json!(true))], None).expect("patch");
    service.apply_patch(&id, &[item("q_agree", json!("yes"))], None).expect("patch");

    let stored = repository.stored(&id).expect("stored");
    assert_eq!(stored.consents.len(), 1);
    assert!(stored.consents[0].is_given);
    let consents = stored
        .audit
        .iter()
        .filter(|entry| entry.action == AuditAction::Consent)
        .count();
    assert_eq!(consents, 1);
}

#[test]
fn audit_trail_follows_the_application_lifecycle() {
    let (service, _, registry) = build_service();
    let id = adult_draft(&service);
    upload(&registry, &id, "passport");

    service.submit(&id, &[], Some("applicant")).expect("submitted");
    service.submit(&id, &[], Some("applicant")).expect("no-op");
    service
        .change_status(&id, ApplicationStatus::Approved, Some("reviewer"))
        .expect("approved");
    let _ = service.change_status(&id, ApplicationStatus::Draft, Some("reviewer"));

    let entries = service.audit_log(&id).expect("audit");
    let actions: Vec<AuditAction> = entries.iter().map(|entry| entry.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Create,
            AuditAction::Consent,
            AuditAction::Submit,
            AuditAction::StatusChange,
        ]
    );
    let last = entries.last().expect("status change");
    assert_eq!(last.actor.as_deref(), Some("reviewer"));
    assert_eq!(last.detail.as_deref(), Some("submitted -> approved"));
}

#[test]
fn journal_on_missing_application_is_not_found() {
    let (service, _, _) = build_service();
    let missing = ApplicationId("app-missing".to_string());

    match service.add_comment(&missing, "hello", None, false) {
        Err(ApplicationServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
    match service.audit_log(&missing) {
        Err(ApplicationServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}
