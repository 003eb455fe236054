use std::sync::Arc;
use std::thread;

use serde_json::json;

use super::common::*;
use crate::workflows::survey::applications::documents::{DocumentStore, DocumentStoreError, InMemoryDocumentRegistry};
use crate::workflows::survey::applications::domain::{ApplicantType, ApplicationId, ApplicationStatus};
use crate::workflows::survey::applications::repository::RepositoryError;
use crate::workflows::survey::applications::ApplicationServiceError;

#[test]
fn create_session_starts_on_first_step_with_defaults() {
    let (service, repository, _) = build_service();

    let view = service
        .create_session("default", Some("parent"))
        .expect("session created");
    assert!(view.application_id.0.starts_with("app-"));
    assert_eq!(view.status, "draft");
    assert_eq!(view.current_stage, 1);
    let step = view.current_step.expect("first step");
    assert_eq!(step.code, "intro");
    let codes: Vec<&str> = step.questions.iter().map(|q| q.code.as_str()).collect();
    assert_eq!(codes, vec!["q_agree", "q_who_fills"]);
    assert_eq!(view.answers["q_application_date"], json!("2025-06-01"));

    let stored = repository.stored(&view.application_id).expect("stored");
    assert_eq!(stored.application.applicant_type, Some(ApplicantType::Parent));
}

#[test]
fn create_session_rejects_unknown_survey_and_applicant_type() {
    let (service, _, _) = build_service();

    match service.create_session("missing", None) {
        Err(ApplicationServiceError::UnknownSurvey(code)) => assert_eq!(code, "missing"),
        other => panic!("expected unknown survey, got {other:?}"),
    }
    match service.create_session("default", Some("neighbour")) {
        Err(ApplicationServiceError::Validation(errors)) => {
            assert_eq!(errors[0].field, "applicant_type")
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn applying_the_same_patch_twice_is_idempotent() {
    let (service, repository, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    let first = service.apply_patch(&id, &basic_answers(), None).expect("first patch");
    let once = repository.stored(&id).expect("stored").answer_map();
    let second = service.apply_patch(&id, &basic_answers(), None).expect("second patch");
    let twice = repository.stored(&id).expect("stored").answer_map();

    assert_eq!(once, twice);
    assert_eq!(first.answers, second.answers);
    assert_eq!(twice["q_full_name"], json!("Anna Petrova"));
    assert_eq!(twice["q_phone"], json!("+79991234567"));
}

#[test]
fn patch_with_one_bad_item_writes_nothing() {
    let (service, repository, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    let items = vec![
        item("q_full_name", json!("Anna")),
        item("q_dob", json!("15.06.2015")),
        item("q_phone", json!("12345")),
    ];
    match service.apply_patch(&id, &items, None) {
        Err(ApplicationServiceError::Validation(errors)) => {
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["q_dob", "q_phone"]);
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
    let stored = repository.stored(&id).expect("stored");
    assert!(!stored.answers.contains_key("q_full_name"));
}

#[test]
fn unknown_question_code_raises() {
    let (service, _, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    match service.apply_patch(&id, &[item("q_shoe_size", json!(42))], None) {
        Err(ApplicationServiceError::UnknownQuestion(code)) => assert_eq!(code, "q_shoe_size"),
        other => panic!("expected unknown question, got {other:?}"),
    }
}

#[test]
fn patch_can_reposition_the_draft() {
    let (service, _, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    let view = service.apply_patch(&id, &[], Some("s1_basic")).expect("moved");
    assert_eq!(view.current_stage, 2);
    assert_eq!(view.current_step.expect("step").code, "s1_basic");

    match service.apply_patch(&id, &[], Some("s9_unknown")) {
        Err(ApplicationServiceError::UnknownStep(code)) => assert_eq!(code, "s9_unknown"),
        other => panic!("expected unknown step, got {other:?}"),
    }
}

#[test]
fn advance_requires_visible_required_answers() {
    let (service, repository, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    match service.advance(&id, &[item("q_agree", json!(true))]) {
        Err(ApplicationServiceError::Validation(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "q_who_fills");
        }
        other => panic!("expected missing answer, got {other:?}"),
    }
    let stored = repository.stored(&id).expect("stored");
    assert_eq!(stored.application.current_step.as_deref(), Some("intro"));
    assert_eq!(stored.answers["q_agree"].value, json!(true));
}

#[test]
fn adult_path_skips_child_step() {
    let (service, _, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    let view = service.advance(&id, &intro_answers("relative")).expect("intro");
    assert_eq!(view.current_step.expect("step").code, "s1_basic");
    let view = service.advance(&id, &basic_answers()).expect("basic");
    let step = view.current_step.expect("step");
    assert_eq!(step.code, "s2_adult");
    assert_eq!(step.questions.len(), 1, "income stays hidden until employed");

    let view = service
        .apply_patch(&id, &[item("q_employment", json!("employed"))], None)
        .expect("patched");
    assert_eq!(view.current_step.expect("step").questions.len(), 2);

    let view = service.advance(&id, &[]).expect("adult");
    assert_eq!(view.current_step.expect("step").code, "s3_final");
    assert_eq!(view.current_stage, 5);

    let view = service.advance(&id, &[]).expect("final");
    assert!(view.current_step.is_none());
    assert_eq!(view.current_stage, 0);
    assert!(view.restart_available);
}

#[test]
fn child_path_visits_child_step() {
    let (service, _, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;

    service.advance(&id, &intro_answers("guardian")).expect("intro");
    let view = service.advance(&id, &child_basic_answers()).expect("basic");
    assert_eq!(view.current_step.expect("step").code, "s2_child");
    let view = service
        .advance(&id, &[item("q_child_school", json!("School 17"))])
        .expect("child");
    assert_eq!(view.current_step.expect("step").code, "s3_final");
}

#[test]
fn declined_consent_deletes_the_draft_and_documents() {
    let (service, repository, registry) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;
    upload(&registry, &id, "passport");

    match service.apply_patch(&id, &[item("q_agree", json!("no"))], None) {
        Err(ApplicationServiceError::ConsentDeclined) => {}
        other => panic!("expected consent decline, got {other:?}"),
    }
    assert!(repository.stored(&id).is_none());
    assert!(registry.list_latest_versions(&id).expect("list").is_empty());

    match service.draft(&id) {
        Err(ApplicationServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn submit_reports_every_gap_in_one_pass() {
    let (service, repository, _) = build_service();
    let id = service.create_session("default", None).expect("session").application_id;
    service.advance(&id, &intro_answers("self")).expect("intro");

    match service.submit(&id, &[item("q_full_name", json!("Anna"))], None) {
        Err(ApplicationServiceError::Validation(errors)) => {
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["q_dob", "q_phone", "q_employment", "passport"]);
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
    let stored = repository.stored(&id).expect("stored");
    assert_eq!(stored.application.status, ApplicationStatus::Draft);
    assert_eq!(stored.answers["q_full_name"].value, json!("Anna"));
    assert!(stored.history.is_empty());
}

#[test]
fn submit_transitions_once_documents_are_uploaded() {
    let (service, repository, registry) = build_service();
    let id = adult_draft(&service);

    match service.submit(&id, &[], Some("applicant")) {
        Err(ApplicationServiceError::Validation(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "passport");
        }
        other => panic!("expected missing document, got {other:?}"),
    }

    upload(&registry, &id, "passport");
    let view = service.submit(&id, &[], Some("applicant")).expect("submitted");
    assert_eq!(view.status, "submitted");
    assert!(view.submitted_at.is_some());

    let again = service.submit(&id, &[], Some("applicant")).expect("no-op");
    assert_eq!(again.submitted_at, view.submitted_at);

    let stored = repository.stored(&id).expect("stored");
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].actor.as_deref(), Some("applicant"));
}

#[test]
fn concurrent_submits_write_one_history_row() {
    let (service, repository, registry) = build_service();
    let id = adult_draft(&service);
    upload(&registry, &id, "passport");

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| service.submit(&id, &[], None)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("submit thread"))
            .collect()
    });

    for result in &results {
        match result {
            Ok(view) => assert_eq!(view.status, "submitted"),
            Err(ApplicationServiceError::Transition(_)) => {}
            other => panic!("unexpected submit outcome {other:?}"),
        }
    }
    let stored = repository.stored(&id).expect("stored");
    assert_eq!(stored.application.status, ApplicationStatus::Submitted);
    assert_eq!(stored.history.len(), 1);
}

#[test]
fn reviewer_status_changes_follow_the_state_machine() {
    let (service, repository, registry) = build_service();
    let id = adult_draft(&service);

    match service.change_status(&id, ApplicationStatus::Approved, Some("reviewer")) {
        Err(ApplicationServiceError::Transition(error)) => {
            assert_eq!(error.to_string(), "status change not allowed: draft -> approved")
        }
        other => panic!("expected transition error, got {other:?}"),
    }
    assert!(repository.stored(&id).expect("stored").history.is_empty());

    upload(&registry, &id, "passport");
    service.submit(&id, &[], None).expect("submitted");
    let view = service
        .change_status(&id, ApplicationStatus::Approved, Some("reviewer"))
        .expect("approved");
    assert_eq!(view.status, "approved");

    let history = service.history(&id).expect("history");
    assert_eq!(history.history.len(), 2);
    assert_eq!(history.history[1].old_status, ApplicationStatus::Submitted);
    assert_eq!(history.history[1].actor.as_deref(), Some("reviewer"));
}

#[test]
fn unavailable_document_store_blocks_submission() {
    let repository = Arc::new(MemoryRepository::default());
    let service = service_with(repository.clone(), Arc::new(UnavailableDocuments));
    let id = service.create_session("default", None).expect("session").application_id;
    service.advance(&id, &intro_answers("self")).expect("intro");
    service.advance(&id, &basic_answers()).expect("basic");
    service
        .advance(&id, &[item("q_employment", json!("retired"))])
        .expect("adult");

    match service.submit(&id, &[], None) {
        Err(ApplicationServiceError::Documents(DocumentStoreError::Unavailable(_))) => {}
        other => panic!("expected unavailable documents, got {other:?}"),
    }
    assert_eq!(
        repository.stored(&id).expect("stored").application.status,
        ApplicationStatus::Draft
    );
}

#[test]
fn unavailable_repository_propagates() {
    let service = service_with(
        Arc::new(UnavailableRepository),
        Arc::new(InMemoryDocumentRegistry::default()),
    );

    match service.create_session("default", None) {
        Err(ApplicationServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected unavailable repository, got {other:?}"),
    }
    match service.advance(&ApplicationId("app-000001".to_string()), &[]) {
        Err(ApplicationServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected unavailable repository, got {other:?}"),
    }
}
