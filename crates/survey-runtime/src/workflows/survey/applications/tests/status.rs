use chrono::Utc;

use super::common::*;
use crate::workflows::survey::applications::domain::ApplicationStatus;
use crate::workflows::survey::applications::status::{
    allowed_targets, can_transition, change_status, StateTransitionError,
};

#[test]
fn draft_cannot_jump_to_approved() {
    let mut record = draft_record("app-jump");
    let before = record.clone();

    match change_status(&mut record, ApplicationStatus::Approved, Some("reviewer"), Utc::now()) {
        Err(StateTransitionError { from, to }) => {
            assert_eq!(from, ApplicationStatus::Draft);
            assert_eq!(to, ApplicationStatus::Approved);
        }
        other => panic!("expected transition error, got {other:?}"),
    }
    assert_eq!(record, before);
    assert!(record.history.is_empty());
}

#[test]
fn submission_stamps_timestamp_and_history() {
    let mut record = draft_record("app-submit");
    let now = Utc::now();

    let changed = change_status(&mut record, ApplicationStatus::Submitted, None, now)
        .expect("draft can be submitted");
    assert!(changed);
    assert_eq!(record.application.status, ApplicationStatus::Submitted);
    assert_eq!(record.application.submitted_at, Some(now));
    assert_eq!(record.history.len(), 1);
    assert_eq!(record.history[0].old_status, ApplicationStatus::Draft);
    assert_eq!(record.history[0].new_status, ApplicationStatus::Submitted);
    assert_eq!(record.history[0].actor, None);
}

#[test]
fn same_status_is_a_silent_no_op() {
    let mut record = draft_record("app-same");
    change_status(&mut record, ApplicationStatus::Submitted, None, Utc::now()).expect("submit");

    let changed = change_status(&mut record, ApplicationStatus::Submitted, Some("bot"), Utc::now())
        .expect("no-op");
    assert!(!changed);
    assert_eq!(record.history.len(), 1);
}

#[test]
fn review_outcomes_are_terminal() {
    let mut record = draft_record("app-review");
    change_status(&mut record, ApplicationStatus::Submitted, None, Utc::now()).expect("submit");
    change_status(&mut record, ApplicationStatus::Rejected, Some("reviewer"), Utc::now())
        .expect("submitted can be rejected");
    assert!(record.application.status.is_terminal());
    assert_eq!(record.history[1].actor.as_deref(), Some("reviewer"));

    assert!(change_status(&mut record, ApplicationStatus::Approved, None, Utc::now()).is_err());
    assert_eq!(record.history.len(), 2);
}

#[test]
fn transition_table() {
    use ApplicationStatus::*;

    assert_eq!(allowed_targets(Draft), &[Submitted]);
    assert_eq!(allowed_targets(Submitted), &[UnderReview, Approved, Rejected]);
    assert!(allowed_targets(UnderReview).is_empty());
    assert!(allowed_targets(Approved).is_empty());
    assert!(allowed_targets(Rejected).is_empty());
    assert!(can_transition(Submitted, UnderReview));
    assert!(!can_transition(UnderReview, Approved));
    assert!(!can_transition(Submitted, Draft));
}

#[test]
fn transition_error_message_names_both_statuses() {
    let error = StateTransitionError {
        from: ApplicationStatus::Approved,
        to: ApplicationStatus::Draft,
    };
    assert_eq!(error.to_string(), "status change not allowed: approved -> draft");
}
