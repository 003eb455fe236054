use chrono::{DateTime, Utc};

use super::domain::{ApplicationRecord, ApplicationStatus, StatusChange};

/// Illegal status change; the record is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("status change not allowed: {from} -> {to}")]
pub struct StateTransitionError {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// Targets reachable from `status` in one step.
pub const fn allowed_targets(status: ApplicationStatus) -> &'static [ApplicationStatus] {
    match status {
        ApplicationStatus::Draft => &[ApplicationStatus::Submitted],
        ApplicationStatus::Submitted => &[
            ApplicationStatus::UnderReview,
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
        ],
        ApplicationStatus::UnderReview
        | ApplicationStatus::Approved
        | ApplicationStatus::Rejected => &[],
    }
}

pub fn can_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Move `record` to `new_status`, appending the matching history row.
///
/// Returns `Ok(false)` when the record already has `new_status`. Status and
/// history live in the same record, so callers persisting it through
/// `ApplicationRepository::update_with` commit both together.
pub fn change_status(
    record: &mut ApplicationRecord,
    new_status: ApplicationStatus,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, StateTransitionError> {
    let current = record.application.status;
    if current == new_status {
        return Ok(false);
    }
    if !can_transition(current, new_status) {
        return Err(StateTransitionError {
            from: current,
            to: new_status,
        });
    }

    record.history.push(StatusChange {
        old_status: current,
        new_status,
        actor: actor.map(str::to_string),
        changed_at: now,
    });
    record.application.status = new_status;
    record.application.updated_at = now;
    if new_status == ApplicationStatus::Submitted {
        record.application.submitted_at = Some(now);
    }
    Ok(true)
}
