use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflows::survey::domain::AnswerMap;

/// Identifier wrapper for applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Review workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who is filling the questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantType {
    /// The beneficiary fills the form themselves.
    #[serde(rename = "self")]
    Applicant,
    Parent,
    Guardian,
    Relative,
}

impl ApplicantType {
    pub const ALL: [ApplicantType; 4] = [
        ApplicantType::Applicant,
        ApplicantType::Parent,
        ApplicantType::Guardian,
        ApplicantType::Relative,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Applicant => "self",
            Self::Parent => "parent",
            Self::Guardian => "guardian",
            Self::Relative => "relative",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == raw)
    }
}

/// Draft or submitted application header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub survey_code: String,
    pub status: ApplicationStatus,
    pub current_step: Option<String>,
    /// Order of the current step, 0 when there is none.
    pub current_stage: u32,
    pub applicant_type: Option<ApplicantType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Stored answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Immutable status log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub old_status: ApplicationStatus,
    pub new_status: ApplicationStatus,
    pub actor: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Note left on an application by staff or the applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub author: Option<String>,
    pub text: String,
    pub is_urgent: bool,
    pub created_at: DateTime<Utc>,
}

pub const PERSONAL_DATA_CONSENT: &str = "personal_data";

/// Latest decision for one consent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub consent_type: String,
    pub is_given: bool,
    pub actor: Option<String>,
    /// Set while consent is given, cleared on withdrawal.
    pub given_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Submit,
    StatusChange,
    CommentAdd,
    Consent,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Submit => "submit",
            Self::StatusChange => "status_change",
            Self::CommentAdd => "comment_add",
            Self::Consent => "consent",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Append-only trail of who did what to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub actor: Option<String>,
    /// Free-form context such as `draft -> submitted`.
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Aggregate persisted as one unit: header, answers, status history,
/// comments, consents, and the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application: Application,
    pub answers: BTreeMap<String, Answer>,
    pub history: Vec<StatusChange>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub consents: Vec<ConsentRecord>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl ApplicationRecord {
    pub fn new(application: Application) -> Self {
        Self {
            application,
            answers: BTreeMap::new(),
            history: Vec::new(),
            comments: Vec::new(),
            consents: Vec::new(),
            audit: Vec::new(),
        }
    }

    pub fn id(&self) -> &ApplicationId {
        &self.application.id
    }

    /// Answer values keyed by question code.
    pub fn answer_map(&self) -> AnswerMap {
        self.answers
            .iter()
            .map(|(code, answer)| (code.clone(), answer.value.clone()))
            .collect()
    }

    /// Upsert keyed by question code; last write wins.
    pub fn set_answer(&mut self, code: &str, value: Value, now: DateTime<Utc>) {
        self.answers.insert(
            code.to_string(),
            Answer {
                value,
                updated_at: now,
            },
        );
        self.application.updated_at = now;
    }
}

/// Problem with one field, keyed by question code (or requirement code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// One entry of an answer patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerItem {
    pub question_code: String,
    #[serde(default)]
    pub value: Value,
}

impl AnswerItem {
    pub fn new(question_code: impl Into<String>, value: Value) -> Self {
        Self {
            question_code: question_code.into(),
            value,
        }
    }
}
