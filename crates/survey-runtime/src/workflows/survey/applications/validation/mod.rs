//! Per-type answer normalization and required-field checks.
//!
//! Normalization is idempotent: feeding a normalized value back through
//! [`AnswerValidator::validate`] returns it unchanged.

mod rules;

pub(crate) use rules::parse_boolean;

use chrono::{NaiveDate, Utc};
use serde_json::Value;

use super::domain::FieldError;
use crate::workflows::survey::domain::{AnswerMap, Question, QuestionType, Step};
use crate::workflows::survey::visibility::visible_questions;

pub const REQUIRED_MESSAGE: &str = "required";

/// Validator bound to the calendar day used by `not_in_future` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerValidator {
    today: NaiveDate,
}

impl Default for AnswerValidator {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl AnswerValidator {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Normalize `raw` for `question`, or explain why it is unacceptable.
    ///
    /// Missing values pass through as `null`; required-ness is checked by
    /// [`validate_required`].
    pub fn validate(&self, question: &Question, raw: &Value) -> Result<Value, FieldError> {
        let outcome = match question.kind {
            QuestionType::Text | QuestionType::Textarea => rules::text(question, raw),
            QuestionType::File | QuestionType::FileMulti => Ok(raw.clone()),
            QuestionType::SelectMany if raw.is_null() => Ok(Value::Null),
            QuestionType::SelectMany => rules::select_many(question, raw),
            _ if rules::is_blank(raw) => Ok(Value::Null),
            QuestionType::Email => rules::email(raw),
            QuestionType::Phone => rules::phone(raw),
            QuestionType::Date => rules::date(question, raw, self.today),
            QuestionType::Boolean | QuestionType::YesNo => rules::boolean(raw),
            QuestionType::SelectOne => rules::select_one(question, raw),
            QuestionType::Number => rules::number(raw),
        };
        outcome.map_err(|message| FieldError::new(question.code.clone(), message))
    }
}

/// Missing answers among the visible required questions of `step`.
pub fn validate_required(step: &Step, answers: &AnswerMap) -> Vec<FieldError> {
    visible_questions(step, answers)
        .into_iter()
        .filter(|question| question.required)
        .filter(|question| answers.get(&question.code).map_or(true, is_missing))
        .map(|question| FieldError::new(question.code.clone(), REQUIRED_MESSAGE))
        .collect()
}

/// `null`, `""`, `[]`, and `{}` count as unanswered.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
