//! Turn-oriented front-end: one question per message.
//!
//! Shares validation, consent handling, and navigation with the
//! page-oriented operations, so both reach the same step sequence.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::documents::DocumentStore;
use super::domain::{AnswerItem, ApplicationId, ApplicationRecord, FieldError};
use super::repository::ApplicationRepository;
use super::service::{current_step, ApplicationService, ApplicationServiceError};
use super::validation::{is_missing, parse_boolean, REQUIRED_MESSAGE};
use super::views::QuestionView;
use crate::workflows::survey::domain::{Question, QuestionType, Survey};
use crate::workflows::survey::navigation::next_step;
use crate::workflows::survey::visibility::visible_questions_for_display;

/// Words that skip an optional question.
pub const SKIP_WORDS: [&str; 3] = ["skip", "later", "пропустить"];

const CHAT_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];

/// Next question to put in front of the applicant.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPrompt {
    pub application_id: ApplicationId,
    pub step_code: String,
    pub stage: u32,
    pub question: QuestionView,
}

impl ChatPrompt {
    /// Plain-text rendering for messengers without structured widgets.
    pub fn text(&self) -> String {
        let mut lines = vec![self.question.label.clone()];
        if let Some(help) = &self.question.help_text {
            lines.push(help.clone());
        }
        lines.extend(
            self.question
                .options
                .iter()
                .map(|option| format!("- {}", option.label)),
        );
        if !self.question.required {
            lines.push(format!("(type \"{}\" to skip)", SKIP_WORDS[0]));
        }
        lines.join("\n")
    }
}

/// Outcome of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub application_id: ApplicationId,
    pub question_code: String,
    pub accepted: Value,
    /// `None` once the questionnaire has nothing left to ask.
    pub next: Option<ChatPrompt>,
}

impl<R, D> ApplicationService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    /// First unanswered visible question, moving the step pointer forward
    /// over exhausted steps. `None` when the questionnaire is complete.
    pub fn active_question(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ChatPrompt>, ApplicationServiceError> {
        self.mutate(id, |service, survey, record| {
            service.fill_defaults(survey, record);
            Ok(seek_active(survey, record))
        })
    }

    /// Interpret `text` as the answer to `question_code`, store it, and
    /// return the next prompt.
    pub fn answer_turn(
        &self,
        id: &ApplicationId,
        question_code: &str,
        text: &str,
    ) -> Result<ChatReply, ApplicationServiceError> {
        let (accepted, next) = self.mutate(id, |service, survey, record| {
            let question = survey
                .question(question_code)
                .ok_or_else(|| ApplicationServiceError::UnknownQuestion(question_code.to_string()))?;

            let raw = interpret(question, text)
                .map_err(|error| ApplicationServiceError::Validation(vec![error]))?;
            if question.required && is_missing(&raw) {
                return Err(ApplicationServiceError::Validation(vec![FieldError::new(
                    question.code.clone(),
                    REQUIRED_MESSAGE,
                )]));
            }

            service.patch_record(survey, record, &[AnswerItem::new(question.code.clone(), raw)])?;
            service.fill_defaults(survey, record);
            let accepted = record
                .answers
                .get(&question.code)
                .map_or(Value::Null, |answer| answer.value.clone());
            Ok((accepted, seek_active(survey, record)))
        })?;

        debug!(
            application_id = %id,
            question = question_code,
            finished = next.is_none(),
            "chat answer stored"
        );
        Ok(ChatReply {
            application_id: id.clone(),
            question_code: question_code.to_string(),
            accepted,
            next,
        })
    }
}

/// Walks from the current step until a pending question turns up. A step
/// counts as exhausted once every displayed question has an answer entry;
/// skipped optional questions are stored as `null`.
fn seek_active(survey: &Survey, record: &mut ApplicationRecord) -> Option<ChatPrompt> {
    let answers = record.answer_map();
    let mut step = current_step(survey, record);

    let mut visited = HashSet::new();
    while let Some(current) = step {
        if !visited.insert(current.code.as_str()) {
            break;
        }
        record.application.current_step = Some(current.code.clone());
        record.application.current_stage = current.order;

        let pending = visible_questions_for_display(current, &answers)
            .into_iter()
            .find(|question| match answers.get(&question.code) {
                None => true,
                Some(value) => question.required && is_missing(value),
            });
        if let Some(question) = pending {
            return Some(ChatPrompt {
                application_id: record.application.id.clone(),
                step_code: current.code.clone(),
                stage: current.order,
                question: QuestionView::from(question),
            });
        }
        step = next_step(survey, Some(current), &answers);
    }

    record.application.current_step = None;
    record.application.current_stage = 0;
    None
}

/// Map free text onto the JSON shape the validator expects for `question`.
pub fn interpret(question: &Question, text: &str) -> Result<Value, FieldError> {
    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();
    if !question.required && SKIP_WORDS.contains(&lowered.as_str()) {
        return Ok(Value::Null);
    }
    let reject = |message: &str| FieldError::new(question.code.clone(), message);

    match question.kind {
        QuestionType::Boolean | QuestionType::YesNo => parse_boolean(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| reject("answer yes or no")),
        QuestionType::SelectOne => match_option(question, trimmed)
            .map(Value::from)
            .ok_or_else(|| reject("choose one of the listed options")),
        QuestionType::SelectMany => {
            let mut selected: Vec<Value> = Vec::new();
            for part in trimmed.split(',').map(str::trim).filter(|part| !part.is_empty()) {
                let value = match_option(question, part)
                    .ok_or_else(|| reject("list options separated by commas"))?;
                let value = Value::from(value);
                if !selected.contains(&value) {
                    selected.push(value);
                }
            }
            if selected.is_empty() {
                return Err(reject("list options separated by commas"));
            }
            Ok(Value::Array(selected))
        }
        QuestionType::Date => CHAT_DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| reject("enter the date as YYYY-MM-DD or DD.MM.YYYY")),
        _ => Ok(Value::String(trimmed.to_string())),
    }
}

/// Option value whose value or label equals `token`, ignoring case.
fn match_option<'a>(question: &'a Question, token: &str) -> Option<&'a str> {
    let token = token.to_lowercase();
    question
        .options
        .iter()
        .find(|option| option.value.to_lowercase() == token || option.label.to_lowercase() == token)
        .map(|option| option.value.as_str())
}
