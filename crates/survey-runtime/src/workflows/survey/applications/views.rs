use serde::Serialize;

use super::domain::{ApplicationId, ApplicationRecord};
use crate::workflows::survey::domain::{AnswerMap, Question, QuestionOption, QuestionType, Step};
use crate::workflows::survey::visibility::visible_questions_for_display;

/// Draft snapshot returned by the page-oriented operations.
#[derive(Debug, Clone, Serialize)]
pub struct DraftView {
    pub application_id: ApplicationId,
    pub survey_code: String,
    pub status: &'static str,
    pub current_stage: u32,
    pub current_step: Option<StepView>,
    pub answers: AnswerMap,
    /// True once there is no step left to show.
    pub restart_available: bool,
}

impl DraftView {
    pub fn render(record: &ApplicationRecord, step: Option<&Step>) -> Self {
        let answers = record.answer_map();
        let current_step = step.map(|step| StepView::render(step, &answers));
        Self {
            application_id: record.application.id.clone(),
            survey_code: record.application.survey_code.clone(),
            status: record.application.status.label(),
            current_stage: record.application.current_stage,
            restart_available: current_step.is_none(),
            current_step,
            answers,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub code: String,
    pub title: String,
    pub order: u32,
    pub questions: Vec<QuestionView>,
}

impl StepView {
    pub fn render(step: &Step, answers: &AnswerMap) -> Self {
        Self {
            code: step.code.clone(),
            title: step.title.clone(),
            order: step.order,
            questions: visible_questions_for_display(step, answers)
                .into_iter()
                .map(QuestionView::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub label: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            code: question.code.clone(),
            kind: question.kind,
            label: question.label.clone(),
            required: question.required,
            help_text: question.config.help_text.clone(),
            options: question.options.clone(),
        }
    }
}
