use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::expression::Expression;

/// Answers keyed by question code, as seen by expressions and validators.
pub type AnswerMap = BTreeMap<String, Value>;

/// Versioned definition of an entire questionnaire.
#[derive(Debug, Clone, PartialEq)]
pub struct Survey {
    pub code: String,
    pub title: String,
    pub version: u32,
    pub is_active: bool,
    /// Steps sorted by `(order, fixture id)`.
    pub steps: Vec<Step>,
    pub document_requirements: Vec<DocumentRequirement>,
}

impl Survey {
    pub fn first_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn step(&self, code: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.code == code)
    }

    pub fn position_of(&self, code: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.code == code)
    }

    /// Locate a question anywhere in the survey.
    pub fn question(&self, code: &str) -> Option<&Question> {
        self.steps
            .iter()
            .flat_map(|step| step.questions.iter())
            .find(|question| question.code == code)
    }

    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.steps.iter().flat_map(|step| step.questions.iter())
    }
}

/// Ordered group of questions shown together.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub code: String,
    pub title: String,
    pub order: u32,
    pub questions: Vec<Question>,
    /// Step-scoped conditions leaving this step, in evaluation order.
    pub transitions: Vec<StepTransition>,
}

/// Redirect evaluated when leaving a step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTransition {
    pub condition_id: u64,
    pub goto: String,
    pub expression: Expression,
}

/// Single typed prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    /// Fixture primary key; ranks the question when no `order` hint is set.
    pub id: u64,
    pub code: String,
    pub kind: QuestionType,
    pub label: String,
    pub required: bool,
    pub config: QuestionConfig,
    pub options: Vec<QuestionOption>,
    /// Question-scoped conditions; all must hold for the question to show.
    pub visibility: Vec<Expression>,
}

impl Question {
    pub fn option_values(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|option| option.value.as_str())
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Textarea,
    Email,
    Phone,
    Date,
    Boolean,
    YesNo,
    #[serde(alias = "select")]
    SelectOne,
    #[serde(alias = "multiselect")]
    SelectMany,
    Number,
    File,
    FileMulti,
}

impl QuestionType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::YesNo => "yes_no",
            Self::SelectOne => "select_one",
            Self::SelectMany => "select_many",
            Self::Number => "number",
            Self::File => "file",
            Self::FileMulti => "file_multi",
        }
    }

    pub const fn is_choice(self) -> bool {
        matches!(self, Self::SelectOne | Self::SelectMany)
    }

    pub const fn is_file(self) -> bool {
        matches!(self, Self::File | Self::FileMulti)
    }
}

/// Free-form payload attached to a question in the fixture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionConfig {
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub help_text: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub not_in_future: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One selectable choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub order: u32,
}

/// Rule stating a named supporting file is mandatory under some condition.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRequirement {
    pub code: String,
    pub label: String,
    /// `None` means unconditionally mandatory.
    pub expression: Option<Expression>,
}
