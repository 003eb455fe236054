pub mod applications;

pub mod catalog;
pub mod domain;
pub mod expression;
pub mod fixture;
pub mod navigation;
mod sanity;
pub mod visibility;

pub use catalog::{OptionLabelCache, SurveyCatalog, DEFAULT_SURVEY_FIXTURE};
pub use domain::{AnswerMap, DocumentRequirement, Question, QuestionType, Step, Survey};
pub use expression::{Expression, ExpressionError};
pub use fixture::SurveyConfigError;
pub use navigation::next_step;
pub use visibility::{visible_questions, visible_questions_for_display};
