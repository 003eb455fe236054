//! Survey fixture import.
//!
//! The fixture is a flat list of `{model, pk, fields}` records. Records are
//! grouped by model, cross-references are resolved by primary key, and
//! condition rows are attached to the question (visibility) or the source
//! step (redirect) they gate. Every survey produced here has already passed
//! the graph checks in [`super::sanity`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::domain::{
    DocumentRequirement, Question, QuestionConfig, QuestionOption, QuestionType, Step,
    StepTransition, Survey,
};
use super::expression::{Expression, ExpressionError};
use super::sanity;

/// Fatal problems found while importing survey configuration.
#[derive(Debug, thiserror::Error)]
pub enum SurveyConfigError {
    #[error("failed to read survey fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("survey fixture is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("fixture contains no surveys")]
    NoSurveys,
    #[error("unknown fixture model '{model}' (pk {pk})")]
    UnknownModel { model: String, pk: u64 },
    #[error("invalid {model} record {pk}: {message}")]
    InvalidRecord {
        model: &'static str,
        pk: u64,
        message: String,
    },
    #[error("{model} record {pk} references missing {field} {target}")]
    DanglingReference {
        model: &'static str,
        pk: u64,
        field: &'static str,
        target: u64,
    },
    #[error("duplicate {kind} '{code}' in {scope}")]
    Duplicate {
        kind: &'static str,
        code: String,
        scope: String,
    },
    #[error("{model} record {pk} has an invalid expression: {source}")]
    Expression {
        model: &'static str,
        pk: u64,
        #[source]
        source: ExpressionError,
    },
    #[error("step redirects in survey '{survey}' form a cycle through [{}]", .steps.join(" -> "))]
    RedirectCycle { survey: String, steps: Vec<String> },
    #[error(
        "required questions in survey '{survey}' are unreachable: {}",
        .questions.join(", ")
    )]
    UnreachableRequired {
        survey: String,
        questions: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct FixtureRecord {
    model: String,
    pk: u64,
    #[serde(default)]
    fields: Value,
}

#[derive(Debug, Deserialize)]
struct SurveyFields {
    code: String,
    #[serde(default)]
    title: String,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "default_active")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct StepFields {
    survey: u64,
    code: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    order: u32,
}

#[derive(Debug, Deserialize)]
struct QuestionFields {
    step: u64,
    code: String,
    #[serde(rename = "type", default = "default_question_type")]
    kind: QuestionType,
    #[serde(default)]
    label: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    payload: QuestionConfig,
}

#[derive(Debug, Deserialize)]
struct OptionFields {
    question: u64,
    value: Value,
    #[serde(default)]
    label: String,
    #[serde(default)]
    order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ConditionScope {
    Question,
    Step,
}

#[derive(Debug, Deserialize)]
struct ConditionFields {
    survey: u64,
    scope: ConditionScope,
    #[serde(default)]
    expression: Value,
    #[serde(default)]
    question: Option<u64>,
    #[serde(default)]
    from_step: Option<u64>,
    #[serde(default)]
    goto_step: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DocumentFields {
    survey: u64,
    code: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    expression: Option<Value>,
}

fn default_version() -> u32 {
    1
}

fn default_active() -> bool {
    true
}

fn default_question_type() -> QuestionType {
    QuestionType::Text
}

const SURVEY: &str = "applications.survey";
const STEP: &str = "applications.step";
const QUESTION: &str = "applications.question";
const OPTION: &str = "applications.option";
const CONDITION: &str = "applications.condition";
const DOCUMENT: &str = "applications.documentrequirement";

/// Read and import a fixture file.
pub fn load_path(path: &Path) -> Result<Vec<Survey>, SurveyConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| SurveyConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&raw)
}

/// Import every survey in a fixture document and run the sanity checks.
pub fn load_str(raw: &str) -> Result<Vec<Survey>, SurveyConfigError> {
    let records: Vec<FixtureRecord> = serde_json::from_str(raw)?;
    let surveys = FixtureImport::from_records(records)?.build()?;
    for survey in &surveys {
        sanity::check_survey(survey)?;
    }
    Ok(surveys)
}

#[derive(Default)]
struct FixtureImport {
    surveys: BTreeMap<u64, SurveyFields>,
    steps: BTreeMap<u64, StepFields>,
    questions: BTreeMap<u64, QuestionFields>,
    options: BTreeMap<u64, OptionFields>,
    conditions: BTreeMap<u64, ConditionFields>,
    documents: BTreeMap<u64, DocumentFields>,
}

impl FixtureImport {
    fn from_records(records: Vec<FixtureRecord>) -> Result<Self, SurveyConfigError> {
        let mut import = Self::default();
        for record in records {
            let FixtureRecord { model, pk, fields } = record;
            match model.as_str() {
                SURVEY => {
                    import.surveys.insert(pk, decode(SURVEY, pk, fields)?);
                }
                STEP => {
                    import.steps.insert(pk, decode(STEP, pk, fields)?);
                }
                QUESTION => {
                    import.questions.insert(pk, decode(QUESTION, pk, fields)?);
                }
                OPTION => {
                    import.options.insert(pk, decode(OPTION, pk, fields)?);
                }
                CONDITION => {
                    import.conditions.insert(pk, decode(CONDITION, pk, fields)?);
                }
                DOCUMENT => {
                    import.documents.insert(pk, decode(DOCUMENT, pk, fields)?);
                }
                _ => return Err(SurveyConfigError::UnknownModel { model, pk }),
            }
        }
        if import.surveys.is_empty() {
            return Err(SurveyConfigError::NoSurveys);
        }
        Ok(import)
    }

    fn build(self) -> Result<Vec<Survey>, SurveyConfigError> {
        let mut surveys: BTreeMap<u64, Survey> = BTreeMap::new();
        let mut survey_codes = BTreeSet::new();
        for (pk, fields) in self.surveys {
            if !survey_codes.insert(fields.code.clone()) {
                return Err(duplicate("survey", &fields.code, "fixture"));
            }
            surveys.insert(
                pk,
                Survey {
                    code: fields.code,
                    title: fields.title,
                    version: fields.version,
                    is_active: fields.is_active,
                    steps: Vec::new(),
                    document_requirements: Vec::new(),
                },
            );
        }

        // Steps keyed by pk, remembering their survey pk until they are moved in.
        let mut steps: BTreeMap<u64, (u64, Step)> = BTreeMap::new();
        for (pk, fields) in self.steps {
            let survey = surveys
                .get(&fields.survey)
                .ok_or_else(|| dangling(STEP, pk, "survey", fields.survey))?;
            let clash = steps.values().find(|(survey_pk, step)| {
                *survey_pk == fields.survey
                    && (step.code == fields.code || step.order == fields.order)
            });
            if let Some((_, existing)) = clash {
                let (kind, code) = if existing.code == fields.code {
                    ("step", fields.code.clone())
                } else {
                    ("step order", fields.order.to_string())
                };
                return Err(duplicate(kind, &code, &format!("survey '{}'", survey.code)));
            }
            steps.insert(
                pk,
                (
                    fields.survey,
                    Step {
                        code: fields.code,
                        title: fields.title,
                        order: fields.order,
                        questions: Vec::new(),
                        transitions: Vec::new(),
                    },
                ),
            );
        }

        // Question pk -> (step pk, position within the step).
        let mut question_slots: BTreeMap<u64, (u64, usize)> = BTreeMap::new();
        let mut question_codes: BTreeMap<u64, BTreeSet<String>> = BTreeMap::new();
        for (pk, fields) in self.questions {
            let (survey_pk, step) = steps
                .get_mut(&fields.step)
                .ok_or_else(|| dangling(QUESTION, pk, "step", fields.step))?;
            let survey_pk = *survey_pk;
            let codes = question_codes.entry(survey_pk).or_default();
            if !codes.insert(fields.code.clone()) {
                let scope = surveys
                    .get(&survey_pk)
                    .map(|survey| format!("survey '{}'", survey.code))
                    .unwrap_or_default();
                return Err(duplicate("question", &fields.code, &scope));
            }
            question_slots.insert(pk, (fields.step, step.questions.len()));
            step.questions.push(Question {
                id: pk,
                code: fields.code,
                kind: fields.kind,
                label: fields.label,
                required: fields.required,
                config: fields.payload,
                options: Vec::new(),
                visibility: Vec::new(),
            });
        }

        let mut options: Vec<(u64, u64, QuestionOption)> = Vec::new();
        for (pk, fields) in self.options {
            if !question_slots.contains_key(&fields.question) {
                return Err(dangling(OPTION, pk, "question", fields.question));
            }
            let value = match fields.value {
                Value::String(value) => value,
                Value::Null => {
                    return Err(SurveyConfigError::InvalidRecord {
                        model: OPTION,
                        pk,
                        message: "option value is required".to_string(),
                    })
                }
                other => other.to_string(),
            };
            options.push((
                fields.question,
                pk,
                QuestionOption {
                    value,
                    label: fields.label,
                    order: fields.order,
                },
            ));
        }
        options.sort_by_key(|(_, pk, option)| (option.order, *pk));
        for (question_pk, _, option) in options {
            let question = question_at(&mut steps, &question_slots, question_pk);
            if let Some(question) = question {
                if question.has_option(&option.value) {
                    let scope = format!("question '{}'", question.code);
                    return Err(duplicate("option", &option.value, &scope));
                }
                question.options.push(option);
            }
        }

        let step_codes: BTreeMap<u64, (u64, String)> = steps
            .iter()
            .map(|(pk, (survey_pk, step))| (*pk, (*survey_pk, step.code.clone())))
            .collect();
        for (pk, fields) in self.conditions {
            if !surveys.contains_key(&fields.survey) {
                return Err(dangling(CONDITION, pk, "survey", fields.survey));
            }
            let expression =
                Expression::parse(&fields.expression).map_err(|source| {
                    SurveyConfigError::Expression {
                        model: CONDITION,
                        pk,
                        source,
                    }
                })?;
            match fields.scope {
                ConditionScope::Question => {
                    let question_pk = fields.question.ok_or_else(|| incomplete(pk, "question"))?;
                    let owner = question_slots
                        .get(&question_pk)
                        .and_then(|(step_pk, _)| step_codes.get(step_pk))
                        .map(|(survey_pk, _)| *survey_pk);
                    if owner != Some(fields.survey) {
                        return Err(dangling(CONDITION, pk, "question", question_pk));
                    }
                    if let Some(question) = question_at(&mut steps, &question_slots, question_pk) {
                        question.visibility.push(expression);
                    }
                }
                ConditionScope::Step => {
                    let from = fields.from_step.ok_or_else(|| incomplete(pk, "from_step"))?;
                    let goto = fields.goto_step.ok_or_else(|| incomplete(pk, "goto_step"))?;
                    let goto_code = match step_codes.get(&goto) {
                        Some((survey_pk, code)) if *survey_pk == fields.survey => code.clone(),
                        _ => return Err(dangling(CONDITION, pk, "goto_step", goto)),
                    };
                    match steps.get_mut(&from) {
                        Some((survey_pk, step)) if *survey_pk == fields.survey => {
                            step.transitions.push(StepTransition {
                                condition_id: pk,
                                goto: goto_code,
                                expression,
                            });
                        }
                        _ => return Err(dangling(CONDITION, pk, "from_step", from)),
                    }
                }
            }
        }

        for (pk, fields) in self.documents {
            let survey = surveys
                .get_mut(&fields.survey)
                .ok_or_else(|| dangling(DOCUMENT, pk, "survey", fields.survey))?;
            let expression = Expression::parse_optional(fields.expression.as_ref()).map_err(
                |source| SurveyConfigError::Expression {
                    model: DOCUMENT,
                    pk,
                    source,
                },
            )?;
            survey.document_requirements.push(DocumentRequirement {
                code: fields.code,
                label: fields.label,
                expression,
            });
        }

        for (_, (survey_pk, step)) in steps {
            if let Some(survey) = surveys.get_mut(&survey_pk) {
                survey.steps.push(step);
            }
        }
        // BTreeMap iteration already yields steps in pk order, so a stable
        // sort on `order` gives the `(order, pk)` ordering.
        let mut surveys: Vec<Survey> = surveys.into_values().collect();
        for survey in &mut surveys {
            survey.steps.sort_by_key(|step| step.order);
        }
        Ok(surveys)
    }
}

fn decode<T: DeserializeOwned>(
    model: &'static str,
    pk: u64,
    fields: Value,
) -> Result<T, SurveyConfigError> {
    serde_json::from_value(fields).map_err(|error| SurveyConfigError::InvalidRecord {
        model,
        pk,
        message: error.to_string(),
    })
}

fn question_at<'a>(
    steps: &'a mut BTreeMap<u64, (u64, Step)>,
    slots: &BTreeMap<u64, (u64, usize)>,
    question_pk: u64,
) -> Option<&'a mut Question> {
    let (step_pk, position) = slots.get(&question_pk)?;
    steps
        .get_mut(step_pk)
        .and_then(|(_, step)| step.questions.get_mut(*position))
}

fn dangling(model: &'static str, pk: u64, field: &'static str, target: u64) -> SurveyConfigError {
    SurveyConfigError::DanglingReference {
        model,
        pk,
        field,
        target,
    }
}

fn duplicate(kind: &'static str, code: &str, scope: &str) -> SurveyConfigError {
    SurveyConfigError::Duplicate {
        kind,
        code: code.to_string(),
        scope: scope.to_string(),
    }
}

fn incomplete(pk: u64, field: &str) -> SurveyConfigError {
    SurveyConfigError::InvalidRecord {
        model: CONDITION,
        pk,
        message: format!("missing {field}"),
    }
}
