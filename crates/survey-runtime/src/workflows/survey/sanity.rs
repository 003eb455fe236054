//! Load-time graph checks for an imported survey.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::Value;

use super::domain::{AnswerMap, QuestionType, Survey};
use super::expression::Expression;
use super::fixture::SurveyConfigError;
use super::navigation::next_step;
use super::visibility::visible_questions;

/// Above this many answer combinations the reachability walk switches to
/// varying one answer at a time.
const MAX_SCENARIOS: usize = 512;

pub fn check_survey(survey: &Survey) -> Result<(), SurveyConfigError> {
    check_redirect_cycles(survey)?;
    check_required_reachability(survey)
}

/// Rejects surveys where some combination of redirects and linear fallbacks
/// can revisit a step.
pub fn check_redirect_cycles(survey: &Survey) -> Result<(), SurveyConfigError> {
    let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (position, step) in survey.steps.iter().enumerate() {
        let targets = edges.entry(step.code.as_str()).or_default();
        targets.extend(step.transitions.iter().map(|t| t.goto.as_str()));
        if let Some(following) = survey.steps.get(position + 1) {
            targets.push(following.code.as_str());
        }
    }

    let mut finished: HashSet<&str> = HashSet::new();
    for step in &survey.steps {
        let mut path = Vec::new();
        if let Some(cycle) = find_cycle(step.code.as_str(), &edges, &mut path, &mut finished) {
            return Err(SurveyConfigError::RedirectCycle {
                survey: survey.code.clone(),
                steps: cycle,
            });
        }
    }
    Ok(())
}

fn find_cycle<'a>(
    node: &'a str,
    edges: &BTreeMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    finished: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(start) = path.iter().position(|seen| *seen == node) {
        let mut cycle: Vec<String> = path[start..].iter().map(|code| code.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if finished.contains(node) {
        return None;
    }

    path.push(node);
    for target in edges.get(node).into_iter().flatten() {
        if let Some(cycle) = find_cycle(target, edges, path, finished) {
            return Some(cycle);
        }
    }
    path.pop();
    finished.insert(node);
    None
}

/// Walks the survey under every combination of answers that expressions
/// branch on and fails when a required question is never shown.
pub fn check_required_reachability(survey: &Survey) -> Result<(), SurveyConfigError> {
    let mut unseen: BTreeSet<&str> = survey
        .questions()
        .filter(|question| question.required)
        .map(|question| question.code.as_str())
        .collect();
    if unseen.is_empty() {
        return Ok(());
    }

    for answers in scenarios(survey) {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut step = next_step(survey, None, &answers);
        while let Some(current) = step {
            if !visited.insert(current.code.as_str()) {
                break;
            }
            for question in visible_questions(current, &answers) {
                unseen.remove(question.code.as_str());
            }
            step = next_step(survey, Some(current), &answers);
        }
        if unseen.is_empty() {
            return Ok(());
        }
    }

    Err(SurveyConfigError::UnreachableRequired {
        survey: survey.code.clone(),
        questions: unseen.into_iter().map(str::to_string).collect(),
    })
}

/// Answer maps covering every question referenced by a visibility rule or
/// step redirect. Each key ranges over its finite domain (options,
/// booleans), the constants it is compared against with their neighbours,
/// and absence.
fn scenarios(survey: &Survey) -> Vec<AnswerMap> {
    let mut referenced: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for step in &survey.steps {
        for transition in &step.transitions {
            collect_candidates(&transition.expression, &mut referenced);
        }
        for question in &step.questions {
            for expression in &question.visibility {
                collect_candidates(expression, &mut referenced);
            }
        }
    }

    let domains: Vec<(&str, Vec<Value>)> = referenced
        .into_iter()
        .filter_map(|(code, mut values)| {
            if let Some(question) = survey.question(code) {
                let finite: Vec<Value> = match question.kind {
                    QuestionType::Boolean | QuestionType::YesNo => {
                        vec![Value::Bool(true), Value::Bool(false)]
                    }
                    QuestionType::SelectOne => question
                        .option_values()
                        .map(|value| Value::String(value.to_string()))
                        .collect(),
                    QuestionType::SelectMany => question
                        .option_values()
                        .map(|value| Value::Array(vec![Value::String(value.to_string())]))
                        .collect(),
                    _ => Vec::new(),
                };
                for value in finite {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
            }
            if values.is_empty() {
                return None;
            }
            values.push(Value::Null);
            Some((code, values))
        })
        .collect();

    let combinations = domains
        .iter()
        .try_fold(1usize, |total, (_, values)| total.checked_mul(values.len()));

    match combinations {
        Some(total) if total <= MAX_SCENARIOS => {
            let mut scenarios = vec![AnswerMap::new()];
            for (code, values) in &domains {
                scenarios = scenarios
                    .into_iter()
                    .flat_map(|base| {
                        values.iter().map(move |value| {
                            let mut answers = base.clone();
                            answers.insert(code.to_string(), value.clone());
                            answers
                        })
                    })
                    .collect();
            }
            scenarios
        }
        _ => {
            let mut scenarios = vec![AnswerMap::new()];
            for (code, values) in &domains {
                for value in values {
                    let mut answers = AnswerMap::new();
                    answers.insert(code.to_string(), value.clone());
                    scenarios.push(answers);
                }
            }
            scenarios
        }
    }
}

fn collect_candidates<'a>(
    expression: &'a Expression,
    referenced: &mut BTreeMap<&'a str, Vec<Value>>,
) {
    for name in expression.variables() {
        referenced.entry(name).or_default();
    }
    for (name, literal) in expression.compared_literals() {
        let values = referenced.entry(name).or_default();
        for candidate in literal_candidates(literal) {
            if !values.contains(&candidate) {
                values.push(candidate);
            }
        }
    }
}

/// Values that land on each side of a compared constant.
fn literal_candidates(literal: &Value) -> Vec<Value> {
    match literal {
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(n), _) => [Some(n), n.checked_add(1), n.checked_sub(1)]
                .into_iter()
                .flatten()
                .map(Value::from)
                .collect(),
            (None, Some(x)) => [x, x + 1.0, x - 1.0].into_iter().map(Value::from).collect(),
            (None, None) => vec![literal.clone()],
        },
        Value::String(_) => vec![literal.clone(), Value::Array(vec![literal.clone()])],
        Value::Bool(flag) => vec![Value::Bool(*flag), Value::Bool(!flag)],
        Value::Null => Vec::new(),
        Value::Array(_) | Value::Object(_) => vec![literal.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::survey::fixture::load_str;
    use serde_json::json;

    fn fixture(extra: Vec<Value>) -> String {
        let mut records = vec![
            json!({ "model": "applications.survey", "pk": 1, "fields": { "code": "loop" } }),
            json!({ "model": "applications.step", "pk": 1, "fields": { "survey": 1, "code": "a", "order": 1 } }),
            json!({ "model": "applications.step", "pk": 2, "fields": { "survey": 1, "code": "b", "order": 2 } }),
            json!({ "model": "applications.step", "pk": 3, "fields": { "survey": 1, "code": "c", "order": 3 } }),
            json!({ "model": "applications.question", "pk": 1, "fields": {
                "step": 1, "code": "q_agree", "type": "yes_no", "required": true
            } }),
            json!({ "model": "applications.question", "pk": 2, "fields": {
                "step": 3, "code": "q_story", "type": "text", "required": true
            } }),
        ];
        records.extend(extra);
        Value::Array(records).to_string()
    }

    #[test]
    fn backward_redirect_is_a_cycle() {
        let raw = fixture(vec![json!({ "model": "applications.condition", "pk": 1, "fields": {
            "survey": 1, "scope": "step", "from_step": 3, "goto_step": 1,
            "expression": { "var": "q_agree" }
        } })]);
        match load_str(&raw) {
            Err(SurveyConfigError::RedirectCycle { survey, steps }) => {
                assert_eq!(survey, "loop");
                assert_eq!(steps, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected redirect cycle, got {other:?}"),
        }
    }

    #[test]
    fn forward_redirects_are_accepted() {
        let raw = fixture(vec![json!({ "model": "applications.condition", "pk": 1, "fields": {
            "survey": 1, "scope": "step", "from_step": 1, "goto_step": 3,
            "expression": { "var": "q_agree" }
        } })]);
        let surveys = load_str(&raw).expect("fixture loads");
        assert_eq!(surveys[0].steps.len(), 3);
    }

    #[test]
    fn required_question_behind_impossible_condition_is_unreachable() {
        let raw = fixture(vec![json!({ "model": "applications.condition", "pk": 1, "fields": {
            "survey": 1, "scope": "question", "question": 2,
            "expression": { "all": [{ "var": "q_agree" }, { "not": { "var": "q_agree" } }] }
        } })]);
        match load_str(&raw) {
            Err(SurveyConfigError::UnreachableRequired { questions, .. }) => {
                assert_eq!(questions, vec!["q_story"]);
            }
            other => panic!("expected unreachable question, got {other:?}"),
        }
    }

    #[test]
    fn required_question_reachable_in_some_scenario_passes() {
        let raw = fixture(vec![json!({ "model": "applications.condition", "pk": 1, "fields": {
            "survey": 1, "scope": "question", "question": 2,
            "expression": { "==": [{ "var": "q_agree" }, false] }
        } })]);
        assert!(load_str(&raw).is_ok());
    }

    #[test]
    fn gates_on_free_form_answers_use_compared_constants() {
        let raw = fixture(vec![
            json!({ "model": "applications.question", "pk": 3, "fields": {
                "step": 2, "code": "q_household", "type": "number"
            } }),
            json!({ "model": "applications.question", "pk": 4, "fields": {
                "step": 2, "code": "q_household_members", "type": "text", "required": true
            } }),
            json!({ "model": "applications.question", "pk": 5, "fields": {
                "step": 2, "code": "q_city", "type": "text"
            } }),
            json!({ "model": "applications.question", "pk": 6, "fields": {
                "step": 2, "code": "q_district", "type": "text", "required": true
            } }),
            json!({ "model": "applications.condition", "pk": 1, "fields": {
                "survey": 1, "scope": "question", "question": 4,
                "expression": { ">": [{ "var": "q_household" }, 1] }
            } }),
            json!({ "model": "applications.condition", "pk": 2, "fields": {
                "survey": 1, "scope": "question", "question": 6,
                "expression": { "==": [{ "var": "q_city" }, "Kazan"] }
            } }),
        ]);
        let surveys = load_str(&raw).expect("fixture loads");
        assert_eq!(surveys[0].steps[1].questions.len(), 4);
    }

    #[test]
    fn literal_candidates_straddle_the_constant() {
        assert_eq!(literal_candidates(&json!(1)), vec![json!(1), json!(2), json!(0)]);
        assert_eq!(
            literal_candidates(&json!(2.5)),
            vec![json!(2.5), json!(3.5), json!(1.5)]
        );
        assert_eq!(literal_candidates(&json!("a")), vec![json!("a"), json!(["a"])]);
        assert!(literal_candidates(&Value::Null).is_empty());
    }
}
