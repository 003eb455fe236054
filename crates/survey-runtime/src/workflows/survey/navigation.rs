use super::domain::{AnswerMap, Step, Survey};

/// Step that follows `current`.
///
/// With no current step this is the first step. Otherwise the first
/// transition of `current` whose expression holds wins, falling back to the
/// next step in survey order. `None` means the survey is finished.
pub fn next_step<'a>(
    survey: &'a Survey,
    current: Option<&Step>,
    answers: &AnswerMap,
) -> Option<&'a Step> {
    let Some(current) = current else {
        return survey.first_step();
    };

    if let Some(transition) = current
        .transitions
        .iter()
        .find(|transition| transition.expression.evaluate(answers))
    {
        if let Some(target) = survey.step(&transition.goto) {
            return Some(target);
        }
    }

    let position = survey.position_of(&current.code)?;
    survey.steps.get(position + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::survey::domain::StepTransition;
    use crate::workflows::survey::expression::Expression;
    use serde_json::json;

    fn step(code: &str, order: u32) -> Step {
        Step {
            code: code.to_string(),
            title: code.to_string(),
            order,
            questions: Vec::new(),
            transitions: Vec::new(),
        }
    }

    fn survey() -> Survey {
        let mut intro = step("intro", 1);
        intro.transitions = vec![
            StepTransition {
                condition_id: 7,
                goto: "child".to_string(),
                expression: Expression::parse(&json!({ "in": ["$who", ["parent", "guardian"]] }))
                    .expect("valid"),
            },
            StepTransition {
                condition_id: 9,
                goto: "adult".to_string(),
                expression: Expression::parse(&json!({ "var": "who" })).expect("valid"),
            },
        ];
        Survey {
            code: "default".to_string(),
            title: "Default".to_string(),
            version: 1,
            is_active: true,
            steps: vec![intro, step("adult", 2), step("child", 3), step("final", 4)],
            document_requirements: Vec::new(),
        }
    }

    fn answers(who: &str) -> AnswerMap {
        let mut answers = AnswerMap::new();
        answers.insert("who".to_string(), json!(who));
        answers
    }

    #[test]
    fn starts_at_first_step() {
        let survey = survey();
        let first = next_step(&survey, None, &AnswerMap::new()).expect("first step");
        assert_eq!(first.code, "intro");

        let empty = Survey {
            steps: Vec::new(),
            ..survey.clone()
        };
        assert!(next_step(&empty, None, &AnswerMap::new()).is_none());
    }

    #[test]
    fn first_matching_transition_wins() {
        let survey = survey();
        let intro = survey.step("intro").expect("intro");
        let target = next_step(&survey, Some(intro), &answers("guardian")).expect("redirect");
        assert_eq!(target.code, "child");

        let target = next_step(&survey, Some(intro), &answers("self")).expect("redirect");
        assert_eq!(target.code, "adult");
    }

    #[test]
    fn falls_back_to_following_step_and_ends_after_last() {
        let survey = survey();
        let intro = survey.step("intro").expect("intro");
        let target = next_step(&survey, Some(intro), &AnswerMap::new()).expect("linear");
        assert_eq!(target.code, "adult");

        let last = survey.step("final").expect("final");
        assert!(next_step(&survey, Some(last), &answers("self")).is_none());
    }
}
