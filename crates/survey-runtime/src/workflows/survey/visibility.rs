use super::domain::{AnswerMap, Question, Step};

/// Questions of `step` whose visibility conditions all hold, ordered by the
/// `order` hint. Unhinted questions rank by their fixture id; the
/// declaration position breaks ties.
pub fn visible_questions<'a>(step: &'a Step, answers: &AnswerMap) -> Vec<&'a Question> {
    let mut visible: Vec<(i64, usize, &Question)> = step
        .questions
        .iter()
        .enumerate()
        .filter(|(_, question)| is_visible(question, answers))
        .map(|(position, question)| {
            let rank = question
                .config
                .order
                .unwrap_or_else(|| i64::try_from(question.id).unwrap_or(i64::MAX));
            (rank, position, question)
        })
        .collect();
    visible.sort_by_key(|(rank, position, _)| (*rank, *position));
    visible.into_iter().map(|(_, _, question)| question).collect()
}

/// Visible questions minus those flagged `hidden` in their config.
pub fn visible_questions_for_display<'a>(
    step: &'a Step,
    answers: &AnswerMap,
) -> Vec<&'a Question> {
    visible_questions(step, answers)
        .into_iter()
        .filter(|question| !question.config.hidden)
        .collect()
}

pub fn is_visible(question: &Question, answers: &AnswerMap) -> bool {
    question
        .visibility
        .iter()
        .all(|expression| expression.evaluate(answers))
}
