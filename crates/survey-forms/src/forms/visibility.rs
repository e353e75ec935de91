//! Conditional display rules for nested questions.
//!
//! A top-level question is always shown. A sub-question is shown only when its
//! immediate parent is itself shown and the parent's stored answer satisfies the
//! sub-question's `condition_value`. The server applies these rules for admin
//! previews; public renderers apply them client-side and the submission path does
//! not re-check them.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::Serialize;

use super::domain::{
    Answer, AnswerValue, FormTree, Question, QuestionId, StepId, MAX_NESTING_LEVEL,
};
use super::error::FormError;

/// Nesting level for a question placed under `parent` (or at top level).
pub fn nesting_level_under(parent: Option<&Question>) -> Result<u8, FormError> {
    let Some(parent) = parent else {
        return Ok(0);
    };

    let level = parent.nesting_level.saturating_add(1);
    if level > MAX_NESTING_LEVEL {
        return Err(FormError::MaxNestingExceeded);
    }
    Ok(level)
}

/// Evaluates visibility against a fixed answer set. Parents that are not part
/// of the indexed questions are treated as shown, so only their stored answer
/// is consulted.
pub struct VisibilityEvaluator<'a> {
    questions: HashMap<&'a QuestionId, &'a Question>,
    answers: HashMap<&'a QuestionId, &'a AnswerValue>,
    memo: RefCell<HashMap<&'a QuestionId, bool>>,
}

impl<'a> VisibilityEvaluator<'a> {
    pub fn new<I>(questions: I, answers: &'a [Answer]) -> Self
    where
        I: IntoIterator<Item = &'a Question>,
    {
        Self {
            questions: questions
                .into_iter()
                .map(|question| (&question.id, question))
                .collect(),
            answers: answers
                .iter()
                .map(|answer| (&answer.question_id, &answer.value))
                .collect(),
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn is_visible(&self, question: &'a Question) -> bool {
        self.resolve(question, 0)
    }

    /// Subset of `questions` that should be presented, in input order.
    pub fn visible(&self, questions: &'a [Question]) -> Vec<&'a Question> {
        questions
            .iter()
            .filter(|question| self.is_visible(*question))
            .collect()
    }

    fn resolve(&self, question: &'a Question, depth: u8) -> bool {
        if let Some(known) = self.memo.borrow().get(&question.id) {
            return *known;
        }

        let visible = match &question.parent_question_id {
            None => true,
            // A chain deeper than the nesting ceiling can only be a cycle.
            Some(_) if depth > MAX_NESTING_LEVEL => false,
            Some(parent_id) => {
                let parent_visible = match self.questions.get(parent_id) {
                    Some(parent) => self.resolve(*parent, depth + 1),
                    None => true,
                };
                parent_visible && self.condition_met(parent_id, question.condition_value.as_ref())
            }
        };

        self.memo.borrow_mut().insert(&question.id, visible);
        visible
    }

    fn condition_met(&self, parent_id: &QuestionId, condition: Option<&AnswerValue>) -> bool {
        match (self.answers.get(parent_id), condition) {
            (Some(answer), Some(condition)) => answer.satisfies(condition),
            (Some(answer), None) => !answer.is_empty(),
            (None, _) => false,
        }
    }
}

/// Questions of one step that apply given the answers collected so far.
pub fn visible_questions<'a>(questions: &'a [Question], answers: &'a [Answer]) -> Vec<&'a Question> {
    VisibilityEvaluator::new(questions, answers).visible(questions)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepVisibility {
    pub step_id: StepId,
    pub order: u32,
    pub visible_question_ids: Vec<QuestionId>,
}

/// Visibility across every step of a form; parents may live on earlier steps.
pub fn preview_form(tree: &FormTree, answers: &[Answer]) -> Vec<StepVisibility> {
    let evaluator = VisibilityEvaluator::new(tree.questions(), answers);
    tree.steps
        .iter()
        .map(|entry| StepVisibility {
            step_id: entry.step.id.clone(),
            order: entry.step.order,
            visible_question_ids: entry
                .questions
                .iter()
                .filter(|question| evaluator.is_visible(*question))
                .map(|question| question.id.clone())
                .collect(),
        })
        .collect()
}
