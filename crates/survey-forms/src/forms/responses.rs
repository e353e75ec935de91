use std::sync::Arc;

use chrono::Utc;

use super::domain::{Answer, FormId, FormResponse, ResponseId, Step};
use super::error::FormError;
use super::repository::{FormRepository, ResponseRepository};

/// Merges paginated answer batches into the per-respondent record.
#[derive(Clone)]
pub struct ResponseAggregator {
    forms: Arc<dyn FormRepository>,
    responses: Arc<dyn ResponseRepository>,
}

impl ResponseAggregator {
    pub fn new(forms: Arc<dyn FormRepository>, responses: Arc<dyn ResponseRepository>) -> Self {
        Self { forms, responses }
    }

    /// Upserts the (email, form) record with `answers` for `step_number`.
    ///
    /// Completion is a step threshold: reaching the highest step order marks the
    /// response complete. Required answers on earlier steps are not checked.
    /// Once complete, a response stays complete and keeps its first
    /// `completed_at`.
    pub fn save_response(
        &self,
        email: &str,
        form_id: &FormId,
        step_number: u32,
        answers: Vec<Answer>,
    ) -> Result<FormResponse, FormError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(FormError::validation("email is required"));
        }
        if step_number < 1 {
            return Err(FormError::validation("stepNumber must be at least 1"));
        }

        self.forms
            .fetch_form(form_id)?
            .ok_or(FormError::FormNotFound)?;
        let steps = self.forms.steps_for_form(form_id)?;
        let reached_end = reaches_last_step(&steps, step_number);

        let now = Utc::now();
        let mut response = match self.responses.fetch_response(email, form_id)? {
            Some(existing) => existing,
            None => FormResponse {
                id: ResponseId::generate(),
                email: email.to_string(),
                form_id: form_id.clone(),
                responses: Vec::new(),
                current_step: 0,
                is_completed: false,
                completed_at: None,
                created_at: now,
                updated_at: now,
            },
        };

        merge_answers(&mut response.responses, answers);
        response.current_step = response.current_step.max(step_number);
        if reached_end && !response.is_completed {
            response.is_completed = true;
            response.completed_at = Some(now);
            tracing::info!(form_id = %form_id, email, "survey completed");
        }
        response.updated_at = now;

        Ok(self.responses.upsert_response(response)?)
    }

    /// Partial response for `email`; completed or missing records are not resumable.
    pub fn resume(&self, email: &str, form_id: &FormId) -> Result<FormResponse, FormError> {
        match self.responses.fetch_response(email.trim(), form_id)? {
            Some(response) if !response.is_completed => Ok(response),
            _ => Err(FormError::ResponseNotFound),
        }
    }
}

/// Last-write-wins per question; new questions keep arrival order.
pub fn merge_answers(stored: &mut Vec<Answer>, incoming: Vec<Answer>) {
    for answer in incoming {
        match stored
            .iter_mut()
            .find(|existing| existing.question_id == answer.question_id)
        {
            Some(existing) => existing.value = answer.value,
            None => stored.push(answer),
        }
    }
}

/// Whether `step_number` reaches the highest step order. Forms without steps
/// never complete.
pub fn reaches_last_step(steps: &[Step], step_number: u32) -> bool {
    steps
        .iter()
        .map(|step| step.order)
        .max()
        .is_some_and(|last| step_number >= last)
}
