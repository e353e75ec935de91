use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::auth::{AdminRepository, AdminUser};
use crate::forms::domain::{Form, FormId, FormResponse, Question, QuestionId, Step, StepId};
use crate::forms::repository::{FormRepository, RepositoryError, ResponseRepository};

#[derive(Default)]
struct Tables {
    forms: HashMap<FormId, Form>,
    steps: HashMap<StepId, Step>,
    questions: HashMap<QuestionId, Question>,
    responses: HashMap<(String, FormId), FormResponse>,
    admins: HashMap<String, AdminUser>,
}

/// Process-local store backing every repository trait. Cloning shares the
/// same tables.
#[derive(Default, Clone)]
pub struct InMemorySurveyStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemorySurveyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

fn sorted_by_order<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> u32,
{
    items.sort_by_key(|item| key(item));
    items
}

impl FormRepository for InMemorySurveyStore {
    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.forms.contains_key(&form.id)
            || tables.forms.values().any(|existing| existing.slug == form.slug)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.forms.insert(form.id.clone(), form.clone());
        Ok(form)
    }

    fn update_form(&self, form: Form) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        if !tables.forms.contains_key(&form.id) {
            return Err(RepositoryError::NotFound);
        }
        if tables
            .forms
            .values()
            .any(|existing| existing.id != form.id && existing.slug == form.slug)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.forms.insert(form.id.clone(), form);
        Ok(())
    }

    fn fetch_form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        Ok(self.lock()?.forms.get(id).cloned())
    }

    fn fetch_form_by_slug(&self, slug: &str) -> Result<Option<Form>, RepositoryError> {
        Ok(self
            .lock()?
            .forms
            .values()
            .find(|form| form.slug == slug)
            .cloned())
    }

    fn list_forms(&self) -> Result<Vec<Form>, RepositoryError> {
        let mut forms: Vec<Form> = self.lock()?.forms.values().cloned().collect();
        forms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(forms)
    }

    fn insert_step(&self, step: Step) -> Result<Step, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.steps.contains_key(&step.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.steps.insert(step.id.clone(), step.clone());
        Ok(step)
    }

    fn update_step(&self, step: Step) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        match tables.steps.get_mut(&step.id) {
            Some(slot) => {
                *slot = step;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_step(&self, id: &StepId) -> Result<Option<Step>, RepositoryError> {
        Ok(self.lock()?.steps.get(id).cloned())
    }

    fn delete_step(&self, id: &StepId) -> Result<(), RepositoryError> {
        self.lock()?
            .steps
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn steps_for_form(&self, form_id: &FormId) -> Result<Vec<Step>, RepositoryError> {
        let steps = self
            .lock()?
            .steps
            .values()
            .filter(|step| &step.form_id == form_id)
            .cloned()
            .collect();
        Ok(sorted_by_order(steps, |step: &Step| step.order))
    }

    fn list_steps(&self) -> Result<Vec<Step>, RepositoryError> {
        let mut steps: Vec<Step> = self.lock()?.steps.values().cloned().collect();
        steps.sort_by(|a, b| a.order.cmp(&b.order).then(a.form_id.cmp(&b.form_id)));
        Ok(steps)
    }

    fn insert_question(&self, question: Question) -> Result<Question, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.questions.contains_key(&question.id) {
            return Err(RepositoryError::Conflict);
        }
        tables
            .questions
            .insert(question.id.clone(), question.clone());
        Ok(question)
    }

    fn update_question(&self, question: Question) -> Result<(), RepositoryError> {
        self.update_questions(vec![question])
    }

    fn update_questions(&self, questions: Vec<Question>) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        if questions
            .iter()
            .any(|question| !tables.questions.contains_key(&question.id))
        {
            return Err(RepositoryError::NotFound);
        }
        for question in questions {
            tables.questions.insert(question.id.clone(), question);
        }
        Ok(())
    }

    fn fetch_question(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError> {
        Ok(self.lock()?.questions.get(id).cloned())
    }

    fn delete_question(&self, id: &QuestionId) -> Result<(), RepositoryError> {
        self.lock()?
            .questions
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn questions_for_step(&self, step_id: &StepId) -> Result<Vec<Question>, RepositoryError> {
        let questions = self
            .lock()?
            .questions
            .values()
            .filter(|question| &question.step_id == step_id)
            .cloned()
            .collect();
        Ok(sorted_by_order(questions, |question: &Question| {
            question.order
        }))
    }

    fn sub_questions(&self, parent_id: &QuestionId) -> Result<Vec<Question>, RepositoryError> {
        let questions = self
            .lock()?
            .questions
            .values()
            .filter(|question| question.parent_question_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        Ok(sorted_by_order(questions, |question: &Question| {
            question.order
        }))
    }

    fn list_questions(&self) -> Result<Vec<Question>, RepositoryError> {
        let mut questions: Vec<Question> = self.lock()?.questions.values().cloned().collect();
        questions.sort_by(|a, b| a.step_id.cmp(&b.step_id).then(a.order.cmp(&b.order)));
        Ok(questions)
    }
}

impl ResponseRepository for InMemorySurveyStore {
    fn fetch_response(
        &self,
        email: &str,
        form_id: &FormId,
    ) -> Result<Option<FormResponse>, RepositoryError> {
        Ok(self
            .lock()?
            .responses
            .get(&(email.to_string(), form_id.clone()))
            .cloned())
    }

    fn upsert_response(&self, response: FormResponse) -> Result<FormResponse, RepositoryError> {
        let key = (response.email.clone(), response.form_id.clone());
        self.lock()?.responses.insert(key, response.clone());
        Ok(response)
    }

    fn responses_for_form(&self, form_id: &FormId) -> Result<Vec<FormResponse>, RepositoryError> {
        let mut responses: Vec<FormResponse> = self
            .lock()?
            .responses
            .values()
            .filter(|response| &response.form_id == form_id)
            .cloned()
            .collect();
        responses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(responses)
    }
}

impl AdminRepository for InMemorySurveyStore {
    fn insert_admin(&self, user: AdminUser) -> Result<AdminUser, RepositoryError> {
        let mut tables = self.lock()?;
        let key = user.email.to_ascii_lowercase();
        if tables.admins.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        tables.admins.insert(key, user.clone());
        Ok(user)
    }

    fn update_admin(&self, user: AdminUser) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        match tables.admins.get_mut(&user.email.to_ascii_lowercase()) {
            Some(slot) => {
                *slot = user;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_admin_by_email(&self, email: &str) -> Result<Option<AdminUser>, RepositoryError> {
        Ok(self
            .lock()?
            .admins
            .get(&email.to_ascii_lowercase())
            .cloned())
    }

    fn fetch_admin(&self, id: &str) -> Result<Option<AdminUser>, RepositoryError> {
        Ok(self
            .lock()?
            .admins
            .values()
            .find(|user| user.id == id)
            .cloned())
    }
}
