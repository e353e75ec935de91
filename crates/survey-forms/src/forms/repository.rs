use super::domain::{Form, FormId, FormResponse, Question, QuestionId, Step, StepId};

/// Storage abstraction for the form definition hierarchy.
pub trait FormRepository: Send + Sync {
    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError>;
    fn update_form(&self, form: Form) -> Result<(), RepositoryError>;
    fn fetch_form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError>;
    fn fetch_form_by_slug(&self, slug: &str) -> Result<Option<Form>, RepositoryError>;
    fn list_forms(&self) -> Result<Vec<Form>, RepositoryError>;

    fn insert_step(&self, step: Step) -> Result<Step, RepositoryError>;
    fn update_step(&self, step: Step) -> Result<(), RepositoryError>;
    fn fetch_step(&self, id: &StepId) -> Result<Option<Step>, RepositoryError>;
    fn delete_step(&self, id: &StepId) -> Result<(), RepositoryError>;
    /// Steps of a form ordered ascending by `order`.
    fn steps_for_form(&self, form_id: &FormId) -> Result<Vec<Step>, RepositoryError>;
    fn list_steps(&self) -> Result<Vec<Step>, RepositoryError>;

    fn insert_question(&self, question: Question) -> Result<Question, RepositoryError>;
    fn update_question(&self, question: Question) -> Result<(), RepositoryError>;
    /// Replaces several questions at once; either all are written or none.
    fn update_questions(&self, questions: Vec<Question>) -> Result<(), RepositoryError>;
    fn fetch_question(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError>;
    fn delete_question(&self, id: &QuestionId) -> Result<(), RepositoryError>;
    /// Questions of a step ordered ascending by `order`.
    fn questions_for_step(&self, step_id: &StepId) -> Result<Vec<Question>, RepositoryError>;
    fn sub_questions(&self, parent_id: &QuestionId) -> Result<Vec<Question>, RepositoryError>;
    fn list_questions(&self) -> Result<Vec<Question>, RepositoryError>;
}

/// Storage for respondent aggregates. `upsert_response` replaces the record
/// for the same (email, form) pair atomically.
pub trait ResponseRepository: Send + Sync {
    fn fetch_response(
        &self,
        email: &str,
        form_id: &FormId,
    ) -> Result<Option<FormResponse>, RepositoryError>;
    fn upsert_response(&self, response: FormResponse) -> Result<FormResponse, RepositoryError>;
    fn responses_for_form(&self, form_id: &FormId) -> Result<Vec<FormResponse>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
