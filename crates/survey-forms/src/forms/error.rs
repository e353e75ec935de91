use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::repository::RepositoryError;

/// Error raised by the form services.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("{0}")]
    Validation(String),
    #[error("form not found")]
    FormNotFound,
    #[error("step not found")]
    StepNotFound,
    #[error("question not found")]
    QuestionNotFound,
    #[error("no incomplete survey found")]
    ResponseNotFound,
    #[error("no active survey found")]
    NoActiveForm,
    #[error("parent question not found")]
    ParentQuestionNotFound,
    #[error("maximum nesting level (3) exceeded")]
    MaxNestingExceeded,
    #[error("a question cannot be nested under itself or its own sub-questions")]
    CyclicParent,
    #[error("cannot delete step with questions; delete questions first")]
    StepHasQuestions,
    #[error("cannot delete question with sub-questions; delete sub-questions first")]
    QuestionHasSubQuestions,
    #[error("step order {0} is already used in this form")]
    DuplicateStepOrder(u32),
    #[error("question order {0} is already used in this step")]
    DuplicateQuestionOrder(u32),
    #[error("form is not published")]
    NotPublished,
    #[error("form has been archived")]
    Archived,
    #[error("export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl FormError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FormError::Validation(_)
            | FormError::ParentQuestionNotFound
            | FormError::MaxNestingExceeded
            | FormError::CyclicParent
            | FormError::StepHasQuestions
            | FormError::QuestionHasSubQuestions
            | FormError::DuplicateStepOrder(_)
            | FormError::DuplicateQuestionOrder(_) => StatusCode::BAD_REQUEST,
            FormError::FormNotFound
            | FormError::StepNotFound
            | FormError::QuestionNotFound
            | FormError::ResponseNotFound
            | FormError::NoActiveForm
            | FormError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            FormError::NotPublished => StatusCode::FORBIDDEN,
            FormError::Archived => StatusCode::GONE,
            FormError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            FormError::Export(_) | FormError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code returned next to the message.
    pub const fn code(&self) -> &'static str {
        match self {
            FormError::Validation(_) => "VALIDATION_ERROR",
            FormError::FormNotFound => "FORM_NOT_FOUND",
            FormError::StepNotFound => "STEP_NOT_FOUND",
            FormError::QuestionNotFound => "QUESTION_NOT_FOUND",
            FormError::ResponseNotFound => "RESPONSE_NOT_FOUND",
            FormError::NoActiveForm => "NO_ACTIVE_FORM",
            FormError::ParentQuestionNotFound => "PARENT_QUESTION_NOT_FOUND",
            FormError::MaxNestingExceeded => "MAX_NESTING_EXCEEDED",
            FormError::CyclicParent => "CYCLIC_PARENT",
            FormError::StepHasQuestions => "STEP_HAS_QUESTIONS",
            FormError::QuestionHasSubQuestions => "QUESTION_HAS_SUB_QUESTIONS",
            FormError::DuplicateStepOrder(_) => "DUPLICATE_STEP_ORDER",
            FormError::DuplicateQuestionOrder(_) => "DUPLICATE_QUESTION_ORDER",
            FormError::NotPublished => "NOT_PUBLISHED",
            FormError::Archived => "ARCHIVED",
            FormError::Repository(RepositoryError::NotFound) => "NOT_FOUND",
            FormError::Repository(RepositoryError::Conflict) => "CONFLICT",
            FormError::Export(_) | FormError::Repository(RepositoryError::Unavailable(_)) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "form request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({ "error": message, "code": self.code() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_conflicts_map_to_documented_statuses() {
        assert_eq!(FormError::NotPublished.status(), StatusCode::FORBIDDEN);
        assert_eq!(FormError::Archived.status(), StatusCode::GONE);
        assert_eq!(FormError::MaxNestingExceeded.status(), StatusCode::BAD_REQUEST);
        assert_eq!(FormError::FormNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(FormError::Archived.code(), "ARCHIVED");
    }

    #[test]
    fn internal_failures_hide_details() {
        let error = FormError::Repository(RepositoryError::Unavailable("db down".to_string()));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
