//! Survey definitions, respondent flows, and the admin surface around them.
//!
//! Forms own ordered steps, steps own ordered questions, and questions may hang
//! off a parent question to form conditional chains at most three levels deep.
//! Respondents submit one step at a time; each batch is merged into a single
//! response record per (email, form).

pub mod analytics;
pub mod domain;
pub mod error;
pub mod extract;
pub mod repository;
pub mod responses;
pub mod router;
pub mod service;
pub mod slug;
pub mod survey;
pub mod visibility;

#[cfg(test)]
mod tests;

pub use analytics::{AnalyticsService, DateRange, ExportFile, ExportFormat, FormAnalytics};
pub use domain::{
    Answer, AnswerValue, Branding, BrandingUpdate, Form, FormId, FormResponse, FormStatus,
    FormSummary, FormTree, Question, QuestionId, QuestionType, Step, StepId, StepWithQuestions,
    MAX_NESTING_LEVEL,
};
pub use error::FormError;
pub use repository::{FormRepository, RepositoryError, ResponseRepository};
pub use responses::ResponseAggregator;
pub use router::{admin_router, public_router, FormsState};
pub use service::{
    FormAdminService, FormFilter, FormUpdate, NewForm, NewQuestion, NewStep, QuestionOrder,
    QuestionUpdate, StepUpdate,
};
pub use survey::{SubmissionReceipt, SubmissionRequest, SurveyConfig, SurveyService};
pub use visibility::{preview_form, visible_questions, StepVisibility, VisibilityEvaluator};
