use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{Answer, Form, FormId, FormResponse, FormTree, StepWithQuestions};
use super::error::FormError;
use super::responses::ResponseAggregator;
use super::service::FormAdminService;
use crate::sync::{map_answers, CrmTarget, SyncDispatcher, SyncJob};

/// Active survey as served to the public renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyConfig {
    pub survey: Form,
    pub steps: Vec<StepWithQuestions>,
}

impl From<FormTree> for SurveyConfig {
    fn from(tree: FormTree) -> Self {
        Self {
            survey: tree.form,
            steps: tree.steps,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub email: String,
    #[serde(alias = "surveyId")]
    pub form_id: FormId,
    pub step_number: u32,
    pub responses: Vec<Answer>,
    /// CRM record id taken from the URL parameter the form names.
    #[serde(default)]
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub success: bool,
    pub current_step: u32,
    pub is_completed: bool,
}

/// Respondent-facing flows: fetch, submit, resume.
#[derive(Clone)]
pub struct SurveyService {
    forms: FormAdminService,
    aggregator: ResponseAggregator,
    dispatcher: Arc<SyncDispatcher>,
}

impl SurveyService {
    pub fn new(
        forms: FormAdminService,
        aggregator: ResponseAggregator,
        dispatcher: Arc<SyncDispatcher>,
    ) -> Self {
        Self {
            forms,
            aggregator,
            dispatcher,
        }
    }

    pub fn active_survey(&self) -> Result<SurveyConfig, FormError> {
        let form = self.forms.active_form()?.ok_or(FormError::NoActiveForm)?;
        Ok(self.forms.form_tree(form)?.into())
    }

    /// Public lookup by slug. Unpublished forms are reported before archived ones.
    pub fn resolve_slug(&self, slug: &str) -> Result<FormTree, FormError> {
        let form = self
            .forms
            .fetch_form_by_slug(slug)?
            .ok_or(FormError::FormNotFound)?;
        if !form.is_published {
            return Err(FormError::NotPublished);
        }
        if !form.is_active {
            return Err(FormError::Archived);
        }
        self.forms.form_tree(form)
    }

    /// Persists the batch, then hands mapped answers to the sync worker. Sync
    /// never affects the receipt.
    pub fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReceipt, FormError> {
        let email = request.email.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(FormError::validation("a valid email is required"));
        }

        let answers = request.responses;
        let saved = self.aggregator.save_response(
            &email,
            &request.form_id,
            request.step_number,
            answers.clone(),
        )?;

        let tree = self.forms.get_form(&request.form_id)?;
        let mapped = map_answers(&tree, &answers);
        if !mapped.is_empty() {
            let target = tree.form.crm_target_type.and_then(|object_type| {
                request
                    .target_id
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .map(|object_id| CrmTarget {
                        object_type,
                        object_id,
                    })
            });
            self.dispatcher.dispatch(SyncJob {
                form_id: tree.form.id.clone(),
                email,
                answers: mapped,
                account: tree.form.crm_account.clone(),
                target,
            });
        }

        Ok(SubmissionReceipt {
            success: true,
            current_step: saved.current_step,
            is_completed: saved.is_completed,
        })
    }

    /// Incomplete response for `email` on `form_id`, or on the active form.
    pub fn resume(&self, email: &str, form_id: Option<FormId>) -> Result<FormResponse, FormError> {
        let form_id = match form_id {
            Some(id) => id,
            None => {
                self.forms
                    .active_form()?
                    .ok_or(FormError::NoActiveForm)?
                    .id
            }
        };
        self.aggregator.resume(email, &form_id)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
