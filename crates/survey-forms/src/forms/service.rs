use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use super::domain::{
    Answer, AnswerValue, Branding, BrandingUpdate, Form, FormId, FormStatus, FormSummary,
    FormTree, Question, QuestionId, QuestionType, Step, StepId, StepWithQuestions,
    MAX_NESTING_LEVEL,
};
use super::error::FormError;
use super::repository::{FormRepository, ResponseRepository};
use super::slug::{slugify, unique_slug};
use super::visibility::{nesting_level_under, preview_form, StepVisibility};
use crate::sync::CrmObjectType;

const DEFAULT_FORM_TYPE: &str = "post_purchase";
const DEFAULT_CRM_ACCOUNT: &str = "minimal";
const FORM_LIST_LIMIT: usize = 100;

/// Distinguishes an absent field from an explicit `null` in patch payloads.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFilter {
    #[serde(default)]
    pub status: Option<FormStatus>,
    #[serde(default, rename = "type")]
    pub form_type: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewForm {
    pub name: String,
    #[serde(default, rename = "type")]
    pub form_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "hubspotAccount")]
    pub crm_account: Option<String>,
    #[serde(default, rename = "hubspotTargetType")]
    pub crm_target_type: Option<CrmObjectType>,
    #[serde(default, rename = "hubspotTargetIdParam")]
    pub crm_target_id_param: Option<String>,
    #[serde(default)]
    pub branding: Option<Branding>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, rename = "type")]
    pub form_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "hubspotAccount")]
    pub crm_account: Option<String>,
    #[serde(default, rename = "hubspotTargetType", deserialize_with = "nullable")]
    pub crm_target_type: Option<Option<CrmObjectType>>,
    #[serde(default, rename = "hubspotTargetIdParam", deserialize_with = "nullable")]
    pub crm_target_id_param: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub branding: Option<Branding>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStep {
    #[serde(alias = "surveyId")]
    pub form_id: FormId,
    pub order: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub step_id: StepId,
    pub order: u32,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, rename = "hubspotProperty")]
    pub crm_property: String,
    #[serde(default)]
    pub parent_question_id: Option<QuestionId>,
    #[serde(default)]
    pub condition_value: Option<AnswerValue>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdate {
    #[serde(default)]
    pub step_id: Option<StepId>,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub question_type: Option<QuestionType>,
    #[serde(default, deserialize_with = "nullable")]
    pub options: Option<Option<Vec<String>>>,
    #[serde(default)]
    pub is_required: Option<bool>,
    #[serde(default, rename = "hubspotProperty")]
    pub crm_property: Option<String>,
    /// `null` detaches the question back to top level.
    #[serde(default, deserialize_with = "nullable")]
    pub parent_question_id: Option<Option<QuestionId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub condition_value: Option<Option<AnswerValue>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionOrder {
    pub id: QuestionId,
    pub order: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub sub_question_ids: Vec<QuestionId>,
}

/// Admin-side management of forms, steps, questions and branding.
#[derive(Clone)]
pub struct FormAdminService {
    forms: Arc<dyn FormRepository>,
    responses: Arc<dyn ResponseRepository>,
}

impl FormAdminService {
    pub fn new(forms: Arc<dyn FormRepository>, responses: Arc<dyn ResponseRepository>) -> Self {
        Self { forms, responses }
    }

    pub fn list_forms(&self, filter: &FormFilter) -> Result<Vec<FormSummary>, FormError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);

        let mut forms: Vec<Form> = self
            .forms
            .list_forms()?
            .into_iter()
            .filter(|form| filter.status.map_or(true, |status| form.status() == status))
            .filter(|form| {
                filter
                    .form_type
                    .as_deref()
                    .map_or(true, |form_type| form.form_type == form_type)
            })
            .filter(|form| match &search {
                Some(term) => {
                    form.name.to_lowercase().contains(term)
                        || form
                            .description
                            .as_deref()
                            .is_some_and(|description| description.to_lowercase().contains(term))
                }
                None => true,
            })
            .collect();

        forms.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        forms.truncate(FORM_LIST_LIMIT);

        forms
            .into_iter()
            .map(|form| -> Result<FormSummary, FormError> {
                let response_count = self.responses.responses_for_form(&form.id)?.len();
                Ok(FormSummary {
                    form,
                    response_count,
                })
            })
            .collect()
    }

    pub fn get_form(&self, id: &FormId) -> Result<FormTree, FormError> {
        let form = self.require_form(id)?;
        self.form_tree(form)
    }

    /// Assembles a form with its ordered steps and questions.
    pub fn form_tree(&self, form: Form) -> Result<FormTree, FormError> {
        let steps = self
            .forms
            .steps_for_form(&form.id)?
            .into_iter()
            .map(|step| self.step_with_questions(step))
            .collect::<Result<Vec<_>, _>>()?;
        let response_count = self.responses.responses_for_form(&form.id)?.len();

        Ok(FormTree {
            form,
            steps,
            response_count,
        })
    }

    pub fn create_form(&self, input: NewForm) -> Result<Form, FormError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(FormError::validation("form name is required"));
        }

        let slug = self.available_slug(&slugify(&name), None)?;
        let now = Utc::now();
        let form = Form {
            id: FormId::generate(),
            name,
            slug,
            form_type: input
                .form_type
                .unwrap_or_else(|| DEFAULT_FORM_TYPE.to_string()),
            description: input.description,
            is_active: true,
            is_published: false,
            published_at: None,
            branding: input.branding.unwrap_or_default(),
            settings: input.settings.unwrap_or_else(|| serde_json::json!({})),
            metadata: serde_json::json!({}),
            crm_account: input
                .crm_account
                .unwrap_or_else(|| DEFAULT_CRM_ACCOUNT.to_string()),
            crm_target_type: input.crm_target_type,
            crm_target_id_param: input.crm_target_id_param,
            created_at: now,
            updated_at: now,
        };

        let stored = self.forms.insert_form(form)?;
        tracing::info!(form_id = %stored.id, slug = %stored.slug, "form created");
        Ok(stored)
    }

    pub fn update_form(&self, id: &FormId, update: FormUpdate) -> Result<Form, FormError> {
        let mut form = self.require_form(id)?;

        match (&update.slug, &update.name) {
            (Some(slug), _) if *slug != form.slug => {
                form.slug = self.available_slug(&slugify(slug), Some(id))?;
            }
            (None, Some(name)) if *name != form.name => {
                form.slug = self.available_slug(&slugify(name), Some(id))?;
            }
            _ => {}
        }

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(FormError::validation("form name cannot be empty"));
            }
            form.name = name;
        }
        if let Some(form_type) = update.form_type {
            form.form_type = form_type;
        }
        if let Some(description) = update.description {
            form.description = Some(description);
        }
        if let Some(account) = update.crm_account {
            form.crm_account = account;
        }
        if let Some(target_type) = update.crm_target_type {
            form.crm_target_type = target_type;
        }
        if let Some(param) = update.crm_target_id_param {
            form.crm_target_id_param = param;
        }
        if let Some(is_active) = update.is_active {
            form.is_active = is_active;
        }
        if let Some(is_published) = update.is_published {
            if is_published && !form.is_published {
                form.published_at = Some(Utc::now());
            }
            form.is_published = is_published;
        }
        if let Some(branding) = update.branding {
            form.branding = branding;
        }
        if let Some(settings) = update.settings {
            form.settings = settings;
        }
        if let Some(metadata) = update.metadata {
            form.metadata = metadata;
        }

        form.updated_at = Utc::now();
        self.forms.update_form(form.clone())?;
        Ok(form)
    }

    /// Soft delete: the form is archived and drops out of public resolution.
    pub fn delete_form(&self, id: &FormId) -> Result<Form, FormError> {
        let form = self.update_form(
            id,
            FormUpdate {
                is_active: Some(false),
                ..FormUpdate::default()
            },
        )?;
        tracing::info!(form_id = %id, "form archived");
        Ok(form)
    }

    pub fn publish_form(&self, id: &FormId) -> Result<Form, FormError> {
        self.update_form(
            id,
            FormUpdate {
                is_published: Some(true),
                ..FormUpdate::default()
            },
        )
    }

    pub fn unpublish_form(&self, id: &FormId) -> Result<Form, FormError> {
        self.update_form(
            id,
            FormUpdate {
                is_published: Some(false),
                ..FormUpdate::default()
            },
        )
    }

    /// Copies a form with fresh ids; conditional edges are re-pointed at the
    /// copied parents. The copy starts unpublished.
    pub fn duplicate_form(
        &self,
        id: &FormId,
        new_name: Option<String>,
    ) -> Result<FormTree, FormError> {
        let source = self.get_form(id)?;
        let name = new_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{} (Copy)", source.form.name));

        let now = Utc::now();
        let copy = Form {
            id: FormId::generate(),
            slug: self.available_slug(&slugify(&name), None)?,
            name,
            is_active: true,
            is_published: false,
            published_at: None,
            created_at: now,
            updated_at: now,
            ..source.form.clone()
        };
        let copy = self.forms.insert_form(copy)?;

        let id_map: HashMap<&QuestionId, QuestionId> = source
            .questions()
            .map(|question| (&question.id, QuestionId::generate()))
            .collect();

        for entry in &source.steps {
            let step = self.forms.insert_step(Step {
                id: StepId::generate(),
                form_id: copy.id.clone(),
                created_at: now,
                updated_at: now,
                ..entry.step.clone()
            })?;

            for question in &entry.questions {
                let id = id_map
                    .get(&question.id)
                    .cloned()
                    .unwrap_or_else(QuestionId::generate);
                let parent_question_id = question
                    .parent_question_id
                    .as_ref()
                    .and_then(|parent| id_map.get(parent).cloned());
                self.forms.insert_question(Question {
                    id,
                    step_id: step.id.clone(),
                    parent_question_id,
                    created_at: now,
                    updated_at: now,
                    ..question.clone()
                })?;
            }
        }

        tracing::info!(source = %id, form_id = %copy.id, "form duplicated");
        self.form_tree(copy)
    }

    pub fn list_steps(&self, form_id: Option<&FormId>) -> Result<Vec<StepWithQuestions>, FormError> {
        let steps = match form_id {
            Some(form_id) => self.forms.steps_for_form(form_id)?,
            None => self.forms.list_steps()?,
        };
        steps
            .into_iter()
            .map(|step| self.step_with_questions(step))
            .collect()
    }

    pub fn get_step(&self, id: &StepId) -> Result<StepWithQuestions, FormError> {
        let step = self.require_step(id)?;
        self.step_with_questions(step)
    }

    pub fn create_step(&self, input: NewStep) -> Result<Step, FormError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(FormError::validation("step name is required"));
        }
        self.require_form(&input.form_id)?;
        self.ensure_step_order_free(&input.form_id, input.order, None)?;

        let now = Utc::now();
        let step = self.forms.insert_step(Step {
            id: StepId::generate(),
            form_id: input.form_id,
            order: input.order,
            name,
            description: input.description,
            created_at: now,
            updated_at: now,
        })?;
        Ok(step)
    }

    pub fn update_step(&self, id: &StepId, update: StepUpdate) -> Result<Step, FormError> {
        let mut step = self.require_step(id)?;

        if let Some(order) = update.order {
            if order != step.order {
                self.ensure_step_order_free(&step.form_id, order, Some(id))?;
            }
            step.order = order;
        }
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(FormError::validation("step name cannot be empty"));
            }
            step.name = name;
        }
        if let Some(description) = update.description {
            step.description = description;
        }

        step.updated_at = Utc::now();
        self.forms.update_step(step.clone())?;
        Ok(step)
    }

    pub fn delete_step(&self, id: &StepId) -> Result<(), FormError> {
        self.require_step(id)?;
        if !self.forms.questions_for_step(id)?.is_empty() {
            return Err(FormError::StepHasQuestions);
        }
        self.forms.delete_step(id)?;
        Ok(())
    }

    pub fn list_questions(&self) -> Result<Vec<Question>, FormError> {
        Ok(self.forms.list_questions()?)
    }

    pub fn get_question(&self, id: &QuestionId) -> Result<QuestionDetail, FormError> {
        let question = self.require_question(id)?;
        let sub_question_ids = self
            .forms
            .sub_questions(id)?
            .into_iter()
            .map(|child| child.id)
            .collect();
        Ok(QuestionDetail {
            question,
            sub_question_ids,
        })
    }

    pub fn create_question(&self, input: NewQuestion) -> Result<Question, FormError> {
        let text = input.text.trim().to_string();
        if text.is_empty() {
            return Err(FormError::validation("question text is required"));
        }

        let step = self.require_step(&input.step_id)?;
        self.ensure_question_order_free(&step.id, input.order, None)?;

        let parent = input
            .parent_question_id
            .as_ref()
            .map(|parent_id| self.require_parent(parent_id, &step.form_id))
            .transpose()?;
        let nesting_level = nesting_level_under(parent.as_ref())?;

        let now = Utc::now();
        let question = self.forms.insert_question(Question {
            id: QuestionId::generate(),
            step_id: step.id,
            order: input.order,
            text,
            question_type: input.question_type,
            options: input.options,
            is_required: input.is_required,
            crm_property: input.crm_property,
            parent_question_id: input.parent_question_id,
            condition_value: input.condition_value,
            nesting_level,
            category: input.category,
            created_at: now,
            updated_at: now,
        })?;
        Ok(question)
    }

    /// Applies a question patch. Re-parenting recomputes the nesting level of
    /// the question and every descendant; the whole subtree is written at once.
    pub fn update_question(
        &self,
        id: &QuestionId,
        update: QuestionUpdate,
    ) -> Result<Question, FormError> {
        let mut question = self.require_question(id)?;
        let original_step = question.step_id.clone();

        if let Some(step_id) = update.step_id {
            let target = self.require_step(&step_id)?;
            if step_id != original_step {
                let source = self.require_step(&original_step)?;
                if source.form_id != target.form_id {
                    if !self.descendants(id)?.is_empty() {
                        return Err(FormError::validation(
                            "cannot move a question with sub-questions to another form",
                        ));
                    }
                    // An explicit parent patch is checked against the new form below.
                    if let (Some(parent_id), None) =
                        (&question.parent_question_id, &update.parent_question_id)
                    {
                        self.require_parent(parent_id, &target.form_id)?;
                    }
                }
            }
            question.step_id = step_id;
        }
        if let Some(order) = update.order {
            question.order = order;
        }
        if update.order.is_some() || question.step_id != original_step {
            self.ensure_question_order_free(&question.step_id, question.order, Some(id))?;
        }
        if let Some(text) = update.text {
            let text = text.trim().to_string();
            if text.is_empty() {
                return Err(FormError::validation("question text cannot be empty"));
            }
            question.text = text;
        }
        if let Some(question_type) = update.question_type {
            question.question_type = question_type;
        }
        if let Some(options) = update.options {
            question.options = options;
        }
        if let Some(is_required) = update.is_required {
            question.is_required = is_required;
        }
        if let Some(crm_property) = update.crm_property {
            question.crm_property = crm_property;
        }
        if let Some(condition_value) = update.condition_value {
            question.condition_value = condition_value;
        }
        if let Some(category) = update.category {
            question.category = category;
        }

        let mut subtree = Vec::new();
        if let Some(parent_id) = update.parent_question_id {
            let step = self.require_step(&question.step_id)?;
            let descendants = self.descendants(id)?;

            let parent = match &parent_id {
                Some(parent_id) => {
                    if parent_id == id || descendants.iter().any(|child| &child.id == parent_id) {
                        return Err(FormError::CyclicParent);
                    }
                    Some(self.require_parent(parent_id, &step.form_id)?)
                }
                None => None,
            };

            question.nesting_level = nesting_level_under(parent.as_ref())?;
            question.parent_question_id = parent_id;
            subtree = relevel_descendants(&question, descendants)?;
        }

        let now = Utc::now();
        question.updated_at = now;
        let mut batch = Vec::with_capacity(subtree.len() + 1);
        batch.push(question.clone());
        batch.extend(subtree.into_iter().map(|mut child| {
            child.updated_at = now;
            child
        }));
        self.forms.update_questions(batch)?;
        Ok(question)
    }

    /// Hard delete guarded by the absence of sub-questions.
    pub fn delete_question(&self, id: &QuestionId) -> Result<(), FormError> {
        self.require_question(id)?;
        if !self.forms.sub_questions(id)?.is_empty() {
            return Err(FormError::QuestionHasSubQuestions);
        }
        self.forms.delete_question(id)?;
        Ok(())
    }

    /// Applies a batch of order changes; rejected as a whole if any step would
    /// end up with two questions sharing an order.
    pub fn reorder_questions(&self, updates: Vec<QuestionOrder>) -> Result<Vec<Question>, FormError> {
        let mut changed: HashMap<QuestionId, Question> = HashMap::new();
        for update in updates {
            let mut question = match changed.remove(&update.id) {
                Some(question) => question,
                None => self.require_question(&update.id)?,
            };
            question.order = update.order;
            question.updated_at = Utc::now();
            changed.insert(question.id.clone(), question);
        }

        let steps: BTreeSet<StepId> = changed
            .values()
            .map(|question| question.step_id.clone())
            .collect();
        for step_id in &steps {
            let mut seen = HashSet::new();
            for question in self.forms.questions_for_step(step_id)? {
                let order = changed
                    .get(&question.id)
                    .map_or(question.order, |updated| updated.order);
                if !seen.insert(order) {
                    return Err(FormError::DuplicateQuestionOrder(order));
                }
            }
        }

        let mut questions: Vec<Question> = changed.into_values().collect();
        questions.sort_by(|a, b| a.step_id.cmp(&b.step_id).then(a.order.cmp(&b.order)));
        self.forms.update_questions(questions.clone())?;
        Ok(questions)
    }

    /// Branding for `form_id`, or for the active published form when omitted.
    pub fn get_branding(&self, form_id: Option<&FormId>) -> Result<Branding, FormError> {
        Ok(self.branding_target(form_id)?.branding)
    }

    pub fn update_branding(
        &self,
        form_id: Option<&FormId>,
        update: BrandingUpdate,
    ) -> Result<Branding, FormError> {
        let mut form = self.branding_target(form_id)?;
        form.branding.merge(update);
        form.updated_at = Utc::now();
        self.forms.update_form(form.clone())?;
        Ok(form.branding)
    }

    pub fn preview(&self, id: &FormId, answers: &[Answer]) -> Result<Vec<StepVisibility>, FormError> {
        let tree = self.get_form(id)?;
        Ok(preview_form(&tree, answers))
    }

    pub fn active_form(&self) -> Result<Option<Form>, FormError> {
        Ok(self
            .forms
            .list_forms()?
            .into_iter()
            .find(|form| form.is_active && form.is_published))
    }

    pub fn require_form(&self, id: &FormId) -> Result<Form, FormError> {
        self.forms.fetch_form(id)?.ok_or(FormError::FormNotFound)
    }

    pub fn fetch_form_by_slug(&self, slug: &str) -> Result<Option<Form>, FormError> {
        Ok(self.forms.fetch_form_by_slug(slug)?)
    }
}

impl FormAdminService {
    fn branding_target(&self, form_id: Option<&FormId>) -> Result<Form, FormError> {
        match form_id {
            Some(id) => self.require_form(id),
            None => self.active_form()?.ok_or(FormError::NoActiveForm),
        }
    }

    fn step_with_questions(&self, step: Step) -> Result<StepWithQuestions, FormError> {
        let questions = self.forms.questions_for_step(&step.id)?;
        Ok(StepWithQuestions { step, questions })
    }

    fn require_step(&self, id: &StepId) -> Result<Step, FormError> {
        self.forms.fetch_step(id)?.ok_or(FormError::StepNotFound)
    }

    fn require_question(&self, id: &QuestionId) -> Result<Question, FormError> {
        self.forms
            .fetch_question(id)?
            .ok_or(FormError::QuestionNotFound)
    }

    /// Parent must exist and belong to the same form as the child.
    fn require_parent(&self, parent_id: &QuestionId, form_id: &FormId) -> Result<Question, FormError> {
        let parent = self
            .forms
            .fetch_question(parent_id)?
            .ok_or(FormError::ParentQuestionNotFound)?;
        let parent_step = self
            .forms
            .fetch_step(&parent.step_id)?
            .ok_or(FormError::ParentQuestionNotFound)?;
        if &parent_step.form_id != form_id {
            return Err(FormError::ParentQuestionNotFound);
        }
        Ok(parent)
    }

    fn descendants(&self, id: &QuestionId) -> Result<Vec<Question>, FormError> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([id.clone()]);

        while let Some(current) = queue.pop_front() {
            for child in self.forms.sub_questions(&current)? {
                if visited.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                    found.push(child);
                }
            }
        }
        Ok(found)
    }

    fn ensure_step_order_free(
        &self,
        form_id: &FormId,
        order: u32,
        exclude: Option<&StepId>,
    ) -> Result<(), FormError> {
        let clash = self
            .forms
            .steps_for_form(form_id)?
            .iter()
            .any(|step| step.order == order && Some(&step.id) != exclude);
        if clash {
            return Err(FormError::DuplicateStepOrder(order));
        }
        Ok(())
    }

    fn ensure_question_order_free(
        &self,
        step_id: &StepId,
        order: u32,
        exclude: Option<&QuestionId>,
    ) -> Result<(), FormError> {
        let clash = self
            .forms
            .questions_for_step(step_id)?
            .iter()
            .any(|question| question.order == order && Some(&question.id) != exclude);
        if clash {
            return Err(FormError::DuplicateQuestionOrder(order));
        }
        Ok(())
    }

    fn available_slug(&self, base: &str, exclude: Option<&FormId>) -> Result<String, FormError> {
        let forms = self.forms.list_forms()?;
        Ok(unique_slug(base, |candidate| {
            forms
                .iter()
                .any(|form| form.slug == candidate && Some(&form.id) != exclude)
        }))
    }
}

/// Recomputes levels below `root` breadth-first from its new level.
fn relevel_descendants(root: &Question, descendants: Vec<Question>) -> Result<Vec<Question>, FormError> {
    let mut levels: HashMap<QuestionId, u8> = HashMap::from([(root.id.clone(), root.nesting_level)]);
    let mut pending = descendants;
    let mut resolved = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let before = pending.len();
        let mut remaining = Vec::new();
        for mut child in pending {
            let parent_level = child
                .parent_question_id
                .as_ref()
                .and_then(|parent| levels.get(parent).copied());
            match parent_level {
                Some(level) => {
                    let level = level + 1;
                    if level > MAX_NESTING_LEVEL {
                        return Err(FormError::MaxNestingExceeded);
                    }
                    child.nesting_level = level;
                    levels.insert(child.id.clone(), level);
                    resolved.push(child);
                }
                None => remaining.push(child),
            }
        }
        if remaining.len() == before {
            break;
        }
        pending = remaining;
    }

    Ok(resolved)
}
