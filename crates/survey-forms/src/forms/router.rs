use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::analytics::{AnalyticsService, DateRange, ExportFormat, FormAnalytics};
use super::domain::{
    Answer, Branding, BrandingUpdate, Form, FormId, FormResponse, FormSummary, FormTree,
    Question, QuestionId, Step, StepId, StepWithQuestions,
};
use super::error::FormError;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::service::{
    FormAdminService, FormFilter, FormUpdate, NewForm, NewQuestion, NewStep, QuestionDetail,
    QuestionOrder, QuestionUpdate, StepUpdate,
};
use super::survey::{SubmissionReceipt, SubmissionRequest, SurveyConfig, SurveyService};
use super::visibility::StepVisibility;
use crate::auth::{require_admin, AuthService};
use crate::sync::{ConnectionStatus, CrmProperty, PropertyCatalog};

const DEFAULT_CRM_ACCOUNT: &str = "minimal";

/// Services shared by the public and admin form routes.
#[derive(Clone)]
pub struct FormsState {
    pub admin: FormAdminService,
    pub survey: SurveyService,
    pub analytics: AnalyticsService,
    pub properties: Arc<PropertyCatalog>,
    pub crm_accounts: Arc<Vec<String>>,
}

/// Respondent-facing routes; no authentication.
pub fn public_router(state: FormsState) -> Router {
    Router::new()
        .route("/api/survey", get(active_survey_handler))
        .route("/api/survey/response", post(submit_handler))
        .route("/api/survey/resume/:email", get(resume_handler))
        .route("/api/forms/:slug", get(form_by_slug_handler))
        .with_state(state)
}

/// Management routes under `/api/admin`, all behind the bearer-token guard.
pub fn admin_router(state: FormsState, auth: AuthService) -> Router {
    Router::new()
        .route("/api/admin/forms", get(list_forms_handler).post(create_form_handler))
        .route(
            "/api/admin/forms/:id",
            get(get_form_handler)
                .put(update_form_handler)
                .delete(delete_form_handler),
        )
        .route("/api/admin/forms/:id/duplicate", post(duplicate_form_handler))
        .route("/api/admin/forms/:id/publish", post(publish_form_handler))
        .route("/api/admin/forms/:id/unpublish", post(unpublish_form_handler))
        .route("/api/admin/forms/:id/analytics", get(analytics_handler))
        .route("/api/admin/forms/:id/analytics/export", get(export_handler))
        .route("/api/admin/forms/:id/preview", post(preview_handler))
        .route("/api/admin/steps", get(list_steps_handler).post(create_step_handler))
        .route(
            "/api/admin/steps/:id",
            get(get_step_handler)
                .put(update_step_handler)
                .delete(delete_step_handler),
        )
        .route(
            "/api/admin/questions",
            get(list_questions_handler).post(create_question_handler),
        )
        .route("/api/admin/questions/reorder", put(reorder_questions_handler))
        .route(
            "/api/admin/questions/:id",
            get(get_question_handler)
                .put(update_question_handler)
                .delete(delete_question_handler),
        )
        .route(
            "/api/admin/branding",
            get(get_branding_handler).put(update_branding_handler),
        )
        .route(
            "/api/admin/integrations/hubspot/properties",
            get(crm_properties_handler),
        )
        .route("/api/admin/integrations/hubspot/test", get(crm_test_handler))
        .route(
            "/api/admin/integrations/hubspot/cache/clear",
            post(crm_cache_clear_handler),
        )
        .route_layer(middleware::from_fn_with_state(auth, require_admin))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormQuery {
    #[serde(default, alias = "surveyId")]
    pub form_id: Option<FormId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    pub account: Option<String>,
    pub form_id: Option<FormId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DuplicateRequest {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub responses: Vec<Answer>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub updates: Vec<QuestionOrder>,
}

fn created<T: serde::Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

fn deleted() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

pub(crate) async fn active_survey_handler(
    State(state): State<FormsState>,
) -> Result<Json<SurveyConfig>, FormError> {
    state.survey.active_survey().map(Json)
}

pub(crate) async fn submit_handler(
    State(state): State<FormsState>,
    ApiJson(request): ApiJson<SubmissionRequest>,
) -> Result<Json<SubmissionReceipt>, FormError> {
    state.survey.submit(request).map(Json)
}

pub(crate) async fn resume_handler(
    State(state): State<FormsState>,
    ApiPath(email): ApiPath<String>,
    ApiQuery(query): ApiQuery<FormQuery>,
) -> Result<Json<FormResponse>, FormError> {
    state.survey.resume(&email, query.form_id).map(Json)
}

pub(crate) async fn form_by_slug_handler(
    State(state): State<FormsState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<FormTree>, FormError> {
    state.survey.resolve_slug(&slug).map(Json)
}

async fn list_forms_handler(
    State(state): State<FormsState>,
    ApiQuery(filter): ApiQuery<FormFilter>,
) -> Result<Json<Vec<FormSummary>>, FormError> {
    state.admin.list_forms(&filter).map(Json)
}

async fn create_form_handler(
    State(state): State<FormsState>,
    ApiJson(input): ApiJson<NewForm>,
) -> Result<Response, FormError> {
    state.admin.create_form(input).map(created)
}

async fn get_form_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
) -> Result<Json<FormTree>, FormError> {
    state.admin.get_form(&id).map(Json)
}

async fn update_form_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
    ApiJson(update): ApiJson<FormUpdate>,
) -> Result<Json<Form>, FormError> {
    state.admin.update_form(&id, update).map(Json)
}

async fn delete_form_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
) -> Result<Json<serde_json::Value>, FormError> {
    state.admin.delete_form(&id).map(|_| deleted())
}

async fn duplicate_form_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
    request: Option<Json<DuplicateRequest>>,
) -> Result<Response, FormError> {
    let name = request.and_then(|Json(request)| request.name);
    state.admin.duplicate_form(&id, name).map(created)
}

async fn publish_form_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
) -> Result<Json<Form>, FormError> {
    state.admin.publish_form(&id).map(Json)
}

async fn unpublish_form_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
) -> Result<Json<Form>, FormError> {
    state.admin.unpublish_form(&id).map(Json)
}

async fn analytics_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> Result<Json<FormAnalytics>, FormError> {
    let range = DateRange::from_query(query.start_date.as_deref(), query.end_date.as_deref())?;
    state.analytics.analytics(&id, range).map(Json)
}

async fn export_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
    ApiQuery(query): ApiQuery<ExportQuery>,
) -> Result<Response, FormError> {
    let file = state.analytics.export(&id, query.format)?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.body,
    )
        .into_response())
}

async fn preview_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<FormId>,
    ApiJson(request): ApiJson<PreviewRequest>,
) -> Result<Json<Vec<StepVisibility>>, FormError> {
    state.admin.preview(&id, &request.responses).map(Json)
}

async fn list_steps_handler(
    State(state): State<FormsState>,
    ApiQuery(query): ApiQuery<FormQuery>,
) -> Result<Json<Vec<StepWithQuestions>>, FormError> {
    state.admin.list_steps(query.form_id.as_ref()).map(Json)
}

async fn create_step_handler(
    State(state): State<FormsState>,
    ApiJson(input): ApiJson<NewStep>,
) -> Result<Response, FormError> {
    state.admin.create_step(input).map(created)
}

async fn get_step_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<StepId>,
) -> Result<Json<StepWithQuestions>, FormError> {
    state.admin.get_step(&id).map(Json)
}

async fn update_step_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<StepId>,
    ApiJson(update): ApiJson<StepUpdate>,
) -> Result<Json<Step>, FormError> {
    state.admin.update_step(&id, update).map(Json)
}

async fn delete_step_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<StepId>,
) -> Result<Json<serde_json::Value>, FormError> {
    state.admin.delete_step(&id).map(|()| deleted())
}

async fn list_questions_handler(
    State(state): State<FormsState>,
) -> Result<Json<Vec<Question>>, FormError> {
    state.admin.list_questions().map(Json)
}

async fn create_question_handler(
    State(state): State<FormsState>,
    ApiJson(input): ApiJson<NewQuestion>,
) -> Result<Response, FormError> {
    state.admin.create_question(input).map(created)
}

async fn get_question_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<QuestionId>,
) -> Result<Json<QuestionDetail>, FormError> {
    state.admin.get_question(&id).map(Json)
}

async fn update_question_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<QuestionId>,
    ApiJson(update): ApiJson<QuestionUpdate>,
) -> Result<Json<Question>, FormError> {
    state.admin.update_question(&id, update).map(Json)
}

async fn delete_question_handler(
    State(state): State<FormsState>,
    ApiPath(id): ApiPath<QuestionId>,
) -> Result<Json<serde_json::Value>, FormError> {
    state.admin.delete_question(&id).map(|()| deleted())
}

async fn reorder_questions_handler(
    State(state): State<FormsState>,
    ApiJson(request): ApiJson<ReorderRequest>,
) -> Result<Json<Vec<Question>>, FormError> {
    state.admin.reorder_questions(request.updates).map(Json)
}

async fn get_branding_handler(
    State(state): State<FormsState>,
    ApiQuery(query): ApiQuery<FormQuery>,
) -> Result<Json<Branding>, FormError> {
    state.admin.get_branding(query.form_id.as_ref()).map(Json)
}

async fn update_branding_handler(
    State(state): State<FormsState>,
    ApiQuery(query): ApiQuery<FormQuery>,
    ApiJson(update): ApiJson<BrandingUpdate>,
) -> Result<Json<Branding>, FormError> {
    state
        .admin
        .update_branding(query.form_id.as_ref(), update)
        .map(Json)
}

/// Account named in the query, else the form's account; unknown names fall
/// back to the default account.
fn resolve_account(state: &FormsState, query: &AccountQuery) -> String {
    let from_form = query
        .form_id
        .as_ref()
        .and_then(|id| state.admin.require_form(id).ok())
        .map(|form| form.crm_account);
    let requested = from_form.or_else(|| query.account.clone());

    match requested {
        Some(account) if state.crm_accounts.iter().any(|known| *known == account) => account,
        _ => DEFAULT_CRM_ACCOUNT.to_string(),
    }
}

async fn crm_properties_handler(
    State(state): State<FormsState>,
    ApiQuery(query): ApiQuery<AccountQuery>,
) -> Json<Vec<CrmProperty>> {
    let account = resolve_account(&state, &query);
    Json(state.properties.properties(&account).await)
}

async fn crm_test_handler(
    State(state): State<FormsState>,
    ApiQuery(query): ApiQuery<AccountQuery>,
) -> Json<ConnectionStatus> {
    let account = resolve_account(&state, &query);
    Json(state.properties.test_connection(&account).await)
}

async fn crm_cache_clear_handler(
    State(state): State<FormsState>,
    ApiQuery(query): ApiQuery<AccountQuery>,
) -> Json<serde_json::Value> {
    let account = query.account.as_deref();
    state.properties.clear(account);
    let scope = account.map_or_else(|| " for all accounts".to_string(), |name| format!(" for {name}"));
    Json(json!({ "success": true, "message": format!("Cache cleared{scope}") }))
}
