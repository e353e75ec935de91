use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use serde_json::Value;

use crate::auth::{auth_router, AuthService};
use crate::config::AuthConfig;
use crate::forms::domain::{AnswerValue, Form, FormId, Question, QuestionId, QuestionType, Step};
use crate::forms::service::{NewForm, NewQuestion, NewStep};
use crate::forms::{
    admin_router, public_router, AnalyticsService, FormAdminService, FormsState,
    ResponseAggregator, SurveyService,
};
use crate::memory::InMemorySurveyStore;
use crate::sync::{CrmAccounts, PropertyCatalog, SyncDispatcher};

pub(super) const ADMIN_EMAIL: &str = "admin@example.com";
pub(super) const ADMIN_PASSWORD: &str = "correct horse";

pub(super) struct Harness {
    pub store: InMemorySurveyStore,
    pub admin: FormAdminService,
    pub aggregator: ResponseAggregator,
    pub survey: SurveyService,
    pub auth: AuthService,
    pub state: FormsState,
}

pub(super) fn harness() -> Harness {
    let store = InMemorySurveyStore::new();
    let forms = Arc::new(store.clone());
    let responses = Arc::new(store.clone());

    let admin = FormAdminService::new(forms.clone(), responses.clone());
    let aggregator = ResponseAggregator::new(forms, responses.clone());
    let survey = SurveyService::new(
        admin.clone(),
        aggregator.clone(),
        Arc::new(SyncDispatcher::disabled()),
    );
    let auth = AuthService::new(
        Arc::new(store.clone()),
        &AuthConfig {
            jwt_secret: "forms-test-secret".to_string(),
            token_ttl_hours: 1,
            admin_email: None,
            admin_password: None,
        },
    );
    auth.seed_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
        .expect("admin seeded");

    let state = FormsState {
        admin: admin.clone(),
        survey: survey.clone(),
        analytics: AnalyticsService::new(admin.clone(), responses),
        properties: Arc::new(PropertyCatalog::new(
            Arc::new(CrmAccounts::new()),
            std::time::Duration::from_secs(300),
        )),
        crm_accounts: Arc::new(vec!["minimal".to_string(), "hoomy".to_string()]),
    };

    Harness {
        store,
        admin,
        aggregator,
        survey,
        auth,
        state,
    }
}

impl Harness {
    pub fn app(&self) -> Router {
        public_router(self.state.clone())
            .merge(admin_router(self.state.clone(), self.auth.clone()))
            .merge(auth_router(self.auth.clone()))
    }

    pub fn token(&self) -> String {
        let user = self
            .auth
            .seed_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .expect("admin present");
        self.auth.issue_token(&user).expect("token issued")
    }

    pub fn form(&self, name: &str) -> Form {
        self.admin
            .create_form(NewForm {
                name: name.to_string(),
                ..NewForm::default()
            })
            .expect("form created")
    }

    pub fn step(&self, form_id: &FormId, order: u32) -> Step {
        self.admin
            .create_step(NewStep {
                form_id: form_id.clone(),
                order,
                name: format!("Step {order}"),
                description: None,
            })
            .expect("step created")
    }

    pub fn question(&self, step: &Step, order: u32, parent: Option<(&QuestionId, &str)>) -> Question {
        self.admin
            .create_question(NewQuestion {
                step_id: step.id.clone(),
                order,
                text: format!("Question {order}"),
                question_type: QuestionType::Dropdown,
                options: Some(vec!["yes".to_string(), "no".to_string()]),
                is_required: false,
                crm_property: format!("property_{order}"),
                parent_question_id: parent.map(|(id, _)| id.clone()),
                condition_value: parent.map(|(_, value)| AnswerValue::from(value)),
                category: None,
            })
            .expect("question created")
    }

    /// Published form "F" with steps ordered 1 and 2, one question each.
    pub fn two_step_form(&self) -> (Form, Question, Question) {
        let form = self.form("F");
        let first = self.step(&form.id, 1);
        let second = self.step(&form.id, 2);
        let q1 = self.question(&first, 1, None);
        let q2 = self.question(&second, 1, None);
        let form = self.admin.publish_form(&form.id).expect("published");
        (form, q1, q2)
    }
}

pub(super) fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("serializable body")))
        .expect("request builds")
}

pub(super) fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request builds")
}

pub(super) async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
