use std::sync::Arc;

use serde_json::json;
use survey_forms::config::CrmAccountConfig;
use survey_forms::forms::{
    Answer, AnswerValue, FormAdminService, NewForm, NewQuestion, NewStep, QuestionType,
    ResponseAggregator, SubmissionRequest, SurveyService,
};
use survey_forms::sync::{CrmAccounts, SyncDispatcher, SyncTargets};
use survey_forms::InMemorySurveyStore;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    admin: FormAdminService,
    survey: SurveyService,
    dispatcher: Arc<SyncDispatcher>,
}

fn fixture(crm_base_url: &str) -> Fixture {
    let store = InMemorySurveyStore::new();
    let admin = FormAdminService::new(Arc::new(store.clone()), Arc::new(store.clone()));
    let aggregator = ResponseAggregator::new(Arc::new(store.clone()), Arc::new(store));

    let crm = CrmAccounts::from_configs(&[CrmAccountConfig {
        name: "minimal".to_string(),
        base_url: crm_base_url.to_string(),
        contacts_token: "contacts-token".to_string(),
        deals_token: String::new(),
        search_token: String::new(),
    }])
    .expect("crm client builds");
    let dispatcher = Arc::new(SyncDispatcher::start(SyncTargets {
        crm: Arc::new(crm),
        sheets: None,
    }));
    let survey = SurveyService::new(admin.clone(), aggregator, dispatcher.clone());

    Fixture {
        admin,
        survey,
        dispatcher,
    }
}

fn question(step_id: &survey_forms::forms::StepId, order: u32, property: &str) -> NewQuestion {
    NewQuestion {
        step_id: step_id.clone(),
        order,
        text: format!("Question {order}"),
        question_type: QuestionType::Checkbox,
        options: Some(vec!["Blue".to_string(), "Green".to_string()]),
        is_required: false,
        crm_property: property.to_string(),
        parent_question_id: None,
        condition_value: None,
        category: None,
    }
}

#[tokio::test]
async fn completed_submission_syncs_mapped_answers_to_new_contact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts/search"))
        .and(header("authorization", "Bearer contacts-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts"))
        .and(body_partial_json(json!({ "properties": { "email": "ada@example.com" } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "901" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/crm/v3/objects/contacts/901"))
        .and(body_partial_json(json!({
            "properties": { "favourite_colours": "Blue, Green" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "901" })))
        .expect(1)
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    let form = fx
        .admin
        .create_form(NewForm {
            name: "Colours".to_string(),
            ..NewForm::default()
        })
        .expect("form created");
    let step = fx
        .admin
        .create_step(NewStep {
            form_id: form.id.clone(),
            order: 1,
            name: "Only step".to_string(),
            description: None,
        })
        .expect("step created");
    let mapped = fx
        .admin
        .create_question(question(&step.id, 1, "favourite_colours"))
        .expect("mapped question");
    let unmapped = fx
        .admin
        .create_question(question(&step.id, 2, ""))
        .expect("unmapped question");
    fx.admin.publish_form(&form.id).expect("published");

    let receipt = fx
        .survey
        .submit(SubmissionRequest {
            email: " ada@example.com ".to_string(),
            form_id: form.id.clone(),
            step_number: 1,
            responses: vec![
                Answer::new(
                    mapped.id.clone(),
                    AnswerValue::Multiple(vec!["Blue".to_string(), "Green".to_string()]),
                ),
                Answer::new(unmapped.id.clone(), "ignored"),
            ],
            target_id: None,
        })
        .expect("submission accepted");
    assert!(receipt.success);
    assert!(receipt.is_completed);

    fx.dispatcher.shutdown().await;
    server.verify().await;
}

#[tokio::test]
async fn crm_outage_does_not_fail_the_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let fx = fixture(&server.uri());
    let form = fx
        .admin
        .create_form(NewForm {
            name: "Outage".to_string(),
            ..NewForm::default()
        })
        .expect("form created");
    let step = fx
        .admin
        .create_step(NewStep {
            form_id: form.id.clone(),
            order: 1,
            name: "Only step".to_string(),
            description: None,
        })
        .expect("step created");
    let mapped = fx
        .admin
        .create_question(question(&step.id, 1, "favourite_colours"))
        .expect("mapped question");

    let receipt = fx
        .survey
        .submit(SubmissionRequest {
            email: "grace@example.com".to_string(),
            form_id: form.id.clone(),
            step_number: 1,
            responses: vec![Answer::new(mapped.id.clone(), "Blue")],
            target_id: None,
        })
        .expect("submission accepted despite crm failure");
    assert!(receipt.is_completed);

    fx.dispatcher.shutdown().await;
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
}
