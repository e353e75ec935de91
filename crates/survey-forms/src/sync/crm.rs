use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::http::send_with_rate_limit_retry;
use super::CrmObjectType;
use crate::config::CrmAccountConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Property schema entry shown in the admin mapping UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmProperty {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub property_type: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_object_type")]
    pub object_type: CrmObjectType,
}

fn default_object_type() -> CrmObjectType {
    CrmObjectType::Contact
}

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("crm account '{0}' is not configured")]
    NotConfigured(String),
    #[error("crm transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("crm responded with {status}: {body}")]
    Status { status: u16, body: String },
}

/// Outbound CRM operations used by the sync jobs and property catalog.
#[async_trait]
pub trait CrmGateway: Debug + Send + Sync {
    /// Id of the contact holding `email`, creating one when none exists.
    async fn find_or_create_contact(&self, email: &str) -> Result<String, CrmError>;
    async fn update_properties(
        &self,
        object_type: CrmObjectType,
        object_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), CrmError>;
    async fn list_properties(&self, object_type: CrmObjectType)
        -> Result<Vec<CrmProperty>, CrmError>;
}

/// HubSpot CRM v3 client for one account. Each object family has its own
/// private-app token; missing ones fall back to the first token configured.
pub struct HubSpotClient {
    http: reqwest::Client,
    base_url: String,
    contacts_token: String,
    deals_token: String,
    search_token: String,
}

impl Debug for HubSpotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubSpotClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<ObjectRef>,
}

#[derive(Debug, Deserialize)]
struct PropertyResults {
    #[serde(default)]
    results: Vec<CrmProperty>,
}

impl HubSpotClient {
    pub fn new(config: &CrmAccountConfig) -> Result<Self, CrmError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let primary = [&config.contacts_token, &config.search_token, &config.deals_token]
            .into_iter()
            .find(|token| !token.is_empty())
            .cloned()
            .unwrap_or_default();
        let fallback = |token: &str| {
            if token.is_empty() {
                primary.clone()
            } else {
                token.to_string()
            }
        };

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            contacts_token: fallback(&config.contacts_token),
            deals_token: fallback(&config.deals_token),
            search_token: fallback(&config.search_token),
        })
    }

    fn token_for(&self, object_type: CrmObjectType) -> &str {
        match object_type {
            CrmObjectType::Contact => &self.contacts_token,
            CrmObjectType::Deal => &self.deals_token,
        }
    }

    async fn search_contact(&self, email: &str) -> Result<Option<String>, CrmError> {
        let url = format!("{}/crm/v3/objects/contacts/search", self.base_url);
        let body = json!({
            "filterGroups": [{
                "filters": [{ "propertyName": "email", "operator": "EQ", "value": email }]
            }],
            "properties": ["email"],
            "limit": 1,
        });

        let response = send_with_rate_limit_retry(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.search_token)
                .json(&body)
        })
        .await?;
        let found: SearchResults = ensure_success(response).await?.json().await?;
        Ok(found.results.into_iter().next().map(|contact| contact.id))
    }

    async fn create_contact(&self, email: &str) -> Result<String, CrmError> {
        let url = format!("{}/crm/v3/objects/contacts", self.base_url);
        let body = json!({ "properties": { "email": email } });

        let response = send_with_rate_limit_retry(|| {
            self.http
                .post(&url)
                .bearer_auth(&self.contacts_token)
                .json(&body)
        })
        .await?;
        let created: ObjectRef = ensure_success(response).await?.json().await?;
        Ok(created.id)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CrmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CrmError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CrmGateway for HubSpotClient {
    async fn find_or_create_contact(&self, email: &str) -> Result<String, CrmError> {
        if let Some(id) = self.search_contact(email).await? {
            return Ok(id);
        }
        let id = self.create_contact(email).await?;
        tracing::info!(contact_id = %id, "crm contact created");
        Ok(id)
    }

    async fn update_properties(
        &self,
        object_type: CrmObjectType,
        object_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), CrmError> {
        let url = format!(
            "{}/crm/v3/objects/{}/{}",
            self.base_url,
            object_type.api_path(),
            object_id
        );
        let body = json!({ "properties": properties });
        let token = self.token_for(object_type);

        let response =
            send_with_rate_limit_retry(|| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn list_properties(
        &self,
        object_type: CrmObjectType,
    ) -> Result<Vec<CrmProperty>, CrmError> {
        let url = format!(
            "{}/crm/v3/properties/{}",
            self.base_url,
            object_type.api_path()
        );

        let response = send_with_rate_limit_retry(|| {
            self.http.get(&url).bearer_auth(&self.search_token)
        })
        .await?;
        let listed: PropertyResults = ensure_success(response).await?.json().await?;
        Ok(listed
            .results
            .into_iter()
            .map(|property| CrmProperty {
                object_type,
                ..property
            })
            .collect())
    }
}

/// Gateways per CRM account, built once at start-up. Accounts without tokens
/// are left out.
#[derive(Debug, Clone, Default)]
pub struct CrmAccounts {
    gateways: HashMap<String, Arc<dyn CrmGateway>>,
}

impl CrmAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[CrmAccountConfig]) -> Result<Self, CrmError> {
        let mut accounts = Self::new();
        for config in configs.iter().filter(|config| config.is_configured()) {
            accounts.register(&config.name, Arc::new(HubSpotClient::new(config)?));
        }
        Ok(accounts)
    }

    pub fn register(&mut self, account: &str, gateway: Arc<dyn CrmGateway>) {
        self.gateways.insert(account.to_string(), gateway);
    }

    pub fn get(&self, account: &str) -> Option<Arc<dyn CrmGateway>> {
        self.gateways.get(account).cloned()
    }

    pub fn require(&self, account: &str) -> Result<Arc<dyn CrmGateway>, CrmError> {
        self.get(account)
            .ok_or_else(|| CrmError::NotConfigured(account.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HubSpotClient {
        HubSpotClient::new(&CrmAccountConfig {
            name: "minimal".to_string(),
            base_url: server.uri(),
            contacts_token: "contacts-token".to_string(),
            deals_token: String::new(),
            search_token: "search-token".to_string(),
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn existing_contact_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/search"))
            .and(header("authorization", "Bearer search-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "results": [{ "id": "501" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "999" })))
            .expect(0)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .find_or_create_contact("ada@example.com")
            .await
            .expect("contact resolves");
        assert_eq!(id, "501");
    }

    #[tokio::test]
    async fn missing_contact_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts"))
            .and(body_partial_json(
                json!({ "properties": { "email": "ada@example.com" } }),
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "777" })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .find_or_create_contact("ada@example.com")
            .await
            .expect("contact created");
        assert_eq!(id, "777");
    }

    #[tokio::test]
    async fn deal_updates_fall_back_to_contacts_token() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/crm/v3/objects/deals/42"))
            .and(header("authorization", "Bearer contacts-token"))
            .and(body_partial_json(json!({ "properties": { "plan": "pro" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "42" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut properties = BTreeMap::new();
        properties.insert("plan".to_string(), "pro".to_string());
        client_for(&server)
            .update_properties(CrmObjectType::Deal, "42", &properties)
            .await
            .expect("deal updated");
    }

    #[tokio::test]
    async fn error_statuses_surface_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/properties/contacts"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .list_properties(CrmObjectType::Contact)
            .await
            .expect_err("unauthorized");
        match err {
            CrmError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn listed_properties_are_tagged_with_object_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/properties/deals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "name": "amount", "label": "Amount", "type": "number", "fieldType": "number" }]
            })))
            .mount(&server)
            .await;

        let properties = client_for(&server)
            .list_properties(CrmObjectType::Deal)
            .await
            .expect("properties listed");
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].object_type, CrmObjectType::Deal);
        assert_eq!(properties[0].label, "Amount");
    }
}
