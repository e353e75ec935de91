use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::http::send_with_rate_limit_retry;
use crate::config::SheetsConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("sheets transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sheets responded with {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait SheetsGateway: Debug + Send + Sync {
    async fn append_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<String>,
    ) -> Result<(), SheetsError>;
}

/// Google Sheets v4 client authenticating with an OAuth refresh token.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    token_url: String,
    api_base: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl Debug for GoogleSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

impl GoogleSheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
        })
    }

    async fn access_token(&self) -> Result<String, SheetsError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.http.post(&self.token_url).form(&params).send().await?;
        let token: AccessToken = ensure_success(response).await?.json().await?;
        Ok(token.access_token)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SheetsError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SheetsGateway for GoogleSheetsClient {
    async fn append_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<String>,
    ) -> Result<(), SheetsError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}:append",
            self.api_base, spreadsheet_id, range
        );
        let body = json!({ "values": [values] });

        let response = send_with_rate_limit_retry(|| {
            self.http
                .post(&url)
                .query(&[("valueInputOption", "USER_ENTERED")])
                .bearer_auth(&token)
                .json(&body)
        })
        .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
