//! Creatio connector.
//!
//! Uses the OData activity collection; the idempotency token is stored
//! in a dedicated column and checked read-before-write.

use serde_json::json;

use cs_domain::config::CrmConfig;
use cs_domain::error::{Error, Result};

use crate::traits::{status_error, CrmConnector, CrmPayload};

pub struct CreatioConnector {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl CreatioConnector {
    pub fn from_config(cfg: &CrmConfig) -> Self {
        let token = std::env::var(&cfg.creatio_token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                env_var = %cfg.creatio_token_env,
                "creatio token unset — writes will fail until configured"
            );
        }
        Self {
            base_url: cfg.creatio_base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    async fn find_existing(&self, token: &str, sync_token: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/0/odata/Activity?$filter=MeetingSyncToken eq '{sync_token}'&$select=Id&$top=1",
            self.base_url
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::crm(self.system(), format!("lookup failed: {e}"), true))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(self.system(), status, &body));
        }

        #[derive(serde::Deserialize)]
        struct ODataResponse {
            value: Vec<ODataRow>,
        }
        #[derive(serde::Deserialize)]
        struct ODataRow {
            #[serde(rename = "Id")]
            id: String,
        }
        let parsed: ODataResponse = resp
            .json()
            .await
            .map_err(|e| Error::crm(self.system(), format!("decoding lookup: {e}"), false))?;
        Ok(parsed.value.into_iter().next().map(|row| row.id))
    }
}

#[async_trait::async_trait]
impl CrmConnector for CreatioConnector {
    fn system(&self) -> &str {
        "creatio"
    }

    async fn write(&self, payload: &CrmPayload) -> Result<String> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| Error::crm(self.system(), "API token not configured", false))?;

        if let Some(existing) = self
            .find_existing(&token, &payload.idempotency_token)
            .await?
        {
            tracing::info!(
                record_id = %existing,
                "creatio activity already exists for sync token, skipping create"
            );
            return Ok(existing);
        }

        let url = format!("{}/0/odata/Activity", self.base_url);
        let mut body = json!({
            "Title": payload.subject,
            "Notes": payload.description,
            "MeetingSyncToken": payload.idempotency_token,
        });
        if let Some(stage) = &payload.stage {
            body["OpportunityStage"] = json!(stage);
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::crm(self.system(), format!("create failed: {e}"), true))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(self.system(), status, &body));
        }

        #[derive(serde::Deserialize)]
        struct CreateResponse {
            #[serde(rename = "Id")]
            id: String,
        }
        let parsed: CreateResponse = resp
            .json()
            .await
            .map_err(|e| Error::crm(self.system(), format!("decoding create: {e}"), false))?;
        Ok(parsed.id)
    }
}
