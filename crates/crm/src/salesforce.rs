//! Salesforce connector.
//!
//! Writes the meeting outcome as a Task upserted by external id, so the
//! idempotency token doubles as the dedupe key: re-running the same sync
//! updates the one existing record instead of creating another.

use serde_json::json;

use cs_domain::config::CrmConfig;
use cs_domain::error::{Error, Result};

use crate::traits::{status_error, CrmConnector, CrmPayload};

const API_VERSION: &str = "v59.0";

pub struct SalesforceConnector {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl SalesforceConnector {
    pub fn from_config(cfg: &CrmConfig) -> Self {
        let token = std::env::var(&cfg.salesforce_token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                env_var = %cfg.salesforce_token_env,
                "salesforce token unset — writes will fail until configured"
            );
        }
        Self {
            base_url: cfg.salesforce_base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl CrmConnector for SalesforceConnector {
    fn system(&self) -> &str {
        "salesforce"
    }

    async fn write(&self, payload: &CrmPayload) -> Result<String> {
        let token = self.token.as_ref().ok_or_else(|| {
            Error::crm(self.system(), "API token not configured", false)
        })?;

        // Upsert by external id: the token names the record, so retries
        // land on the same Task.
        let url = format!(
            "{}/services/data/{API_VERSION}/sobjects/Task/MeetingSyncToken__c/{}",
            self.base_url, payload.idempotency_token
        );

        let mut body = json!({
            "Subject": payload.subject,
            "Description": payload.description,
            "Status": "Completed",
        });
        if let Some(stage) = &payload.stage {
            body["Opportunity_Stage__c"] = json!(stage);
        }

        let resp = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::crm(self.system(), format!("request failed: {e}"), true))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(self.system(), status, &body));
        }

        #[derive(serde::Deserialize)]
        struct UpsertResponse {
            id: String,
        }
        let parsed: UpsertResponse = resp
            .json()
            .await
            .map_err(|e| Error::crm(self.system(), format!("decoding response: {e}"), false))?;
        Ok(parsed.id)
    }
}
