//! HubSpot connector.
//!
//! HubSpot's notes API has no external-id upsert, so idempotency is a
//! dedupe read-before-write: search for a note carrying the token, create
//! only when absent.

use serde_json::json;

use cs_domain::config::CrmConfig;
use cs_domain::error::{Error, Result};

use crate::traits::{status_error, CrmConnector, CrmPayload};

pub struct HubSpotConnector {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HubSpotConnector {
    pub fn from_config(cfg: &CrmConfig) -> Self {
        let token = std::env::var(&cfg.hubspot_token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                env_var = %cfg.hubspot_token_env,
                "hubspot token unset — writes will fail until configured"
            );
        }
        Self {
            base_url: cfg.hubspot_base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Look up an existing note by sync token. `Ok(None)` means no
    /// earlier write landed.
    async fn find_existing(&self, token: &str, sync_token: &str) -> Result<Option<String>> {
        let url = format!("{}/crm/v3/objects/notes/search", self.base_url);
        let body = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": "meeting_sync_token",
                    "operator": "EQ",
                    "value": sync_token,
                }]
            }],
            "limit": 1,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::crm(self.system(), format!("search failed: {e}"), true))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(self.system(), status, &body));
        }

        #[derive(serde::Deserialize)]
        struct SearchResponse {
            results: Vec<SearchHit>,
        }
        #[derive(serde::Deserialize)]
        struct SearchHit {
            id: String,
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::crm(self.system(), format!("decoding search: {e}"), false))?;
        Ok(parsed.results.into_iter().next().map(|hit| hit.id))
    }
}

#[async_trait::async_trait]
impl CrmConnector for HubSpotConnector {
    fn system(&self) -> &str {
        "hubspot"
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
                "hubspot note already exists for sync token, skipping create"
            );
            return Ok(existing);
        }

        let url = format!("{}/crm/v3/objects/notes", self.base_url);
        let mut note_body = payload.description.clone();
        if let Some(stage) = &payload.stage {
            note_body.push_str(&format!("\n\nSuggested deal stage: {stage}"));
        }
        let body = json!({
            "properties": {
                "hs_note_body": note_body,
                "meeting_sync_token": payload.idempotency_token,
            }
        });

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
            id: String,
        }
        let parsed: CreateResponse = resp
            .json()
            .await
            .map_err(|e| Error::crm(self.system(), format!("decoding create: {e}"), false))?;
        Ok(parsed.id)
    }
}
