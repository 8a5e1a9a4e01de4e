//! C3 — Gateway Client: registers/deregisters `(model_name, endpoint)`
//! bindings with the routing gateway.
//!
//! Wire contract from spec §6 (authoritative); concept (dedup by
//! endpoint, remove-by-api_base as a compensating action) grounded on
//! `original_source/llm_deploy/litellm.py`.

use crate::error::FleetError;
use crate::types::GatewayBinding;
use serde_json::{Value, json};

pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        GatewayClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Registers a binding. Connection failure is logged and swallowed —
    /// the controller still wants to report the instance as created
    /// (spec §4.3 / §7 `GatewayUnavailable` disposition).
    pub async fn add(&self, model_name: &str, endpoint: &str) {
        let url = format!("{}/model/new", self.base_url);
        let body = json!({
            "model_name": model_name,
            "litellm_params": {"model": model_name, "api_base": endpoint},
            "model_info": {"id": format!("{model_name}:{endpoint}")},
        });
        if let Err(e) = self.client.post(&url).json(&body).send().await {
            tracing::warn!(error = %e, model_name, endpoint, "gateway add failed, continuing");
        }
    }

    pub async fn list(&self) -> Result<Vec<GatewayBinding>, FleetError> {
        let url = format!("{}/model/info", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FleetError::GatewayUnavailable(e.to_string()))?;
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| FleetError::GatewayUnavailable(e.to_string()))?;

        let entries = payload.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let model_name = entry.get("model_name")?.as_str()?.to_string();
                let model_info = entry.get("model_info")?;
                let id = model_info.get("id")?.as_str()?.to_string();
                let api_base = entry
                    .get("litellm_params")
                    .and_then(|p| p.get("api_base"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(GatewayBinding {
                    id,
                    model_name,
                    api_base,
                })
            })
            .collect())
    }

    /// Non-fatal: the local destroy still proceeds even if this fails.
    pub async fn remove_by_id(&self, id: &str) {
        let url = format!("{}/model/delete", self.base_url);
        if let Err(e) = self.client.post(&url).json(&json!({"id": id})).send().await {
            tracing::warn!(error = %e, id, "gateway remove_by_id failed, continuing");
        }
    }

    /// Removes every entry whose `api_base` equals `endpoint`. Used as the
    /// compensating action during instance destroy (spec §4.5).
    pub async fn remove_by_endpoint(&self, endpoint: &str) {
        let bindings = match self.list().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, endpoint, "gateway list failed during remove_by_endpoint");
                return;
            }
        };
        for binding in bindings.into_iter().filter(|b| b.api_base == endpoint) {
            self.remove_by_id(&binding.id).await;
        }
    }
}

impl crate::lifecycle::GatewayCompensator for GatewayClient {
    async fn remove_by_endpoint(&self, endpoint: &str) {
        GatewayClient::remove_by_endpoint(self, endpoint).await
    }
}
