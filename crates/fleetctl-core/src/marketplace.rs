//! C1 — Marketplace Client.
//!
//! Grounded on `original_source/llm_deploy/vastai.py`.

use crate::error::{FleetError, FleetResult};
use crate::types::{Instance, Offer};
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;

const LOG_FETCH_ATTEMPTS: u32 = 10;
const LOG_FETCH_DELAY_SECS: u64 = 1;

/// Parameters for `query_offers`, mirroring the filter object vast.ai's
/// `bundles/` endpoint accepts (spec §4.1 / §6).
#[derive(Debug, Clone)]
pub struct OfferQuery {
    pub gpu_ram_mb: f64,
    pub disk_gb: f64,
    pub public_ip: bool,
    pub min_gpu: u32,
    pub max_gpu: u32,
    pub min_inet_down: f64,
    pub limit: usize,
}

impl Default for OfferQuery {
    fn default() -> Self {
        OfferQuery {
            gpu_ram_mb: 0.0,
            disk_gb: 40.0,
            public_ip: true,
            min_gpu: 1,
            max_gpu: 2,
            min_inet_down: 70.0,
            limit: 10,
        }
    }
}

pub struct MarketplaceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    tunnel_re: Regex,
}

impl MarketplaceClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        MarketplaceClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            tunnel_re: Regex::new(r"https://[^\s]+\.trycloudflare\.com").expect("static regex"),
        }
    }

    pub fn vast_ai(api_key: impl Into<String>) -> Self {
        Self::new("https://console.vast.ai/api/v0/", api_key)
    }

    /// Server-side filtered, client-side refined offer query. Sort
    /// ascending by `(dph_total, total_flops)`, truncated to `limit`.
    pub async fn query_offers(&self, q: &OfferQuery) -> FleetResult<Vec<Offer>> {
        let mut body = json!({
            "reliability2": {"gte": 0.85},
            "disk_space": {"gte": q.disk_gb},
            "rentable": {"eq": true},
            "num_gpus": {"gte": q.min_gpu, "lte": q.max_gpu},
            "gpu_totalram": {"gte": q.gpu_ram_mb},
            "direct_port_count": {"gte": 1},
            "inet_down": {"gte": q.min_inet_down},
            "type": "ask",
            "sort_option": {"0": ["dph_total", "asc"], "1": ["total_flops", "asc"]},
            "order": [["dph_total", "asc"], ["total_flops", "asc"]],
            "allocated_storage": q.disk_gb,
            "cuda_max_good": {},
            "extra_ids": [],
        });
        if q.public_ip {
            body["static_ip"] = json!({"eq": true});
        }

        let url = format!("{}bundles/", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| FleetError::Marketplace(format!("query_offers request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(FleetError::Marketplace(format!(
                "query_offers returned status {}",
                resp.status()
            )));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| FleetError::Marketplace(format!("query_offers bad body: {e}")))?;

        let offers: Vec<Offer> = serde_json::from_value(payload.get("offers").cloned().unwrap_or(json!([])))
            .map_err(|e| FleetError::Marketplace(format!("query_offers bad offer shape: {e}")))?;

        let mut filtered: Vec<Offer> = offers
            .into_iter()
            .filter(|o| o.verification == "verified")
            .filter(|o| o.inet_up > 0.0 && o.inet_down > 0.0)
            .filter(|o| !q.public_ip || o.static_ip)
            .collect();

        filtered.sort_by(|a, b| {
            a.dph_total
                .partial_cmp(&b.dph_total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.total_flops.partial_cmp(&b.total_flops).unwrap_or(std::cmp::Ordering::Equal))
        });
        filtered.truncate(q.limit);
        Ok(filtered)
    }

    /// Creates an instance from an offer. Returns `None` on a non-success
    /// payload (spec §4.1).
    pub async fn create(
        &self,
        offer_id: u64,
        disk_gb: f64,
        image: &str,
        exposed_ports: &[u16],
    ) -> FleetResult<Option<u64>> {
        let env: HashMap<String, String> = exposed_ports
            .iter()
            .map(|p| (format!("-p {p}:{p}"), "1".to_string()))
            .collect();

        let url = format!("{}asks/{}/", self.base_url, offer_id);
        let resp = self
            .client
            .put(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .json(&json!({
                "client_id": "me",
                "image": image,
                "env": env,
                "runtype": "args",
                "use_jupyter_lab": false,
                "disk": disk_gb,
            }))
            .send()
            .await
            .map_err(|e| FleetError::Marketplace(format!("create request failed: {e}")))?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| FleetError::Marketplace(format!("create bad body: {e}")))?;

        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }

        Ok(payload
            .get("new_contract")
            .and_then(Value::as_u64)
            .or_else(|| payload.get("new_contract").and_then(Value::as_str).and_then(|s| s.parse().ok())))
    }

    pub async fn list(&self) -> FleetResult<Vec<Instance>> {
        let url = format!("{}instances", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FleetError::Marketplace(format!("list request failed: {e}")))?;

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| FleetError::Marketplace(format!("list bad body: {e}")))?;

        let instances = payload
            .get("instances")
            .cloned()
            .unwrap_or(payload);
        serde_json::from_value(instances)
            .map_err(|e| FleetError::Marketplace(format!("list bad instance shape: {e}")))
    }

    /// Idempotent in effect: destroying an already-gone id is not fatal.
    pub async fn destroy(&self, instance_id: u64) -> FleetResult<bool> {
        let url = format!("{}instances/{}/", self.base_url, instance_id);
        let resp = self
            .client
            .delete(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FleetError::Marketplace(format!("destroy request failed: {e}")))?;
        Ok(resp.status().is_success())
    }

    /// Two-step log fetch with retry. Terminal return on exhaustion: empty.
    pub async fn logs(&self, instance_id: u64, tail: u32) -> FleetResult<Vec<String>> {
        for attempt in 0..LOG_FETCH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(LOG_FETCH_DELAY_SECS)).await;
            }

            let request_url = format!("{}instances/request_logs/{}/", self.base_url, instance_id);
            let resp = match self
                .client
                .put(&request_url)
                .query(&[("api_key", self.api_key.as_str())])
                .json(&json!({"tail": tail.to_string()}))
                .send()
                .await
            {
                Ok(r) => r,
                Err(_) => continue,
            };

            if !resp.status().is_success() {
                continue;
            }

            let payload: Value = match resp.json().await {
                Ok(v) => v,
                Err(_) => continue,
            };

            if payload.get("success").and_then(Value::as_bool) == Some(false) {
                continue;
            }

            let Some(result_url) = payload.get("result_url").and_then(Value::as_str) else {
                continue;
            };

            let Ok(log_resp) = self.client.get(result_url).send().await else {
                continue;
            };
            if !log_resp.status().is_success() {
                continue;
            }
            let Ok(log_text) = log_resp.text().await else {
                continue;
            };
            if log_text.contains("Access Denied") {
                continue;
            }

            return Ok(log_text.lines().map(str::to_string).collect());
        }
        Ok(Vec::new())
    }

    /// Scans joined log output for the first tunnel URL.
    pub fn extract_tunnel_url(&self, logs: &[String]) -> Option<String> {
        let joined = logs.join("\n");
        self.tunnel_re.find(&joined).map(|m| m.as_str().to_string())
    }
}

impl crate::allocator::OfferSource for MarketplaceClient {
    async fn query_offers(&self, req: &OfferQuery) -> FleetResult<Vec<Offer>> {
        MarketplaceClient::query_offers(self, req).await
    }
}

impl crate::lifecycle::Marketplace for MarketplaceClient {
    async fn create(&self, offer_id: u64, disk_gb: f64, image: &str, exposed_ports: &[u16]) -> FleetResult<Option<u64>> {
        MarketplaceClient::create(self, offer_id, disk_gb, image, exposed_ports).await
    }
    async fn list(&self) -> FleetResult<Vec<Instance>> {
        MarketplaceClient::list(self).await
    }
    async fn destroy(&self, instance_id: u64) -> FleetResult<bool> {
        MarketplaceClient::destroy(self, instance_id).await
    }
    async fn logs(&self, instance_id: u64, tail: u32) -> FleetResult<Vec<String>> {
        MarketplaceClient::logs(self, instance_id, tail).await
    }
    fn extract_tunnel_url(&self, logs: &[String]) -> Option<String> {
        MarketplaceClient::extract_tunnel_url(self, logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tunnel_url_from_logs() {
        let client = MarketplaceClient::vast_ai("key");
        let logs = vec!["starting up".to_string(), "your tunnel is https://happy-otter.trycloudflare.com ready".to_string()];
        assert_eq!(
            client.extract_tunnel_url(&logs),
            Some("https://happy-otter.trycloudflare.com".to_string())
        );
    }

    #[test]
    fn no_tunnel_url_returns_none() {
        let client = MarketplaceClient::vast_ai("key");
        let logs = vec!["nothing here".to_string()];
        assert_eq!(client.extract_tunnel_url(&logs), None);
    }
}
