//! C2 — Worker Client: a thin typed wrapper around the inference server
//! exposed at a provisioned instance's endpoint.
//!
//! Grounded on `original_source/llm_deploy/ollama.py`. The line-buffered
//! streaming technique for `pull` follows
//! `mofa-foundation::llm::anthropic::parse_anthropic_sse`'s use of
//! `futures::stream::unfold` over `resp.chunk()`.

use crate::error::{FleetError, FleetResult};
use crate::types::ProgressEvent;
use futures::Stream;
use serde_json::{Value, json};

pub struct WorkerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl WorkerClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        WorkerClient {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// `GET /` liveness probe. Transport error yields `"unknown"` rather
    /// than propagating, per spec §4.2.
    pub async fn status(&self) -> &'static str {
        match self.client.get(&self.endpoint).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) if body.trim() == "Ollama is running" => "running",
                Ok(_) => "stopped",
                Err(_) => "unknown",
            },
            Err(_) => "unknown",
        }
    }

    /// Streams `/api/pull` as a lazy finite sequence of `ProgressEvent`.
    /// A non-200 response synthesises a single `Error` event rather than
    /// iterating a body.
    pub fn pull(&self, model: &str) -> impl Stream<Item = FleetResult<ProgressEvent>> + '_ {
        let url = format!("{}/api/pull", self.endpoint);
        let body = json!({"name": model});
        let client = self.client.clone();

        Box::pin(futures::stream::unfold(
            PullState::Start { client, url, body },
            |state| async move { advance_pull(state).await },
        ))
    }

    pub async fn list(&self) -> FleetResult<Vec<Value>> {
        let url = format!("{}/api/tags", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FleetError::Worker(format!("list request failed: {e}")))?;
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| FleetError::Worker(format!("list bad body: {e}")))?;
        Ok(payload
            .get("models")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Streams `/api/generate`, returning the last observed `done` flag.
    pub async fn test(&self, model: &str) -> FleetResult<bool> {
        let url = format!("{}/api/generate", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&json!({"model": model, "prompt": "Who is the president of the United States?"}))
            .send()
            .await
            .map_err(|e| FleetError::Worker(format!("test request failed: {e}")))?;

        if !resp.status().is_success() {
            return Ok(false);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FleetError::Worker(format!("test bad body: {e}")))?;

        let mut last_done = false;
        for line in body.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(v) = serde_json::from_str::<Value>(line)
                && let Some(done) = v.get("done").and_then(Value::as_bool)
            {
                last_done = done;
            }
        }
        Ok(last_done)
    }

    pub async fn delete(&self, model: &str) -> FleetResult<bool> {
        let url = format!("{}/api/delete", self.endpoint);
        let resp = self
            .client
            .delete(&url)
            .json(&json!({"name": model}))
            .send()
            .await
            .map_err(|e| FleetError::Worker(format!("delete request failed: {e}")))?;
        Ok(resp.status().as_u16() == 200)
    }
}

/// Adapts the worker client to the lifecycle controller's `WorkerProbe`
/// contract, which checks readiness at an endpoint it doesn't otherwise
/// hold a `WorkerClient` for.
pub struct WorkerStatusProbe {
    pub http: reqwest::Client,
}

impl crate::lifecycle::WorkerProbe for WorkerStatusProbe {
    async fn status(&self, endpoint: &str) -> &'static str {
        WorkerClient::new(self.http.clone(), endpoint).status().await
    }
}

enum PullState {
    Start {
        client: reqwest::Client,
        url: String,
        body: Value,
    },
    Streaming {
        resp: reqwest::Response,
        buf: String,
    },
    Done,
}

async fn advance_pull(state: PullState) -> Option<(FleetResult<ProgressEvent>, PullState)> {
    match state {
        PullState::Start { client, url, body } => {
            let resp = match client.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    return Some((
                        Err(FleetError::Worker(format!("pull request failed: {e}"))),
                        PullState::Done,
                    ));
                }
            };

            if !resp.status().is_success() {
                let status = resp.status();
                let msg = resp.text().await.unwrap_or_default();
                let event = ProgressEvent::Error {
                    msg: if msg.is_empty() {
                        format!("pull failed with status {status}")
                    } else {
                        msg
                    },
                };
                return Some((Ok(event), PullState::Done));
            }

            stream_step(resp, String::new()).await
        }
        PullState::Streaming { resp, buf } => stream_step(resp, buf).await,
        PullState::Done => None,
    }
}

async fn stream_step(
    mut resp: reqwest::Response,
    mut buf: String,
) -> Option<(FleetResult<ProgressEvent>, PullState)> {
    loop {
        if let Some(pos) = buf.find('\n') {
            let line: String = buf.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Some((parse_pull_line(line), PullState::Streaming { resp, buf }));
        }

        match resp.chunk().await {
            Ok(Some(bytes)) => {
                buf.push_str(&String::from_utf8_lossy(&bytes));
            }
            Ok(None) => {
                let rest = buf.trim().to_string();
                if rest.is_empty() {
                    return None;
                }
                return Some((parse_pull_line(&rest), PullState::Done));
            }
            Err(e) => {
                return Some((
                    Err(FleetError::Worker(format!("pull stream error: {e}"))),
                    PullState::Done,
                ));
            }
        }
    }
}

fn parse_pull_line(line: &str) -> FleetResult<ProgressEvent> {
    let v: Value = serde_json::from_str(line)
        .map_err(|e| FleetError::Worker(format!("malformed pull progress line: {e}")))?;

    if let Some(msg) = v.get("error").and_then(Value::as_str) {
        return Ok(ProgressEvent::Error { msg: msg.to_string() });
    }

    let status = v.get("status").and_then(Value::as_str).unwrap_or_default();
    Ok(match status {
        "pulling manifest" => ProgressEvent::ManifestStart,
        "success" => ProgressEvent::Success,
        _ if v.get("digest").is_some() => ProgressEvent::LayerProgress {
            digest: v.get("digest").and_then(Value::as_str).unwrap_or_default().to_string(),
            total: v.get("total").and_then(Value::as_u64).unwrap_or(0),
            completed: v.get("completed").and_then(Value::as_u64).unwrap_or(0),
        },
        other => ProgressEvent::Other {
            status: other.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_start() {
        let ev = parse_pull_line(r#"{"status":"pulling manifest"}"#).unwrap();
        assert_eq!(ev, ProgressEvent::ManifestStart);
    }

    #[test]
    fn parses_layer_progress() {
        let ev = parse_pull_line(
            r#"{"status":"sha256:abc","digest":"sha256:abc","total":100,"completed":50}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ProgressEvent::LayerProgress {
                digest: "sha256:abc".to_string(),
                total: 100,
                completed: 50
            }
        );
    }

    #[test]
    fn parses_success() {
        let ev = parse_pull_line(r#"{"status":"success"}"#).unwrap();
        assert_eq!(ev, ProgressEvent::Success);
    }

    #[test]
    fn parses_inline_error() {
        let ev = parse_pull_line(r#"{"error":"model not found"}"#).unwrap();
        assert_eq!(
            ev,
            ProgressEvent::Error {
                msg: "model not found".to_string()
            }
        );
    }
}
