//! C7 — Model Operations: pull/remove/list models across instances, with
//! gateway side-effects.
//!
//! Grounded on `original_source/llm_deploy/model_manager.py`. The spec §9
//! open question ("`remove` duplication") is resolved here: there is
//! exactly one `remove` path, `gateway.remove_by_id` then `worker.delete`.

use crate::error::{FleetError, FleetResult};
use crate::gateway::GatewayClient;
use crate::registry::InstanceRegistry;
use crate::types::{Instance, ProgressEvent, WorkerModel};
use crate::worker::WorkerClient;
use futures::StreamExt;

/// Pulls `model` onto the instance addressed by `instance_id`, streaming
/// progress events to `on_event` as they arrive. On the terminal
/// `Success` event, registers `(model, endpoint)` with the gateway.
///
/// Fails if the registry has no endpoint recorded for `instance_id`
/// (spec §4.7).
pub async fn pull(
    registry: &InstanceRegistry,
    gateway: &GatewayClient,
    http: reqwest::Client,
    instance_id: u64,
    model: &str,
    mut on_event: impl FnMut(&ProgressEvent),
) -> FleetResult<()> {
    let record = registry
        .get(instance_id)
        .filter(|r| !r.endpoint.is_empty())
        .ok_or(FleetError::EndpointUnresolved { instance_id })?;
    let endpoint = record.endpoint.clone();

    let worker = WorkerClient::new(http, endpoint.clone());
    let mut stream = worker.pull(model);
    let mut succeeded = false;

    while let Some(event) = stream.next().await {
        let event = event?;
        on_event(&event);
        match &event {
            ProgressEvent::Success => succeeded = true,
            ProgressEvent::Error { msg } => {
                return Err(FleetError::Worker(format!("pull of '{model}' failed: {msg}")));
            }
            _ => {}
        }
    }

    if succeeded {
        gateway.add(model, &endpoint).await;
    }
    Ok(())
}

/// Removes `model` from the instance addressed by `instance_id`:
/// deregisters it from the gateway, then deletes it from the worker.
pub async fn remove(
    registry: &InstanceRegistry,
    gateway: &GatewayClient,
    http: reqwest::Client,
    instance_id: u64,
    model: &str,
) -> FleetResult<bool> {
    let record = registry
        .get(instance_id)
        .filter(|r| !r.endpoint.is_empty())
        .ok_or(FleetError::EndpointUnresolved { instance_id })?;
    let endpoint = record.endpoint.clone();

    gateway.remove_by_id(model).await;
    let worker = WorkerClient::new(http, endpoint);
    worker.delete(model).await
}

/// Runs the worker's `test` probe for `model` on the instance addressed
/// by `instance_id`, the way `original_source/llm_deploy/app_logic.py`'s
/// `run_model` follows a successful pull with `test_model`.
pub async fn test(
    registry: &InstanceRegistry,
    http: reqwest::Client,
    instance_id: u64,
    model: &str,
) -> FleetResult<bool> {
    let record = registry
        .get(instance_id)
        .filter(|r| !r.endpoint.is_empty())
        .ok_or(FleetError::EndpointUnresolved { instance_id })?;
    let worker = WorkerClient::new(http, record.endpoint.clone());
    worker.test(model).await
}

/// Lists the models resident on every live instance with a resolved
/// endpoint, decorating each entry with its `instance_id`. A failure
/// listing one instance is swallowed — that instance is simply skipped
/// from the aggregate (spec §7, `WorkerError` disposition for `list`).
pub async fn list_all(
    http: reqwest::Client,
    instances: &[Instance],
    registry: &InstanceRegistry,
) -> Vec<WorkerModel> {
    let mut models = Vec::new();
    for instance in instances {
        let Some(record) = registry.get(instance.id) else {
            continue;
        };
        if record.endpoint.is_empty() {
            continue;
        }
        let worker = WorkerClient::new(http.clone(), record.endpoint.clone());
        let Ok(entries) = worker.list().await else {
            tracing::warn!(instance_id = instance.id, "worker list failed, skipping instance");
            continue;
        };
        for entry in entries {
            let name = entry.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let size = entry.get("size").and_then(|v| v.as_u64()).unwrap_or(0);
            models.push(WorkerModel {
                name,
                size,
                instance_id: Some(instance.id),
            });
        }
    }
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegistryRecord;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn pull_success_registers_with_gateway() {
        let worker_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"status\":\"pulling manifest\"}\n{\"status\":\"success\"}\n",
            ))
            .mount(&worker_server)
            .await;

        let gateway_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&gateway_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut registry = InstanceRegistry::load(dir.path().join("state.json")).unwrap();
        registry
            .put(
                1,
                RegistryRecord {
                    endpoint: worker_server.uri(),
                },
            )
            .unwrap();

        let gateway = GatewayClient::new(gateway_server.uri());
        let mut events = Vec::new();
        pull(&registry, &gateway, reqwest::Client::new(), 1, "llama3-8b:q4_k_m", |e| {
            events.push(e.clone())
        })
        .await
        .unwrap();

        assert!(events.contains(&ProgressEvent::Success));
        let received = gateway_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
    }

    #[tokio::test]
    async fn pull_without_registered_endpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::load(dir.path().join("state.json")).unwrap();
        let gateway = GatewayClient::new("http://localhost:4000");
        let err = pull(&registry, &gateway, reqwest::Client::new(), 99, "m", |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::EndpointUnresolved { instance_id: 99 }));
    }

    #[tokio::test]
    async fn test_reports_done_flag_from_final_chunk() {
        let worker_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"response\":\"The \",\"done\":false}\n{\"response\":\"president.\",\"done\":true}\n"),
            )
            .mount(&worker_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut registry = InstanceRegistry::load(dir.path().join("state.json")).unwrap();
        registry
            .put(
                1,
                RegistryRecord {
                    endpoint: worker_server.uri(),
                },
            )
            .unwrap();

        let ok = test(&registry, reqwest::Client::new(), 1, "llama3-8b:q4_k_m").await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_without_registered_endpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstanceRegistry::load(dir.path().join("state.json")).unwrap();
        let err = test(&registry, reqwest::Client::new(), 99, "m").await.unwrap_err();
        assert!(matches!(err, FleetError::EndpointUnresolved { instance_id: 99 }));
    }

    #[tokio::test]
    async fn remove_deregisters_then_deletes() {
        let worker_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&worker_server)
            .await;

        let gateway_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model/delete"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&gateway_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut registry = InstanceRegistry::load(dir.path().join("state.json")).unwrap();
        registry
            .put(
                5,
                RegistryRecord {
                    endpoint: worker_server.uri(),
                },
            )
            .unwrap();

        let gateway = GatewayClient::new(gateway_server.uri());
        let ok = remove(&registry, &gateway, reqwest::Client::new(), 5, "llama3-8b:q4_k_m")
            .await
            .unwrap();
        assert!(ok);
    }
}
