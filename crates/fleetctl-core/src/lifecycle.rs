//! C5 — Instance Lifecycle Controller: the create → ready →
//! endpoint-resolved → worker-up state machine, with compensating
//! tear-down on any failure.
//!
//! Grounded on `original_source/llm_deploy/instance_manager.py` and the
//! equivalent flow in `original_source/llm_deploy/app_logic.py`.

use crate::error::{FleetError, FleetResult};
use crate::types::{AccessMode, Instance, RegistryRecord};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

const PROVISIONING_ATTEMPTS: u32 = 30;
const PROVISIONING_DELAY: Duration = Duration::from_secs(10);
const TUNNEL_ATTEMPTS: u32 = 10;
const TUNNEL_DELAY: Duration = Duration::from_secs(5);
const WORKER_READY_ATTEMPTS: u32 = 10;
const WORKER_READY_DELAY: Duration = Duration::from_secs(10);

/// The marketplace operations the controller needs. Implemented by
/// `MarketplaceClient`; tests supply a fake.
pub trait Marketplace {
    fn create(
        &self,
        offer_id: u64,
        disk_gb: f64,
        image: &str,
        exposed_ports: &[u16],
    ) -> impl Future<Output = FleetResult<Option<u64>>> + Send;
    fn list(&self) -> impl Future<Output = FleetResult<Vec<Instance>>> + Send;
    fn destroy(&self, instance_id: u64) -> impl Future<Output = FleetResult<bool>> + Send;
    fn logs(&self, instance_id: u64, tail: u32) -> impl Future<Output = FleetResult<Vec<String>>> + Send;
    fn extract_tunnel_url(&self, logs: &[String]) -> Option<String>;
}

/// Checks worker readiness at a resolved endpoint. Implemented over
/// `WorkerClient` in the CLI context; tests supply a fake.
pub trait WorkerProbe {
    fn status(&self, endpoint: &str) -> impl Future<Output = &'static str> + Send;
}

/// Removes gateway bindings for a torn-down instance. Implemented by
/// `GatewayClient`.
pub trait GatewayCompensator {
    fn remove_by_endpoint(&self, endpoint: &str) -> impl Future<Output = ()> + Send;
}

pub const PUBLIC_IP_IMAGE: &str = "ollama/ollama:latest";
pub const PUBLIC_IP_PORT: u16 = 11434;
pub const TUNNEL_IMAGE: &str = "g1ibby/ollama-cloudflared:latest";

/// Outcome of a single provisioning action.
#[derive(Debug)]
pub enum LifecycleOutcome {
    Ready { instance_id: u64, endpoint: String },
    Failed,
}

pub struct LifecycleController<'a, M, W, G> {
    marketplace: &'a M,
    worker: &'a W,
    gateway: &'a G,
}

impl<'a, M, W, G> LifecycleController<'a, M, W, G>
where
    M: Marketplace,
    W: WorkerProbe,
    G: GatewayCompensator,
{
    pub fn new(marketplace: &'a M, worker: &'a W, gateway: &'a G) -> Self {
        LifecycleController {
            marketplace,
            worker,
            gateway,
        }
    }

    /// Drives one instance from `Requested` through to `Ready` or a
    /// terminal `Failed`, running the full compensating tear-down
    /// (destroy, then gateway cleanup) on any failure path (spec §4.5).
    pub async fn provision(&self, offer_id: u64, disk_gb: f64, access: AccessMode) -> FleetResult<LifecycleOutcome> {
        let (image, ports): (&str, &[u16]) = match access {
            AccessMode::PublicIp => (PUBLIC_IP_IMAGE, &[PUBLIC_IP_PORT]),
            AccessMode::Tunnel => (TUNNEL_IMAGE, &[]),
        };

        let Some(instance_id) = self.marketplace.create(offer_id, disk_gb, image, ports).await? else {
            return Ok(LifecycleOutcome::Failed);
        };

        match self.await_provisioning(instance_id, access).await? {
            Some(endpoint) => match self.await_worker_ready(&endpoint).await {
                true => Ok(LifecycleOutcome::Ready { instance_id, endpoint }),
                false => {
                    self.tear_down(instance_id, Some(&endpoint)).await?;
                    Ok(LifecycleOutcome::Failed)
                }
            },
            None => {
                self.tear_down(instance_id, None).await?;
                Ok(LifecycleOutcome::Failed)
            }
        }
    }

    /// Polls until the instance reports `running` on all three status
    /// fields and an endpoint can be resolved, or the attempt budget is
    /// exhausted. Returns `None` on timeout or an in-band error status.
    async fn await_provisioning(&self, instance_id: u64, access: AccessMode) -> FleetResult<Option<String>> {
        for attempt in 0..PROVISIONING_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(PROVISIONING_DELAY).await;
            }
            let instances = self.marketplace.list().await?;
            let Some(instance) = instances.into_iter().find(|i| i.id == instance_id) else {
                continue;
            };
            if instance.has_error() {
                return Ok(None);
            }
            if !instance.is_running() {
                continue;
            }
            match access {
                AccessMode::PublicIp => {
                    if let Some(endpoint) = resolve_public_ip_endpoint(&instance) {
                        return Ok(Some(endpoint));
                    }
                }
                AccessMode::Tunnel => {
                    return Ok(self.await_tunnel_url(instance_id).await);
                }
            }
        }
        Ok(None)
    }

    async fn await_tunnel_url(&self, instance_id: u64) -> Option<String> {
        for attempt in 0..TUNNEL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(TUNNEL_DELAY).await;
            }
            let logs = self.marketplace.logs(instance_id, 1000).await.ok()?;
            if let Some(url) = self.marketplace.extract_tunnel_url(&logs) {
                return Some(url);
            }
        }
        None
    }

    async fn await_worker_ready(&self, endpoint: &str) -> bool {
        for attempt in 0..WORKER_READY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(WORKER_READY_DELAY).await;
            }
            if self.worker.status(endpoint).await == "running" {
                return true;
            }
        }
        false
    }

    /// The compensating action: destroy, then (if resolved) deregister
    /// gateway bindings for the endpoint, then sync the registry. Order
    /// matters — gateway bindings must never outlive the instance.
    async fn tear_down(&self, instance_id: u64, endpoint: Option<&str>) -> FleetResult<()> {
        self.marketplace.destroy(instance_id).await?;
        if let Some(endpoint) = endpoint {
            self.gateway.remove_by_endpoint(endpoint).await;
        }
        Ok(())
    }

    /// Destroys a single instance as a standalone action (used by
    /// `infra destroy` / `destroy_all`): destroy, then deregister gateway
    /// bindings for its registry-recorded endpoint, then sync.
    pub async fn destroy_instance(
        &self,
        instance_id: u64,
        record: Option<&RegistryRecord>,
    ) -> FleetResult<()> {
        self.marketplace.destroy(instance_id).await?;
        if let Some(record) = record
            && !record.endpoint.is_empty()
        {
            self.gateway.remove_by_endpoint(&record.endpoint).await;
        }
        Ok(())
    }

    /// Destroys every instance in `live_ids`, sequentially.
    pub async fn destroy_all(
        &self,
        live_ids: &HashSet<u64>,
        lookup: impl Fn(u64) -> Option<RegistryRecord>,
    ) -> FleetResult<()> {
        for &id in live_ids {
            self.destroy_instance(id, lookup(id).as_ref()).await?;
        }
        Ok(())
    }
}

/// Public-IP endpoint resolution: strip whitespace/newlines from the IP,
/// take the first port mapping's `HostPort`. Spec §4.5 allows treating a
/// bare IP (no HostPort) as not-yet-resolvable; this implementation does
/// so, matching the controller's polling contract.
fn resolve_public_ip_endpoint(instance: &Instance) -> Option<String> {
    let ip = instance.public_ipaddr.trim();
    if ip.is_empty() {
        return None;
    }
    instance
        .first_host_port()
        .map(|port| format!("http://{ip}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeMarketplace {
        instances_by_poll: Mutex<Vec<Vec<Instance>>>,
        logs_by_attempt: Mutex<Vec<Vec<String>>>,
        destroyed: Mutex<Vec<u64>>,
        created_id: u64,
    }

    impl Marketplace for FakeMarketplace {
        async fn create(&self, _offer_id: u64, _disk_gb: f64, _image: &str, _ports: &[u16]) -> FleetResult<Option<u64>> {
            Ok(Some(self.created_id))
        }
        async fn list(&self) -> FleetResult<Vec<Instance>> {
            let mut polls = self.instances_by_poll.lock().unwrap();
            if polls.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(polls.remove(0))
            }
        }
        async fn destroy(&self, instance_id: u64) -> FleetResult<bool> {
            self.destroyed.lock().unwrap().push(instance_id);
            Ok(true)
        }
        async fn logs(&self, _instance_id: u64, _tail: u32) -> FleetResult<Vec<String>> {
            let mut attempts = self.logs_by_attempt.lock().unwrap();
            if attempts.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(attempts.remove(0))
            }
        }
        fn extract_tunnel_url(&self, logs: &[String]) -> Option<String> {
            let joined = logs.join("\n");
            regex::Regex::new(r"https://[^\s]+\.trycloudflare\.com")
                .unwrap()
                .find(&joined)
                .map(|m| m.as_str().to_string())
        }
    }

    struct AlwaysRunningWorker;
    impl WorkerProbe for AlwaysRunningWorker {
        async fn status(&self, _endpoint: &str) -> &'static str {
            "running"
        }
    }

    struct NeverRunningWorker;
    impl WorkerProbe for NeverRunningWorker {
        async fn status(&self, _endpoint: &str) -> &'static str {
            "stopped"
        }
    }

    struct RecordingGateway {
        removed: Mutex<Vec<String>>,
    }
    impl GatewayCompensator for RecordingGateway {
        async fn remove_by_endpoint(&self, endpoint: &str) {
            self.removed.lock().unwrap().push(endpoint.to_string());
        }
    }

    fn running_instance(id: u64) -> Instance {
        use crate::types::PortMapping;
        use std::collections::HashMap;
        let mut ports = HashMap::new();
        ports.insert(
            "11434/tcp".to_string(),
            vec![PortMapping {
                host_port: Some("33333".to_string()),
            }],
        );
        Instance {
            id,
            actual_status: "running".into(),
            intended_status: "running".into(),
            cur_state: "running".into(),
            status_msg: String::new(),
            public_ipaddr: "1.2.3.4\n".into(),
            ports,
            start_date: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_b_provisioning_readiness() {
        let marketplace = FakeMarketplace {
            instances_by_poll: Mutex::new(vec![vec![], vec![], vec![running_instance(42)]]),
            logs_by_attempt: Mutex::new(vec![]),
            destroyed: Mutex::new(vec![]),
            created_id: 42,
        };
        let worker = AlwaysRunningWorker;
        let gateway = RecordingGateway { removed: Mutex::new(vec![]) };
        let controller = LifecycleController::new(&marketplace, &worker, &gateway);

        let outcome = controller.provision(1, 50.0, AccessMode::PublicIp).await.unwrap();
        match outcome {
            LifecycleOutcome::Ready { instance_id, endpoint } => {
                assert_eq!(instance_id, 42);
                assert_eq!(endpoint, "http://1.2.3.4:33333");
            }
            LifecycleOutcome::Failed => panic!("expected Ready"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_c_tunnel_mode_endpoint() {
        let marketplace = FakeMarketplace {
            instances_by_poll: Mutex::new(vec![vec![running_instance(7)]]),
            logs_by_attempt: Mutex::new(vec![vec![
                "your tunnel is https://happy-otter.trycloudflare.com ready".to_string(),
            ]]),
            destroyed: Mutex::new(vec![]),
            created_id: 7,
        };
        let worker = AlwaysRunningWorker;
        let gateway = RecordingGateway { removed: Mutex::new(vec![]) };
        let controller = LifecycleController::new(&marketplace, &worker, &gateway);

        let outcome = controller.provision(1, 50.0, AccessMode::Tunnel).await.unwrap();
        match outcome {
            LifecycleOutcome::Ready { endpoint, .. } => {
                assert_eq!(endpoint, "https://happy-otter.trycloudflare.com");
            }
            LifecycleOutcome::Failed => panic!("expected Ready"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_d_worker_never_ready_destroys_instance() {
        let marketplace = FakeMarketplace {
            instances_by_poll: Mutex::new(vec![vec![running_instance(9)]]),
            logs_by_attempt: Mutex::new(vec![]),
            destroyed: Mutex::new(vec![]),
            created_id: 9,
        };
        let worker = NeverRunningWorker;
        let gateway = RecordingGateway { removed: Mutex::new(vec![]) };
        let controller = LifecycleController::new(&marketplace, &worker, &gateway);

        let outcome = controller.provision(1, 50.0, AccessMode::PublicIp).await.unwrap();
        assert!(matches!(outcome, LifecycleOutcome::Failed));
        assert_eq!(*marketplace.destroyed.lock().unwrap(), vec![9]);
    }
}
