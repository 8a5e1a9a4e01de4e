//! Core data model shared by every component.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed per-model RAM overhead applied by the allocator, in megabytes.
pub const MODEL_RAM_OVERHEAD_MB: f64 = 1024.0;

/// Extra headroom, in megabytes, added on top of model sizes when sizing
/// an instance's disk.
pub const DISK_HEADROOM_MB: f64 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Low,
}

impl Priority {
    /// Ordering weight used by the allocator's sort: `high` before `low`.
    pub fn weight(self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Low => 0,
        }
    }
}

/// An entry from the user's declarative configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredModel {
    /// Human label, unique within the desired set.
    pub name: String,
    /// Wire identifier understood by the worker and the size oracle.
    pub model: String,
    pub priority: Priority,
}

/// A desired model with its size resolved by the Size Oracle, in megabytes.
#[derive(Debug, Clone)]
pub struct SizedModel {
    pub desired: DesiredModel,
    pub size_mb: f64,
}

impl SizedModel {
    pub fn consumption_mb(&self) -> f64 {
        self.size_mb + MODEL_RAM_OVERHEAD_MB
    }
}

/// A candidate machine returned by the marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: u64,
    #[serde(default)]
    pub gpu_total_ram_mb: f64,
    #[serde(default)]
    pub num_gpus: u32,
    #[serde(default)]
    pub dph_total: f64,
    #[serde(default)]
    pub total_flops: f64,
    #[serde(default)]
    pub inet_up: f64,
    #[serde(default)]
    pub inet_down: f64,
    #[serde(default)]
    pub verification: String,
    #[serde(default)]
    pub static_ip: bool,
    #[serde(default)]
    pub disk_space: f64,
}

/// A single `host_port` entry within an instance's port mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(rename = "HostPort", default)]
    pub host_port: Option<String>,
}

/// A live rented machine, as reported by the marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: u64,
    #[serde(default)]
    pub actual_status: String,
    #[serde(default)]
    pub intended_status: String,
    #[serde(default)]
    pub cur_state: String,
    #[serde(default)]
    pub status_msg: String,
    #[serde(default)]
    pub public_ipaddr: String,
    #[serde(default)]
    pub ports: HashMap<String, Vec<PortMapping>>,
    #[serde(default)]
    pub start_date: Option<f64>,
}

impl Instance {
    /// Case-insensitive comparison of the three status fields against
    /// `"running"`, treating an absent field as empty. Per spec §4.5.
    pub fn is_running(&self) -> bool {
        let eq_running = |s: &str| s.trim().eq_ignore_ascii_case("running");
        eq_running(&self.actual_status) && eq_running(&self.intended_status) && eq_running(&self.cur_state)
    }

    pub fn has_error(&self) -> bool {
        self.status_msg.to_lowercase().contains("error")
    }

    /// First port mapping's host port, if any, regardless of which
    /// container port it's keyed under.
    pub fn first_host_port(&self) -> Option<&str> {
        self.ports
            .values()
            .flat_map(|mappings| mappings.iter())
            .find_map(|m| m.host_port.as_deref())
    }
}

/// Either a direct `http://ip:port` or a tunnel URL, resolved once and
/// immutable for the instance's lifetime.
pub type Endpoint = String;

/// Access mode chosen at instance-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Expose a host port directly on the instance's public IP.
    PublicIp,
    /// Route through a reverse tunnel; endpoint is scraped from logs.
    Tunnel,
}

/// A durable registry entry, persisted as `{"endpoint": "<url>"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryRecord {
    #[serde(default)]
    pub endpoint: String,
}

/// One line of a streamed `/api/pull` response.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ManifestStart,
    LayerProgress {
        digest: String,
        total: u64,
        completed: u64,
    },
    Success,
    Error { msg: String },
    /// Any other status line the worker emits that doesn't match a
    /// reserved shape; kept so callers can still render it.
    Other { status: String },
}

/// An entry from the worker's `/api/tags` listing, decorated with the
/// instance it came from once aggregated by C7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub instance_id: Option<u64>,
}

/// A `(model_name, endpoint)` pair as published to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayBinding {
    pub id: String,
    pub model_name: String,
    pub api_base: String,
}

/// Output of the allocator: per-machine placement, retaining the chosen
/// `Offer` so the caller can size the instance's disk correctly.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub offer: Offer,
    pub models: Vec<SizedModel>,
}

impl Allocation {
    pub fn disk_gb(&self) -> f64 {
        let total_mb: f64 = self.models.iter().map(|m| m.size_mb).sum();
        (total_mb + DISK_HEADROOM_MB) / 1024.0
    }
}
