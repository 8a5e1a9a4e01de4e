//! Error taxonomy, per spec §7.

use thiserror::Error;

/// The single error enum every component surfaces structured failures
/// through. Dispositions (retry, compensate, surface, log-and-continue)
/// are implemented by the caller, not encoded in the variant itself.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("marketplace request failed: {0}")]
    Marketplace(String),

    #[error("provisioning timed out after {attempts} attempts")]
    ProvisioningTimeout { attempts: u32 },

    #[error("endpoint could not be resolved for instance {instance_id}")]
    EndpointUnresolved { instance_id: u64 },

    #[error("worker request failed: {0}")]
    Worker(String),

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("registry I/O error: {0}")]
    StateIo(#[from] std::io::Error),

    #[error("failed to (de)serialize state: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type FleetResult<T> = Result<T, FleetError>;
