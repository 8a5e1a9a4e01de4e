//! CLI context providing access to the core engine's backend clients.

use crate::error::CliError;
use fleetctl_core::config::Secrets;
use fleetctl_core::gateway::GatewayClient;
use fleetctl_core::marketplace::MarketplaceClient;
use fleetctl_core::registry::InstanceRegistry;
use fleetctl_core::size_oracle::QuantSizeOracle;
use std::path::{Path, PathBuf};

/// Shared context for CLI commands: one construction point for every
/// backend client a command might need, built once per invocation.
pub struct FleetContext {
    pub marketplace: MarketplaceClient,
    pub gateway: GatewayClient,
    pub oracle: QuantSizeOracle,
    pub http: reqwest::Client,
    pub state_path: PathBuf,
}

impl FleetContext {
    /// Resolves secrets (vast.ai API key, gateway URL) and wires up the
    /// marketplace and gateway clients.
    pub fn new(state_path: &Path) -> Result<Self, CliError> {
        let secrets = Secrets::load().map_err(|e| CliError::ConfigError(e.to_string()))?;

        Ok(FleetContext {
            marketplace: MarketplaceClient::vast_ai(secrets.vast_api_key),
            gateway: GatewayClient::new(secrets.litellm_api_url),
            oracle: QuantSizeOracle::new(),
            http: reqwest::Client::new(),
            state_path: state_path.to_path_buf(),
        })
    }

    /// Loads the instance registry from this invocation's state path.
    pub fn registry(&self) -> Result<InstanceRegistry, CliError> {
        InstanceRegistry::load(&self.state_path).map_err(|e| CliError::StateError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_config_error() {
        // SAFETY: single-threaded test process, no concurrent env mutation.
        unsafe {
            std::env::remove_var("VAST_API_KEY");
        }
        if let Some(home) = std::env::var_os("HOME") {
            let key_file = Path::new(&home).join(".vast_api_key");
            if key_file.is_file() {
                // Can't safely assert in environments with a real key file present.
                return;
            }
        }
        let result = FleetContext::new(Path::new("state.json"));
        assert!(result.is_err());
    }
}
