//! CLI command definitions using clap.

use crate::output::OutputFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// fleetctl - deploy and manage a fleet of spot-GPU LLM inference workers
#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the instance registry file
    #[arg(long, global = true, default_value = "state.json")]
    pub state: PathBuf,

    /// Output format for listing commands (`infra ls`, `infra offers`,
    /// `model ls`)
    #[arg(long = "output-format", global = true, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Access mode for a provisioned instance's inference endpoint.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum AccessArg {
    /// Expose a host port directly on the instance's public IP.
    #[default]
    Ip,
    /// Route through a Cloudflare reverse tunnel.
    Cf,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Allocate and provision every model in `llms.yaml`, registering
    /// each resulting endpoint with the gateway.
    Apply {
        /// Path to the declarative config file (discovered upward from
        /// the working directory if omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Destroy every instance in the registry's live set.
    Destroy,

    /// Provision a single instance and pull one model onto it, outside
    /// of the declarative allocator.
    Run {
        /// Wire identifier of the model to pull (e.g. `llama3-8b:q4_k_m`)
        model: String,

        /// Override the model's GPU RAM requirement, in GB (defaults to
        /// the Size Oracle's resolved size)
        #[arg(long = "gpu-memory")]
        gpu_memory_gb: Option<f64>,

        /// Override the instance's disk size, in GB
        #[arg(long)]
        disk: Option<f64>,

        /// Endpoint access mode: `ip` (public IP) or `cf` (Cloudflare tunnel)
        #[arg(long, value_enum, default_value_t = AccessArg::Ip)]
        access: AccessArg,
    },

    /// Infrastructure (instance) management
    Infra {
        #[command(subcommand)]
        action: InfraCommands,
    },

    /// Model management
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },

    /// Fetch and print an instance's remote logs
    Logs {
        /// Instance id
        id: u64,

        /// Maximum number of trailing log lines to fetch
        #[arg(long = "max-logs", default_value_t = 1000)]
        max_logs: u32,
    },
}

/// `infra` subcommands.
#[derive(Subcommand)]
pub enum InfraCommands {
    /// List live instances
    Ls,

    /// Show full detail for one instance
    Inspect {
        /// Instance id
        id: u64,
    },

    /// Provision a bare instance from a marketplace offer, without
    /// pulling any model onto it
    Create {
        /// Marketplace offer id to rent
        offer_id: u64,

        /// Disk size, in GB
        #[arg(long, default_value_t = 40.0)]
        disk: f64,

        /// Endpoint access mode: `ip` (public IP) or `cf` (Cloudflare tunnel)
        #[arg(long, value_enum, default_value_t = AccessArg::Ip)]
        access: AccessArg,
    },

    /// Destroy a single instance
    Destroy {
        /// Instance id
        id: u64,
    },

    /// Browse marketplace offers without provisioning anything
    Offers {
        /// Minimum total GPU RAM, in GB
        #[arg(long = "gpu-memory", default_value_t = 0.0)]
        gpu_memory_gb: f64,

        /// Minimum disk space, in GB
        #[arg(long, default_value_t = 40.0)]
        disk: f64,

        /// Require a static public IP
        #[arg(long)]
        public_ip: bool,

        /// Minimum inbound bandwidth, in Mbps
        #[arg(long = "min-inet-down", default_value_t = 70.0)]
        min_inet_down: f64,

        /// Maximum number of offers to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// `model` subcommands.
#[derive(Subcommand)]
pub enum ModelCommands {
    /// Pull a model onto an already-provisioned instance and register
    /// it with the gateway
    Deploy {
        /// Wire identifier of the model to pull
        model: String,

        /// Target instance id
        instance_id: u64,
    },

    /// Deregister a model from the gateway and delete it from an instance
    Remove {
        /// Wire identifier of the model to remove
        model: String,

        /// Target instance id
        instance_id: u64,
    },

    /// List every model resident across all live, addressed instances
    Ls,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn apply_with_config_path_parses() {
        let parsed = Cli::try_parse_from(["fleetctl", "apply", "--config", "llms.yaml"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn destroy_parses() {
        assert!(Cli::try_parse_from(["fleetctl", "destroy"]).is_ok());
    }

    #[test]
    fn run_with_access_cf_parses() {
        let parsed = Cli::try_parse_from(["fleetctl", "run", "llama3-8b:q4_k_m", "--access", "cf"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn infra_create_parses() {
        let parsed = Cli::try_parse_from(["fleetctl", "infra", "create", "42", "--disk", "80"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn model_deploy_parses() {
        let parsed = Cli::try_parse_from(["fleetctl", "model", "deploy", "llama3-8b:q4_k_m", "7"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn logs_with_max_logs_parses() {
        let parsed = Cli::try_parse_from(["fleetctl", "logs", "7", "--max-logs", "500"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["fleetctl"]).is_err());
    }

    #[test]
    fn output_format_defaults_to_text() {
        let parsed = Cli::try_parse_from(["fleetctl", "infra", "ls"]).unwrap();
        assert_eq!(parsed.output_format, OutputFormat::Text);
    }

    #[test]
    fn output_format_json_parses() {
        let parsed = Cli::try_parse_from(["fleetctl", "--output-format", "json", "model", "ls"]).unwrap();
        assert_eq!(parsed.output_format, OutputFormat::Json);
    }
}
