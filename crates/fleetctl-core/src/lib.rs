//! Fleet allocation and lifecycle engine for spot-GPU LLM deployments.
//!
//! This crate contains the core control-plane logic: the marketplace,
//! worker, and gateway clients (C1–C3), the durable instance registry
//! (C4), the instance lifecycle controller (C5), the model allocator
//! (C6), model operations (C7), and the size oracle (C8). It performs no
//! inference, hosts no model storage, and is not itself a daemon — see
//! `fleetctl-cli` for the command-line surface that drives it.

pub mod allocator;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod marketplace;
pub mod model_ops;
pub mod registry;
pub mod size_oracle;
pub mod types;
pub mod worker;

pub use error::{FleetError, FleetResult};
