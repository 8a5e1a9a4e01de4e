//! `fleetctl apply` — the declarative path: allocate every model in
//! `llms.yaml` onto marketplace offers, provision, pull, and register
//! with the gateway.

use crate::commands::render_pull_progress;
use crate::context::FleetContext;
use crate::error::CliError;
use crate::output::ProgressBar;
use colored::Colorize;
use fleetctl_core::allocator::allocate_models;
use fleetctl_core::config::FleetConfig;
use fleetctl_core::lifecycle::{LifecycleController, LifecycleOutcome};
use fleetctl_core::model_ops;
use fleetctl_core::types::{AccessMode, RegistryRecord};
use fleetctl_core::worker::WorkerStatusProbe;
use std::collections::HashSet;
use std::path::PathBuf;

pub async fn run(ctx: &FleetContext, config: Option<PathBuf>) -> Result<(), CliError> {
    let config_path = match config {
        Some(p) => p,
        None => {
            let cwd = crate::utils::current_dir()?;
            FleetConfig::discover(&cwd, "llms.yaml").ok_or_else(|| {
                CliError::ConfigError("no llms.yaml found in this directory or any parent".into())
            })?
        }
    };
    let desired = FleetConfig::load(&config_path)?.models;

    let mut registry = ctx.registry()?;
    let live = ctx.marketplace.list().await?;
    let live_ids: HashSet<u64> = live.iter().map(|i| i.id).collect();
    registry.sync(&live_ids)?;

    let result = allocate_models(&desired, &ctx.oracle, &ctx.marketplace).await?;

    for model in &result.unplaceable {
        println!("{} no offer admits model '{}'", "warning:".yellow(), model);
    }

    let probe = WorkerStatusProbe { http: ctx.http.clone() };
    let controller = LifecycleController::new(&ctx.marketplace, &probe, &ctx.gateway);

    for (offer_id, allocation) in &result.machines {
        let disk_gb = allocation.disk_gb();
        let access = if allocation.offer.static_ip {
            AccessMode::PublicIp
        } else {
            AccessMode::Tunnel
        };
        println!(
            "provisioning offer {offer_id} ({} model(s), {disk_gb:.1} GB disk)...",
            allocation.models.len()
        );

        let outcome = controller.provision(*offer_id, disk_gb, access).await?;
        let (instance_id, endpoint) = match outcome {
            LifecycleOutcome::Ready { instance_id, endpoint } => (instance_id, endpoint),
            LifecycleOutcome::Failed => {
                println!("{} failed to provision offer {offer_id}", "error:".red());
                continue;
            }
        };
        registry.put(instance_id, RegistryRecord { endpoint: endpoint.clone() })?;
        println!("{} instance {instance_id} ready at {endpoint}", "\u{2713}".green());

        for sized in &allocation.models {
            let bar = ProgressBar::new_spinner(&format!("pulling {}", sized.desired.model));
            let pull_result = model_ops::pull(
                &registry,
                &ctx.gateway,
                ctx.http.clone(),
                instance_id,
                &sized.desired.model,
                |event| render_pull_progress(&bar, event),
            )
            .await;
            match pull_result {
                Ok(()) => {
                    bar.finish_with_message(format!("{} pulled {}", "\u{2713}".green(), sized.desired.model));
                }
                Err(e) => {
                    bar.abandon_with_message(format!(
                        "{} failed to pull {}: {e}",
                        "\u{2717}".red(),
                        sized.desired.model
                    ));
                    controller.destroy_instance(instance_id, registry.get(instance_id)).await?;
                    break;
                }
            }
        }
    }

    let live_after = ctx.marketplace.list().await?;
    let live_ids_after: HashSet<u64> = live_after.iter().map(|i| i.id).collect();
    registry.sync(&live_ids_after)?;

    Ok(())
}
