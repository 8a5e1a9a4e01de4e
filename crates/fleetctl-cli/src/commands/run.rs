//! `fleetctl run` — provision a single instance and pull one model onto
//! it, outside of the declarative allocator.

use crate::cli::AccessArg;
use crate::commands::render_pull_progress;
use crate::context::FleetContext;
use crate::error::CliError;
use crate::output::ProgressBar;
use colored::Colorize;
use fleetctl_core::lifecycle::{LifecycleController, LifecycleOutcome};
use fleetctl_core::marketplace::OfferQuery;
use fleetctl_core::model_ops;
use fleetctl_core::types::{AccessMode, DISK_HEADROOM_MB, RegistryRecord};
use fleetctl_core::worker::WorkerStatusProbe;

pub async fn run(
    ctx: &FleetContext,
    model: String,
    gpu_memory_gb: Option<f64>,
    disk: Option<f64>,
    access: AccessArg,
) -> Result<(), CliError> {
    let size_gb = match gpu_memory_gb {
        Some(gb) => gb,
        None => ctx
            .oracle
            .size_gb(&model)
            .ok_or_else(|| CliError::ConfigError(format!("no known size for model identifier '{model}'")))?,
    };
    let size_mb = size_gb * 1024.0;
    let disk_gb = disk.unwrap_or_else(|| (size_mb + DISK_HEADROOM_MB) / 1024.0);

    let access_mode = match access {
        AccessArg::Ip => AccessMode::PublicIp,
        AccessArg::Cf => AccessMode::Tunnel,
    };

    let query = OfferQuery {
        gpu_ram_mb: size_mb,
        disk_gb,
        public_ip: matches!(access_mode, AccessMode::PublicIp),
        ..OfferQuery::default()
    };
    let mut candidates = ctx.marketplace.query_offers(&query).await?;
    candidates.retain(|o| o.num_gpus <= 2);
    candidates.sort_by(|a, b| {
        b.total_flops
            .partial_cmp(&a.total_flops)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.dph_total.partial_cmp(&b.dph_total).unwrap_or(std::cmp::Ordering::Equal))
    });
    let offer = candidates
        .into_iter()
        .next()
        .ok_or_else(|| CliError::Other(format!("no offer admits model '{model}'")))?;

    println!(
        "provisioning offer {} for '{model}' ({size_gb:.1} GB GPU RAM, {disk_gb:.1} GB disk)...",
        offer.id
    );

    let probe = WorkerStatusProbe { http: ctx.http.clone() };
    let controller = LifecycleController::new(&ctx.marketplace, &probe, &ctx.gateway);
    let outcome = controller.provision(offer.id, disk_gb, access_mode).await?;
    let (instance_id, endpoint) = match outcome {
        LifecycleOutcome::Ready { instance_id, endpoint } => (instance_id, endpoint),
        LifecycleOutcome::Failed => {
            return Err(CliError::Other(format!("failed to provision offer {}", offer.id)));
        }
    };

    let mut registry = ctx.registry()?;
    registry.put(instance_id, RegistryRecord { endpoint: endpoint.clone() })?;
    println!("{} instance {instance_id} ready at {endpoint}", "\u{2713}".green());

    let bar = ProgressBar::new_spinner(&format!("pulling {model}"));
    let pull_result = model_ops::pull(&registry, &ctx.gateway, ctx.http.clone(), instance_id, &model, |event| {
        render_pull_progress(&bar, event)
    })
    .await;
    match pull_result {
        Ok(()) => bar.finish_with_message(format!("{} pulled {model}", "\u{2713}".green())),
        Err(e) => {
            bar.abandon_with_message(format!("{} failed to pull {model}: {e}", "\u{2717}".red()));
            controller.destroy_instance(instance_id, registry.get(instance_id)).await?;
            return Err(e.into());
        }
    }

    println!("testing model: {model}");
    let test_result = model_ops::test(&registry, ctx.http.clone(), instance_id, &model).await?;
    println!("test result: {test_result}");

    Ok(())
}
