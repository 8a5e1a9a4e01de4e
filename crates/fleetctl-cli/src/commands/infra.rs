//! `fleetctl infra` — instance lifecycle management outside of the
//! declarative allocator: list, inspect, create, destroy, browse offers.

use crate::cli::AccessArg;
use crate::context::FleetContext;
use crate::error::CliError;
use crate::output::{OutputFormat, render_rows};
use colored::Colorize;
use fleetctl_core::lifecycle::{LifecycleController, LifecycleOutcome};
use fleetctl_core::marketplace::OfferQuery;
use fleetctl_core::types::{AccessMode, RegistryRecord};
use fleetctl_core::worker::WorkerStatusProbe;
use serde_json::json;
use std::collections::HashSet;

pub async fn ls(ctx: &FleetContext, format: OutputFormat) -> Result<(), CliError> {
    let mut registry = ctx.registry()?;
    let instances = ctx.marketplace.list().await?;
    let live_ids: HashSet<u64> = instances.iter().map(|i| i.id).collect();
    registry.sync(&live_ids)?;

    let rows: Vec<_> = instances
        .iter()
        .map(|i| {
            let endpoint = registry.get(i.id).map(|r| r.endpoint.as_str()).unwrap_or("");
            json!({
                "id": i.id.to_string(),
                "status": i.actual_status,
                "endpoint": endpoint,
            })
        })
        .collect();

    if rows.is_empty() {
        println!("no live instances");
    } else {
        println!("{}", render_rows(&rows, format));
    }
    Ok(())
}

pub async fn inspect(ctx: &FleetContext, id: u64) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let instances = ctx.marketplace.list().await?;
    let instance = instances
        .into_iter()
        .find(|i| i.id == id)
        .ok_or_else(|| CliError::Other(format!("no live instance with id {id}")))?;
    let endpoint = registry.get(id).map(|r| r.endpoint.as_str()).unwrap_or("(unresolved)");

    println!("id:               {}", instance.id);
    println!("actual_status:    {}", instance.actual_status);
    println!("intended_status:  {}", instance.intended_status);
    println!("cur_state:        {}", instance.cur_state);
    println!("status_msg:       {}", instance.status_msg);
    println!("public_ipaddr:    {}", instance.public_ipaddr);
    println!("endpoint:         {endpoint}");
    Ok(())
}

pub async fn create(ctx: &FleetContext, offer_id: u64, disk: f64, access: AccessArg) -> Result<(), CliError> {
    let access_mode = match access {
        AccessArg::Ip => AccessMode::PublicIp,
        AccessArg::Cf => AccessMode::Tunnel,
    };
    let probe = WorkerStatusProbe { http: ctx.http.clone() };
    let controller = LifecycleController::new(&ctx.marketplace, &probe, &ctx.gateway);

    println!("provisioning offer {offer_id} ({disk:.1} GB disk)...");
    let outcome = controller.provision(offer_id, disk, access_mode).await?;
    match outcome {
        LifecycleOutcome::Ready { instance_id, endpoint } => {
            let mut registry = ctx.registry()?;
            registry.put(instance_id, RegistryRecord { endpoint: endpoint.clone() })?;
            println!("{} instance {instance_id} ready at {endpoint}", "\u{2713}".green());
            Ok(())
        }
        LifecycleOutcome::Failed => Err(CliError::Other(format!("failed to provision offer {offer_id}"))),
    }
}

pub async fn destroy(ctx: &FleetContext, id: u64) -> Result<(), CliError> {
    let mut registry = ctx.registry()?;
    let probe = WorkerStatusProbe { http: ctx.http.clone() };
    let controller = LifecycleController::new(&ctx.marketplace, &probe, &ctx.gateway);
    controller.destroy_instance(id, registry.get(id)).await?;
    println!("{} destroyed instance {id}", "\u{2713}".green());

    let live_after = ctx.marketplace.list().await?;
    let live_ids_after: HashSet<u64> = live_after.iter().map(|i| i.id).collect();
    registry.sync(&live_ids_after)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn offers(
    ctx: &FleetContext,
    gpu_memory_gb: f64,
    disk: f64,
    public_ip: bool,
    min_inet_down: f64,
    limit: usize,
    format: OutputFormat,
) -> Result<(), CliError> {
    let query = OfferQuery {
        gpu_ram_mb: gpu_memory_gb * 1024.0,
        disk_gb: disk,
        public_ip,
        min_inet_down,
        limit,
        ..OfferQuery::default()
    };
    let offers = ctx.marketplace.query_offers(&query).await?;

    if offers.is_empty() {
        println!("no offers match these requirements");
        return Ok(());
    }

    let rows: Vec<_> = offers
        .iter()
        .take(limit)
        .map(|o| {
            json!({
                "id": o.id.to_string(),
                "gpu_ram_gb": format!("{:.1}", o.gpu_total_ram_mb / 1024.0),
                "num_gpus": o.num_gpus.to_string(),
                "dph_total": format!("{:.3}", o.dph_total),
                "total_flops": format!("{:.1}", o.total_flops),
                "static_ip": o.static_ip.to_string(),
                "disk_space_gb": format!("{:.1}", o.disk_space),
            })
        })
        .collect();
    println!("{}", render_rows(&rows, format));
    Ok(())
}
