//! `fleetctl destroy` — tear down every live instance in the registry.

use crate::context::FleetContext;
use crate::error::CliError;
use colored::Colorize;
use fleetctl_core::lifecycle::LifecycleController;
use fleetctl_core::worker::WorkerStatusProbe;
use std::collections::HashSet;

pub async fn run(ctx: &FleetContext) -> Result<(), CliError> {
    let mut registry = ctx.registry()?;
    let live = ctx.marketplace.list().await?;
    let live_ids: HashSet<u64> = live.iter().map(|i| i.id).collect();
    registry.sync(&live_ids)?;

    if live_ids.is_empty() {
        println!("no live instances to destroy");
        return Ok(());
    }

    let probe = WorkerStatusProbe { http: ctx.http.clone() };
    let controller = LifecycleController::new(&ctx.marketplace, &probe, &ctx.gateway);
    controller
        .destroy_all(&live_ids, |id| registry.get(id).cloned())
        .await?;

    for id in &live_ids {
        println!("{} destroyed instance {id}", "\u{2713}".green());
    }

    let live_after = ctx.marketplace.list().await?;
    let live_ids_after: HashSet<u64> = live_after.iter().map(|i| i.id).collect();
    registry.sync(&live_ids_after)?;

    Ok(())
}
