//! `fleetctl model` — pull, remove, and list models on already
//! provisioned instances.

use crate::commands::render_pull_progress;
use crate::context::FleetContext;
use crate::error::CliError;
use crate::output::{OutputFormat, ProgressBar, render_rows};
use colored::Colorize;
use fleetctl_core::model_ops;
use serde_json::json;

pub async fn deploy(ctx: &FleetContext, model: String, instance_id: u64) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let bar = ProgressBar::new_spinner(&format!("pulling {model} onto instance {instance_id}"));
    let result = model_ops::pull(&registry, &ctx.gateway, ctx.http.clone(), instance_id, &model, |event| {
        render_pull_progress(&bar, event)
    })
    .await;
    match result {
        Ok(()) => {
            bar.finish_with_message(format!("{} pulled {model}", "\u{2713}".green()));
            Ok(())
        }
        Err(e) => {
            bar.abandon_with_message(format!("{} failed to pull {model}: {e}", "\u{2717}".red()));
            Err(e.into())
        }
    }
}

pub async fn remove(ctx: &FleetContext, model: String, instance_id: u64) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let removed = model_ops::remove(&registry, &ctx.gateway, ctx.http.clone(), instance_id, &model).await?;
    if removed {
        println!("{} removed {model} from instance {instance_id}", "\u{2713}".green());
    } else {
        println!("{} instance {instance_id} did not have {model} to remove", "warning:".yellow());
    }
    Ok(())
}

pub async fn ls(ctx: &FleetContext, format: OutputFormat) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let instances = ctx.marketplace.list().await?;
    let models = model_ops::list_all(ctx.http.clone(), &instances, &registry).await;

    if models.is_empty() {
        println!("no models resident on any addressed instance");
        return Ok(());
    }

    let rows: Vec<_> = models
        .iter()
        .map(|m| {
            json!({
                "name": m.name,
                "size": m.size.to_string(),
                "instance_id": m.instance_id.map(|id| id.to_string()).unwrap_or_default(),
            })
        })
        .collect();
    println!("{}", render_rows(&rows, format));
    Ok(())
}
