//! `fleetctl logs` — fetch and print an instance's remote logs.

use crate::context::FleetContext;
use crate::error::CliError;

pub async fn run(ctx: &FleetContext, id: u64, max_logs: u32) -> Result<(), CliError> {
    let lines = ctx.marketplace.logs(id, max_logs).await?;
    if lines.is_empty() {
        println!("no logs available for instance {id}");
    } else {
        for line in lines {
            println!("{line}");
        }
    }
    Ok(())
}
