//! fleetctl - deploy and manage a fleet of spot-GPU LLM inference workers

mod cli;
mod commands;
mod context;
mod error;
mod output;
mod utils;

use clap::Parser;
use cli::{Cli, Commands, InfraCommands, ModelCommands};
use context::FleetContext;
use error::{CliError, CliResult, IntoCliReport as _};

fn main() -> anyhow::Result<()> {
    error::install_hook();
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let rt = tokio::runtime::Runtime::new()?;
    // Reporting through `CliResult` here, rather than at every command
    // function's signature, means `install_hook`'s location annotations
    // actually reach the terminal via the `{:?}` render below.
    rt.block_on(run_command(cli)).map_err(|report| anyhow::anyhow!("{report:?}"))
}

async fn run_command(cli: Cli) -> CliResult<()> {
    let ctx = FleetContext::new(&cli.state).into_report()?;
    let format = cli.output_format;

    let result: Result<(), CliError> = match cli.command {
        Commands::Apply { config } => commands::apply::run(&ctx, config).await,
        Commands::Destroy => commands::destroy::run(&ctx).await,
        Commands::Run { model, gpu_memory_gb, disk, access } => {
            commands::run::run(&ctx, model, gpu_memory_gb, disk, access).await
        }
        Commands::Infra { action } => match action {
            InfraCommands::Ls => commands::infra::ls(&ctx, format).await,
            InfraCommands::Inspect { id } => commands::infra::inspect(&ctx, id).await,
            InfraCommands::Create { offer_id, disk, access } => {
                commands::infra::create(&ctx, offer_id, disk, access).await
            }
            InfraCommands::Destroy { id } => commands::infra::destroy(&ctx, id).await,
            InfraCommands::Offers { gpu_memory_gb, disk, public_ip, min_inet_down, limit } => {
                commands::infra::offers(&ctx, gpu_memory_gb, disk, public_ip, min_inet_down, limit, format).await
            }
        },
        Commands::Model { action } => match action {
            ModelCommands::Deploy { model, instance_id } => commands::model::deploy(&ctx, model, instance_id).await,
            ModelCommands::Remove { model, instance_id } => commands::model::remove(&ctx, model, instance_id).await,
            ModelCommands::Ls => commands::model::ls(&ctx, format).await,
        },
        Commands::Logs { id, max_logs } => commands::logs::run(&ctx, id, max_logs).await,
    };

    result.into_report()
}
