use std::path::PathBuf;

use clap::{Parser, Subcommand};
use routerctl_common::{error::log_error, logger, observability::init_tracing};

use crate::{
    commands::args::{DeployArgs, ReconcileArgs, StatusArgs},
    context::AppContext,
    messages::MSG_FAILED,
};

mod commands;
mod context;
mod messages;
mod report;

#[derive(Parser, Debug)]
#[command(version, about)]
struct RouterCtl {
    #[command(subcommand)]
    command: RouterCtlSubcommands,
    #[clap(flatten)]
    global: RouterCtlGlobalArgs,
}

#[derive(Subcommand, Debug)]
enum RouterCtlSubcommands {
    /// Bring routers in line with the declared configuration
    Reconcile(ReconcileArgs),
    /// Deploy a contract at its salted address and record it
    Deploy(DeployArgs),
    /// Show what reconcile would change on a network without sending anything
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
#[clap(next_help_heading = "Global options")]
struct RouterCtlGlobalArgs {
    /// Directory with networks.yaml, chains.yaml, deployments.yaml and artifacts
    #[clap(long, global = true, default_value = ".")]
    config_dir: PathBuf,
    /// Verbose mode
    #[clap(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();

    let args = RouterCtl::parse();
    init_tracing(args.global.verbose)?;

    logger::new_empty_line();
    logger::intro();

    if let Err(err) = run_subcommand(args).await {
        log_error(&err);
        logger::outro(MSG_FAILED);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_subcommand(args: RouterCtl) -> anyhow::Result<()> {
    let context = AppContext::load(args.global.config_dir)?;
    match args.command {
        RouterCtlSubcommands::Reconcile(args) => commands::reconcile::run(&context, args).await,
        RouterCtlSubcommands::Deploy(args) => commands::deploy::run(&context, args).await,
        RouterCtlSubcommands::Status(args) => commands::status::run(&context, args).await,
    }
}
