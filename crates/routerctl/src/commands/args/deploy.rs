use std::path::PathBuf;

use clap::Parser;

use crate::messages::{
    MSG_ARG_HELP, MSG_DEPLOY_DRY_RUN_HELP, MSG_OUTPUT_HELP, MSG_REDEPLOY_HELP, MSG_SALT_HELP,
};

#[derive(Debug, Parser)]
pub struct DeployArgs {
    pub network: String,
    /// Contract name as found in the artifacts
    pub contract: String,
    #[clap(long, help = MSG_SALT_HELP)]
    pub salt: String,
    #[clap(long = "arg", help = MSG_ARG_HELP)]
    pub args: Vec<String>,
    #[clap(long, help = MSG_REDEPLOY_HELP)]
    pub redeploy: bool,
    #[clap(long, help = MSG_OUTPUT_HELP)]
    pub output: Option<PathBuf>,
    #[clap(long, help = MSG_DEPLOY_DRY_RUN_HELP)]
    pub dry_run: bool,
}
