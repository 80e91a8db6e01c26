use routerctl_common::{files::save_json_file, logger, spinner::Spinner};
use routerctl_core::deployer::DeterministicDeployer;
use routerctl_types::{render_native, Action, Salt, TronEncoding};

use super::args::DeployArgs;
use crate::{
    context::AppContext,
    messages::{
        msg_address_on_creation, msg_deploy_address, msg_deployment_saved, MSG_DEPLOYED,
        MSG_DEPLOYING_SPINNER, MSG_DEPLOYMENT_OUTPUT,
    },
};

pub async fn run(context: &AppContext, args: DeployArgs) -> anyhow::Result<()> {
    let family = context.chain(&args.network)?.family;
    let adapter = context.adapter(&args.network)?;
    let constructor_args = adapter
        .artifact(&args.contract)?
        .parse_constructor_args(&args.args, family)?;
    let action = Action::Deploy {
        contract: args.contract.clone(),
        salt: Salt::new(args.salt),
        args: constructor_args,
    };
    let deployer = DeterministicDeployer::new(&args.network, adapter, context.store.clone());

    match deployer.compute_address(&action)? {
        Some(address) => logger::info(msg_deploy_address(
            &args.contract,
            &render_native(address, family, TronEncoding::Base58),
        )),
        None => logger::info(msg_address_on_creation(&args.contract)),
    }
    if args.dry_run {
        return Ok(());
    }

    let spinner = Spinner::new(MSG_DEPLOYING_SPINNER);
    let output = match deployer.deploy(&action, args.redeploy).await {
        Ok(output) => {
            spinner.finish();
            output
        }
        Err(err) => {
            spinner.fail();
            return Err(err.into());
        }
    };

    logger::note(MSG_DEPLOYMENT_OUTPUT, logger::object_to_string(&output));
    if let Some(path) = &args.output {
        save_json_file(&context.shell, path, &output)?;
        logger::info(msg_deployment_saved(path));
    }
    logger::outro(MSG_DEPLOYED);
    Ok(())
}
