use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "warn";
const VERBOSE_DIRECTIVES: &str = "warn,routerctl=debug,routerctl_core=debug,routerctl_config=debug";

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the
/// defaults when set.
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose {
        VERBOSE_DIRECTIVES
    } else {
        DEFAULT_DIRECTIVES
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init()?;
    Ok(())
}
