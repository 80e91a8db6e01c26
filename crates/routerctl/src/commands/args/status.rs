use clap::Parser;

#[derive(Debug, Parser)]
pub struct StatusArgs {
    pub network: String,
}
