use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::operator::OperatorArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the drift operator controller
    Run(Box<OperatorArgs>),
    /// Print the CtrlDrift CustomResourceDefinition as YAML
    Crd,
}
