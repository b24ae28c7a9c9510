use anyhow::Context;
use anyhow::Result;
use api_types::CtrlDrift;
use clap::Parser;
use drift_operator::app::ApplicationBuilder;
use drift_operator::config::Cli;
use drift_operator::config::Commands;
use drift_operator::config::OperatorArgs;
use kube::CustomResourceExt;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(operator_args) => run_operator(*operator_args).await,
        Commands::Crd => print_crd(),
    }
}

async fn run_operator(operator_args: OperatorArgs) -> Result<()> {
    let _guard = logging::init();

    tracing::info!("Starting drift operator {}", &**version::VERSION);

    let app = ApplicationBuilder::new(operator_args).build().await?;

    app.run().await?;

    Ok(())
}

fn print_crd() -> Result<()> {
    let crd = serde_yaml::to_string(&CtrlDrift::crd()).context("failed to serialize CRD")?;
    print!("{crd}");
    Ok(())
}
