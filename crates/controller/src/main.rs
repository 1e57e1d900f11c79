use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use trackpod_controller::app::ApplicationBuilder;
use trackpod_controller::config::Cli;
use trackpod_controller::crd;
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

    if cli.crd {
        print!("{}", crd::manifests().context("render custom resource definitions")?);
        return Ok(());
    }

    let _guard = logging::init(cli.log_path.as_deref()).context("initialize logging")?;

    tracing::info!("Starting trackpod controller {}", &**version::VERSION);

    let mut app = ApplicationBuilder::new(cli).build().await?;
    app.run().await?;

    Ok(())
}
