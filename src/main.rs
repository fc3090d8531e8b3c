use clap::Parser;

use parl_pipeline::cli::{Cli, execute_command, init_logger_from_settings, load_and_merge_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_and_merge_config(&cli)?;
    init_logger_from_settings(&settings)?;

    tracing::debug!(command = ?cli.command, "Configuration loaded");

    if let Err(e) = execute_command(&cli, settings).await {
        tracing::error!(error = %e, error_debug = ?e, "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
