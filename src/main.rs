//! flac-recorder CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use flac_recorder::cli::{
    app::{resolve_record_options, run_permission, run_record, EXIT_ERROR, EXIT_USAGE_ERROR},
    args::{Cli, Commands},
    config_cmd::handle_config_command,
    presenter::Presenter,
};
use flac_recorder::infrastructure::XdgConfigStore;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let presenter = Presenter::new();

    match cli.command {
        Commands::Config { action } => {
            let store = XdgConfigStore::new();
            if let Err(e) = handle_config_command(action, &store, &presenter).await {
                presenter.error(&e.to_string());
                return ExitCode::from(EXIT_ERROR);
            }
            ExitCode::SUCCESS
        }
        Commands::Permission => run_permission(),
        Commands::Record(args) => match resolve_record_options(args).await {
            Ok(options) => run_record(options).await,
            Err(message) => {
                presenter.error(&message);
                ExitCode::from(EXIT_USAGE_ERROR)
            }
        },
    }
}

/// Diagnostics go to stderr so stdout stays clean for the output path
fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
