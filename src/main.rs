//! pathwarden - Block clients that probe for sensitive paths

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use pathwarden::cli::{Cli, Commands};
use pathwarden::commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Logs go to stderr; stdout carries command output (status --json)
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run => commands::run::run(&cli.config).await,
        Commands::Restore => commands::restore::run(&cli.config).await,
        Commands::Status { json, all } => commands::status::run(json, all, &cli.config).await,
        Commands::Check { ip } => commands::check::run(&ip, &cli.config).await,
        Commands::Decide { ip, path } => commands::decide::run(&ip, &path, &cli.config).await,
        Commands::Unblock { ip } => commands::unblock::run(&ip, &cli.config).await,
        Commands::Sweep => commands::sweep::run(&cli.config).await,
        Commands::Prune => commands::prune::run(&cli.config).await,
        Commands::InitConfig { force } => commands::init_config::run(force, &cli.config).await,
        Commands::Version => {
            println!("pathwarden {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
