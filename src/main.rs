//! bcachectl - simplified administration of bcache devices
//!
//! CLI entry point that dispatches to subcommands.

use bcachectl::cli::commands;
use bcachectl::cli::{Cli, Commands};
use bcachectl::config::{Config, ConfigManager};
use bcachectl::error::{BcacheError, BcacheResult};
use bcachectl::host::BcacheHost;
use clap::Parser;
use console::style;
use nix::unistd::geteuid;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BcacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Loaded configuration from {}", config_manager.path().display());

    if config.general.require_root && !geteuid().is_root() {
        return Err(BcacheError::NotRoot);
    }

    let host = BcacheHost::from_config(&config);
    host.ensure_loaded().await?;

    match cli.command {
        Commands::List(args) => commands::list(args, &host).await,
        Commands::Show(args) => commands::show(args, &host).await,
        Commands::Register(args) => commands::register(args, &host).await,
        Commands::Unregister(args) => commands::unregister(args, &host).await,
        Commands::Stop(args) => commands::stop(args, &host).await,
        Commands::Attach(args) => commands::attach(args, &host).await,
        Commands::Detach(args) => commands::detach(args, &host).await,
        Commands::Tune(args) => commands::tune(args, &host).await,
        Commands::PrintTunables(args) => commands::print_tunables(args, &host).await,
        Commands::Flush(args) => commands::flush(args, &host).await,
        Commands::Format(args) => commands::format(args, &host).await,
        Commands::Super(args) => commands::superblock(args, &host).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("bcachectl=warn"),
        1 => EnvFilter::new("bcachectl=info"),
        _ => EnvFilter::new("bcachectl=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
