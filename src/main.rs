//! Command-line entry point.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use macos_localdev::{Paths, bootstrap_runner, cmd};

/// Bootstrap this Mac for local HTTPS development.
///
/// Idempotent: re-running skips whatever is already in place and continues
/// from the first failure.
#[derive(Parser, Debug)]
#[command(name = "macos-localdev", version, about)]
struct Cli {
    /// Report what each pending step would do without applying anything.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    anyhow::ensure!(
        !cmd::is_root(),
        "run as a regular user; steps elevate per command via sudo"
    );

    let paths = Paths::from_home().context("could not determine home directory")?;
    bootstrap_runner(paths, cli.dry_run)
        .run()
        .context("bootstrap aborted")?;

    Ok(())
}
