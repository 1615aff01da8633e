use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

/// `RUST_LOG` when set, otherwise `debug` with `--verbose` and `warn` without.
fn log_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "warn" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    tracing_subscriber::fmt().with_env_filter(log_filter(cli.verbose)).init();
    commands::run_command(cli)
}
