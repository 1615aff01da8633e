use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "riviere",
    about = "Riviere — lock-free append-only collector",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add from many threads at once and verify the built sequence
    Stress(StressArgs),
    /// Show that joined producers keep their relative order
    Order(OrderArgs),
    /// Buffer log lines from many threads and flush them to a file
    Log(LogArgs),
}

/// Sizing options shared by every command that creates a collector.
#[derive(Args, Clone, Debug, Default)]
pub struct CollectorArgs {
    /// TOML file holding a collector configuration
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Capacity of the first segment; overrides the config file
    #[arg(long)]
    pub initial_capacity: Option<usize>,
}

#[derive(Args)]
pub struct StressArgs {
    #[arg(short, long, default_value = "8")]
    pub threads: usize,
    #[arg(short = 'k', long, default_value = "100000")]
    pub per_thread: usize,
    #[command(flatten)]
    pub collector: CollectorArgs,
}

#[derive(Args)]
pub struct OrderArgs {
    #[command(flatten)]
    pub collector: CollectorArgs,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short, long)]
    pub output: PathBuf,
    #[arg(short, long, default_value = "4")]
    pub threads: usize,
    #[arg(short, long, default_value = "1000")]
    pub messages: usize,
    #[arg(long)]
    pub append: bool,
    #[command(flatten)]
    pub collector: CollectorArgs,
}
