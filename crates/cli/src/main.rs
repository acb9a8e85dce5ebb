//! powledger CLI entry point.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "powledger")]
#[command(about = "A tamper-evident proof-of-work ledger", long_about = None)]
struct Cli {
    /// Directory to store ledger data
    #[arg(short, long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(cmd) => match commands::run(cmd, &cli.data_dir) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
        None => {
            println!("powledger - A tamper-evident proof-of-work ledger");
            println!("Run 'powledger --help' for usage information.");
            ExitCode::SUCCESS
        }
    }
}
