//! Rigger CLI — deployment script generation and execution.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rigger",
    version,
    about = "Generate Capistrano deploy and stage scripts from project records, then run them"
)]
struct Cli {
    #[command(subcommand)]
    command: rigger::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = rigger::cli::dispatch(cli.command) {
        eprintln!("error: {}", e.with_causes());
        std::process::exit(1);
    }
}
