//! Task Tree CLI — incremental task runner.

use clap::Parser;

fn main() {
    let cli = tasktree::cli::Cli::parse();
    if let Err(e) = tasktree::cli::dispatch(cli) {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}
