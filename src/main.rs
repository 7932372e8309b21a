use admob::cli::Cli;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    admob::cli::run(Cli::parse()).await
}
