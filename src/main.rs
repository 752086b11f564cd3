use clap::Parser;
use tracing_subscriber::EnvFilter;

use driftgate::cli;

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr; stdout carries exactly one JSON object.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let code = cli::run(cli).await;
    std::process::exit(code);
}
