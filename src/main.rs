//! client-balancer daemon.
//!
//! Loads named clients from a TOML file, keeps their server pools fresh
//! (config reload, optional active health checks) and serves the admin API.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "client-balancer")]
#[command(about = "Client-side load balancer daemon", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/balancer.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match client_balancer::lifecycle::run(&args.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("client-balancer: {}", e);
            ExitCode::FAILURE
        }
    }
}
