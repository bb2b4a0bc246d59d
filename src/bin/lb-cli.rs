use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "lb-cli")]
#[command(about = "Management CLI for the client-balancer admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "LB_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check daemon status
    Status,
    /// List configured clients
    Clients,
    /// Show a client's servers and their health flags
    Servers { client: String },
    /// Show per-server statistics
    Stats { client: String },
    /// Show zone aggregates
    Zones { client: String },
    /// Take a server out of rotation
    Down { client: String, server: String },
    /// Put a server back into rotation
    Up { client: String, server: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Clients => client.get(format!("{}/admin/clients", base)),
        Commands::Servers { client: name } => client.get(format!("{}/admin/clients/{}/servers", base, name)),
        Commands::Stats { client: name } => client.get(format!("{}/admin/clients/{}/stats", base, name)),
        Commands::Zones { client: name } => client.get(format!("{}/admin/clients/{}/zones", base, name)),
        Commands::Down { client: name, server } => {
            client.post(format!("{}/admin/clients/{}/servers/{}/down", base, name, server))
        }
        Commands::Up { client: name, server } => {
            client.post(format!("{}/admin/clients/{}/servers/{}/up", base, name, server))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
