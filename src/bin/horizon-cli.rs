use clap::{Parser, Subcommand};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "horizon-cli")]
#[command(about = "Command-line client for a running Horizon server", long_about = None)]
struct Cli {
    /// HTTP foyer base URL
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// RPC foyer base URL
    #[arg(long, default_value = "http://localhost:8082")]
    rpc_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the welcome document (name, version, protocols)
    Status,
    /// List registered intents
    Intents,
    /// Show in-memory request statistics
    Metrics,
    /// Send an HTTP request through the HTTP foyer
    Call {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Request path, e.g. /users/1001
        path: String,
        /// JSON body
        body: Option<String>,
    },
    /// Invoke an RPC method, e.g. `UserService/GetUser '{"id": 1001}'`
    Rpc {
        /// Service/Method
        target: String,
        /// JSON body
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/", cli.url)).send().await?,
        Commands::Intents => client.get(format!("{}/system/intents", cli.url)).send().await?,
        Commands::Metrics => client.get(format!("{}/system/metrics", cli.url)).send().await?,
        Commands::Call { method, path, body } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let mut req = client.request(method, format!("{}{}", cli.url, path));
            if let Some(body) = body {
                req = req.header(CONTENT_TYPE, "application/json").body(body);
            }
            req.send().await?
        }
        Commands::Rpc { target, body } => {
            client
                .post(format!("{}/{}", cli.rpc_url, target.trim_start_matches('/')))
                .header(CONTENT_TYPE, "application/json")
                .body(body.unwrap_or_else(|| "{}".to_string()))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(trace_id) = res.headers().get("x-trace-id").and_then(|v| v.to_str().ok()) {
        eprintln!("trace-id: {}", trace_id);
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }

    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        std::process::exit(1);
    }
    Ok(())
}
