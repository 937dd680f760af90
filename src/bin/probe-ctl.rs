use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use probe_manager::control::rpc::{RpcRequest, RpcResponse};

#[derive(Parser)]
#[command(name = "probe-ctl")]
#[command(about = "Control CLI for the probe manager", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    url: String,

    #[arg(short, long, default_value = "/RPC2")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new configuration and reload the probe
    Reload,
    /// Show child, reload phase and applied revision
    Status,
    /// List the exported RPC methods
    Methods,
    /// Describe one RPC method
    Help { method: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let endpoint = format!("{}{}", cli.url.trim_end_matches('/'), cli.path);

    let ok = match cli.command {
        Commands::Reload => call(&client, &endpoint, "reload_config", None).await?,
        Commands::Methods => call(&client, &endpoint, "system.listMethods", None).await?,
        Commands::Help { method } => {
            call(&client, &endpoint, "system.methodHelp", Some(json!([method]))).await?
        }
        Commands::Status => {
            let res = client
                .get(format!("{}/status", cli.url.trim_end_matches('/')))
                .send()
                .await?;
            print_response(res).await?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn call(
    client: &reqwest::Client,
    endpoint: &str,
    method: &str,
    params: Option<Value>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let res = client
        .post(endpoint)
        .json(&RpcRequest::new(method, params, 1))
        .send()
        .await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: RPC endpoint returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(false);
    }

    let reply: RpcResponse = res.json().await?;
    match (reply.result, reply.error) {
        (_, Some(error)) => {
            eprintln!("Error {}: {}", error.code, error.message);
            if let Some(data) = error.data {
                eprintln!("{}", serde_json::to_string_pretty(&data)?);
            }
            Ok(false)
        }
        (Some(result), None) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(true)
        }
        (None, None) => {
            eprintln!("Error: reply carried neither result nor error");
            Ok(false)
        }
    }
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: status endpoint returned {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(false);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(true)
}
