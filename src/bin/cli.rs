//! CLI for cluster inspection

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use nodemesh::common::parse_duration;
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "nodemesh")]
#[command(about = "nodemesh cluster CLI")]
#[command(version)]
struct Cli {
    /// Node API URL
    #[arg(long, default_value = "http://localhost:7400")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cluster snapshot
    State,

    /// Show the master node
    Master,

    /// List nodes with their status
    Nodes,

    /// Run a refresh cycle now
    Refresh {
        /// Wait for every probe to finish
        #[arg(long)]
        settle: bool,

        /// Bound on the settle wait (e.g. "5s")
        #[arg(long)]
        timeout: Option<String>,

        /// Only refresh membership lists
        #[arg(long)]
        membership_only: bool,
    },

    /// Call an operation through the node
    Call {
        service: String,
        operation: String,

        /// Target node (the node itself if omitted)
        #[arg(long)]
        target: Option<String>,

        /// Argument as TYPE=JSON, repeatable
        #[arg(long = "arg")]
        args: Vec<String>,
    },
}

fn parse_arg(raw: &str) -> anyhow::Result<(String, Value)> {
    let (type_name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("argument must look like TYPE=JSON: {}", raw))?;
    let value = serde_json::from_str(value).with_context(|| format!("invalid JSON in {}", raw))?;
    Ok((type_name.to_string(), value))
}

/// Target of a call: the one given, or the node serving the API.
fn call_target(target: Option<String>, liveness: &Value) -> anyhow::Result<String> {
    match target {
        Some(target) => Ok(target),
        None => liveness["node"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("node did not report its id: {}", liveness)),
    }
}

async fn get_json(client: &Client, url: String) -> anyhow::Result<Value> {
    read_json(client.get(url).send().await?).await
}

async fn read_json(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        return Err(anyhow!(
            "HTTP {}: {}",
            status,
            body.get("error").unwrap_or(&body)
        ));
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let base = cli.node.trim_end_matches('/');
    let client = Client::new();

    match cli.command {
        Commands::State => {
            let state = get_json(&client, format!("{}/cluster/state", base)).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }

        Commands::Master => {
            let body = get_json(&client, format!("{}/cluster/master", base)).await?;
            match body["master"].as_str() {
                Some(master) => println!("{}", master),
                None => println!("(no master: no enabled nodes)"),
            }
        }

        Commands::Nodes => {
            let nodes = get_json(&client, format!("{}/cluster/nodes", base)).await?;
            println!(
                "{:<20} {:<9} {:>8} {:<7} {:>9}  ADDRESS",
                "NODE", "STATUS", "PRIORITY", "MASTER", "PING (ms)"
            );
            for node in nodes.as_array().into_iter().flatten() {
                let ping = match (
                    node["last_probe"]["latency_ms"].as_u64(),
                    node["last_probe"]["error"].as_str(),
                ) {
                    (Some(ms), _) => ms.to_string(),
                    (None, Some(_)) => "error".to_string(),
                    (None, None) => "-".to_string(),
                };
                println!(
                    "{:<20} {:<9} {:>8} {:<7} {:>9}  {}",
                    node["id"].as_str().unwrap_or("?"),
                    node["status"].as_str().unwrap_or("?"),
                    node["priority"],
                    if node["master"].as_bool() == Some(true) { "yes" } else { "" },
                    ping,
                    node["address"].as_str().unwrap_or("-"),
                );
            }
        }

        Commands::Refresh {
            settle,
            timeout,
            membership_only,
        } => {
            let mut query = vec![
                ("settle", settle.to_string()),
                ("membership_only", membership_only.to_string()),
            ];
            if let Some(timeout) = timeout {
                query.push(("timeout_ms", parse_duration(&timeout)?.as_millis().to_string()));
            }
            let body = read_json(
                client
                    .post(format!("{}/cluster/refresh", base))
                    .query(&query)
                    .send()
                    .await?,
            )
            .await?;
            println!("Refresh report:");
            println!("  Probes submitted: {}", body["submitted"]);
            println!("  Settled: {}", body["settled"]);
            println!("  Active nodes: {}", body["state"]["active_nodes"]);
            println!("  Master: {}", body["state"]["master_node"]);
        }

        Commands::Call {
            service,
            operation,
            target,
            args,
        } => {
            let (argument_types, arguments): (Vec<String>, Vec<Value>) = args
                .iter()
                .map(|raw| parse_arg(raw))
                .collect::<anyhow::Result<Vec<_>>>()?
                .into_iter()
                .unzip();
            let target = match target {
                Some(target) => target,
                None => {
                    let liveness = get_json(&client, format!("{}/health/live", base)).await?;
                    call_target(None, &liveness)?
                }
            };
            let body = read_json(
                client
                    .post(format!("{}/cluster/invoke", base))
                    .json(&json!({
                        "target": target,
                        "service": service,
                        "operation": operation,
                        "argument_types": argument_types,
                        "arguments": arguments,
                    }))
                    .send()
                    .await?,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&body["result"])?);
        }
    }

    Ok(())
}
