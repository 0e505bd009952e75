//! boltwire - Bolt connection probe
//!
//! Connects to a Bolt server, authenticates and runs a query, printing the
//! records and the result summary.

use boltwire_client::config::CONFIG_PATH_ENV;
use boltwire_client::{Client, ClientConfig, QueryResult, Statement};
use boltwire_protocol::{AccessMode, TransactionMetadata, Value};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "boltwire")]
#[command(about = "Probe a Bolt graph database server")]
#[command(version)]
struct Cli {
    /// Server address, host[:port]
    #[arg(short, long)]
    address: Option<String>,

    /// User for basic authentication
    #[arg(short, long)]
    user: Option<String>,

    /// Password for basic authentication
    #[arg(short, long, env = "BOLTWIRE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database to run against (server default if omitted)
    #[arg(short, long)]
    database: Option<String>,

    // ===== TLS Options =====
    /// Enable TLS connection
    #[arg(long)]
    tls: bool,

    /// Path to CA certificate for server verification
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, authenticate and report the server (default)
    Ping,

    /// Run a query and print its records
    Query {
        /// Query text
        query: String,

        /// Parameter as key=value; values are parsed as JSON, else taken as strings
        #[arg(short = 'P', long = "param")]
        params: Vec<String>,

        /// Run in read mode
        #[arg(short, long)]
        read: bool,

        /// Run inside an explicit transaction instead of auto-commit
        #[arg(long)]
        tx: bool,
    },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("parameter '{}' is not key=value", raw))?;
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

fn print_result(result: &QueryResult) {
    println!("{}", result.keys.join("\t"));
    for record in &result.records {
        let row: Vec<String> = record.values().iter().map(ToString::to_string).collect();
        println!("{}", row.join("\t"));
    }

    let summary = &result.summary;
    println!();
    println!("{} record(s)", result.records.len());
    if let Some(query_type) = summary.query_type {
        println!("query type: {:?}", query_type);
    }
    if summary.counters.contains_updates {
        println!("counters: {:?}", summary.counters);
    }
    if let Some(after) = summary.result_available_after {
        println!("available after: {} ms", after.as_millis());
    }
    if let Some(after) = summary.result_consumed_after {
        println!("consumed after: {} ms", after.as_millis());
    }
    for notification in &summary.notifications {
        println!("notification: {}", notification);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration (from file if BOLTWIRE_CONFIG is set, then env overrides)
    let mut config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        tracing::info!("Loaded config from {}", path);
    }

    // Command-line flags win over file and environment
    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(user) = cli.user {
        config.auth.scheme = "basic".to_string();
        config.auth.principal = Some(user);
    }
    if let Some(password) = cli.password {
        config.auth.credentials = Some(password);
    }
    if cli.database.is_some() {
        config.database = cli.database;
    }
    if cli.tls || cli.ca_cert.is_some() || cli.insecure {
        config.tls.enabled = true;
    }
    if cli.ca_cert.is_some() {
        config.tls.ca_cert = cli.ca_cert;
    }
    if cli.insecure {
        config.tls.insecure = true;
    }

    tracing::info!("Connecting to {}", config.address);
    let client = Client::connect(&config).await?;
    let conn = client.connection();
    tracing::info!(
        "Connected to {} using Bolt {} (connection {})",
        conn.server_agent(),
        conn.protocol_version(),
        conn.connection_id().unwrap_or("-")
    );

    let outcome = match cli.command {
        Some(Commands::Ping) | None => client.ping().await,
        Some(Commands::Query {
            query,
            params,
            read,
            tx,
        }) => {
            let mut statement = Statement::new(query);
            for raw in &params {
                let (key, value) = parse_param(raw)?;
                statement = statement.with_parameter(key, value);
            }
            let mode = if read { AccessMode::Read } else { AccessMode::Write };
            let metadata = TransactionMetadata::new().with_mode(mode);

            if tx {
                client
                    .transaction(&metadata, vec![statement])
                    .await
                    .map(|committed| {
                        committed.results.iter().for_each(print_result);
                        if let Some(bookmark) = committed.bookmark {
                            println!("bookmark: {}", bookmark);
                        }
                    })
            } else {
                client
                    .query(statement, &metadata)
                    .await
                    .map(|result| print_result(&result))
            }
        }
    };

    if let Err(e) = client.close().await {
        tracing::warn!("Error while closing: {}", e);
    }
    if let Err(e) = &outcome {
        if e.is_retryable() {
            tracing::warn!("The failure is transient; retrying may succeed");
        }
    }
    outcome?;
    Ok(())
}
