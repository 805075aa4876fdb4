use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use courier_client::outbound::parse_payload;
use tracing_subscriber::EnvFilter;

mod client;
mod render;

use crate::client::OperatorClient;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_OPERATOR_TOKEN: &str = "changeme-operator";
const DEFAULT_ADMIN_TOKEN: &str = "changeme-admin";

#[derive(Parser)]
#[command(name = "courier-operator")]
#[command(about = "Operator CLI for the Courier relay", long_about = None)]
struct Cli {
    /// Relay base URL
    #[arg(long, env = "COURIER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Token for read-only operator endpoints
    #[arg(long, env = "COURIER_OPERATOR_TOKEN", default_value = DEFAULT_OPERATOR_TOKEN, hide_env_values = true)]
    operator_token: String,

    /// Token for publishing messages
    #[arg(long, env = "COURIER_ADMIN_TOKEN", default_value = DEFAULT_ADMIN_TOKEN, hide_env_values = true)]
    admin_token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered clients
    Clients {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fetch a client's message feed once
    Messages {
        client_id: String,
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Publish a message to one client
    Publish {
        client_id: String,
        #[arg(long = "type")]
        kind: String,
        /// JSON object, or plain text wrapped as {"message": text}
        #[arg(long)]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("courier_operator=info")),
        )
        .init();
    let cli = Cli::parse();
    let operator = OperatorClient::new(&cli.base_url, cli.operator_token, cli.admin_token)?;

    match cli.command {
        Commands::Clients { json } => {
            let clients = operator.clients().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&clients)?);
            } else {
                println!("{}", render::clients_table(&clients));
            }
        }
        Commands::Messages { client_id, cursor } => {
            let messages = operator.messages(&client_id, cursor.as_deref()).await?;
            if messages.is_empty() {
                println!("No messages.");
            }
            for message in &messages {
                println!("{}", render::message_line(message));
            }
        }
        Commands::Publish {
            client_id,
            kind,
            payload,
        } => {
            let payload = parse_payload(&payload).ok_or_else(|| anyhow!("payload cannot be empty"))?;
            let response = operator.publish(&client_id, &kind, &payload).await?;
            println!("Published to {client_id}: {response}");
        }
    }
    Ok(())
}
