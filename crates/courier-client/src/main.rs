use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use courier_client::config::ClientConfig;
use courier_client::delivery::{discard_pending, DeliveryLoop};
use courier_client::handlers::{AutoResponder, ConsoleHandler, MessageHandler};
use courier_client::outbound;
use courier_client::registration::{ensure_registration, stored_credentials, Source};
use courier_client::relay::{HttpRelay, RelayTransport};
use courier_core::{identity, CredentialStore, Cursor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "courier=info,courier_client=info,courier_core=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Courier encrypted relay client", long_about = None)]
struct Cli {
    /// Relay base URL [env: COURIER_BASE_URL]
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Credentials file [env: COURIER_CREDENTIALS_PATH]
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,
    /// Name shown to operators [env: COURIER_CLIENT_NAME]
    #[arg(long, global = true)]
    name: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register if needed, then poll and handle messages until Ctrl-C
    Run {
        /// Acknowledge and skip everything already queued before starting
        #[arg(long)]
        discard_pending: bool,
        /// Answer `test` messages with a `test_response`
        #[arg(long)]
        auto_reply: bool,
    },
    /// Register with the relay and store the issued credentials
    Register {
        /// Register even when stored credentials are valid
        #[arg(long)]
        force: bool,
    },
    /// Send one encrypted message through the relay
    Send {
        #[arg(long = "type")]
        kind: String,
        /// JSON object, or plain text wrapped as {"message": text}
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Show this machine's fingerprint and stored identity
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();
    let cli = Cli::parse();
    let config = ClientConfig::resolve(cli.base_url, cli.name, cli.credentials)?;
    match cli.command {
        Commands::Run {
            discard_pending,
            auto_reply,
        } => run_command(&config, discard_pending, auto_reply).await,
        Commands::Register { force } => register_command(&config, force).await,
        Commands::Send { kind, payload } => send_command(&config, &kind, &payload).await,
        Commands::Whoami => whoami_command(&config),
    }
}

fn relay(config: &ClientConfig) -> Result<Arc<dyn RelayTransport>> {
    Ok(Arc::new(HttpRelay::new(&config.base_url)?))
}

async fn run_command(config: &ClientConfig, discard: bool, auto_reply: bool) -> Result<()> {
    let relay = relay(config)?;
    let store = CredentialStore::new(&config.credentials_path);
    let (credentials, _) = ensure_registration(
        relay.as_ref(),
        &store,
        &identity::fingerprint(),
        Some(config.client_name.as_str()),
        false,
    )
    .await?;

    let mut start = Cursor::start();
    if discard {
        match discard_pending(relay.as_ref(), &credentials, start.clone()).await {
            Ok(cursor) => start = cursor,
            Err(err) => warn!(error = %err, "could not discard pending messages; delivering them"),
        }
    }

    let handler: Arc<dyn MessageHandler> = if auto_reply {
        Arc::new(AutoResponder::new(relay.clone()))
    } else {
        Arc::new(ConsoleHandler)
    };
    info!(base_url = %config.base_url, auto_reply, "polling relay");
    let mut delivery = DeliveryLoop::new(relay, handler, credentials)?.starting_at(start);
    delivery
        .run_until(async {
            if let Err(err) = signal::ctrl_c().await {
                warn!(error = %err, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

async fn register_command(config: &ClientConfig, force: bool) -> Result<()> {
    let relay = relay(config)?;
    let store = CredentialStore::new(&config.credentials_path);
    let (credentials, source) = ensure_registration(
        relay.as_ref(),
        &store,
        &identity::fingerprint(),
        Some(config.client_name.as_str()),
        force,
    )
    .await?;
    match source {
        Source::Stored => println!("Already registered as {}", credentials.client_id),
        Source::Registered => println!("Registered as {}", credentials.client_id),
    }
    println!("Credentials: {}", store.path().display());
    Ok(())
}

async fn send_command(config: &ClientConfig, kind: &str, payload: &str) -> Result<()> {
    let payload = outbound::parse_payload(payload).ok_or_else(|| anyhow!("payload cannot be empty"))?;
    let store = CredentialStore::new(&config.credentials_path);
    let (credentials, _) = stored_credentials(&store, &identity::fingerprint())?;
    let relay = relay(config)?;
    let message = outbound::compose(kind, payload, &outbound::now_timestamp());
    outbound::send(relay.as_ref(), &credentials, &message).await?;
    println!("Sent {kind} message");
    Ok(())
}

fn whoami_command(config: &ClientConfig) -> Result<()> {
    let fingerprint = identity::fingerprint();
    println!("Fingerprint:  {fingerprint}");
    println!("Display name: {}", identity::display_name());
    println!("Relay:        {}", config.base_url);
    let store = CredentialStore::new(&config.credentials_path);
    match store.load()? {
        Some(credentials) => {
            let state = if credentials.matches_fingerprint(&fingerprint) {
                "matches this machine"
            } else {
                "belongs to another machine; will re-register"
            };
            println!("Client ID:    {} ({state})", credentials.client_id);
        }
        None => println!("Client ID:    not registered"),
    }
    println!("Credentials:  {}", store.path().display());
    Ok(())
}
