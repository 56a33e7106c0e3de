//! Host Push CLI - serves the notification trigger endpoint and manages
//! push subscriptions.
//!
//! See the `host_push` library for the core functionality.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use host_push::{
    server::{self, AppState},
    Config, JsonSubscriptionStore, Notifier, PushSubscription,
};
use mimalloc::MiMalloc;
use std::sync::Arc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "host-push")]
#[command(version)]
#[command(about = "Web Push delivery for host booking notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP trigger endpoint
    Serve {
        /// Address to bind (overrides HOST_PUSH_BIND)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Send a notification to every browser of a host
    Notify {
        #[arg(long)]
        host_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Page opened when the notification is clicked
        #[arg(long)]
        url: Option<String>,
    },
    /// Register a browser push subscription for a host
    Subscribe {
        #[arg(long)]
        host_id: String,
        /// Push service endpoint URL
        #[arg(long)]
        endpoint: String,
        /// Browser ECDH public key (base64url)
        #[arg(long)]
        p256dh: String,
        /// Browser auth secret (base64url)
        #[arg(long)]
        auth: String,
    },
    /// Remove a browser push subscription
    Unsubscribe {
        #[arg(long)]
        host_id: String,
        #[arg(long)]
        endpoint: String,
    },
    /// Print the effective configuration (secrets omitted)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if config.service_secret.is_empty() {
                log::warn!("[Server] PUSH_SERVICE_SECRET is not set; every /notify request will be rejected");
            }

            let notifier = match config.build_dispatcher() {
                Ok(dispatcher) => {
                    let store = open_store(&config).await?;
                    Some(Notifier::new(store, dispatcher))
                }
                Err(e) => {
                    log::error!("[WebPush] Web push disabled: {:#}", e);
                    None
                }
            };

            let state = Arc::new(AppState::new(config.service_secret.clone(), notifier));
            server::serve(&config.bind_addr, state).await?;
        }
        Commands::Notify {
            host_id,
            title,
            body,
            url,
        } => {
            let dispatcher = config.build_dispatcher()?;
            let notifier = Notifier::new(open_store(&config).await?, dispatcher);
            let summary = notifier
                .notify_owner(&host_id, &title, &body, url.as_deref())
                .await?;
            println!("{}", serde_json::to_string(&summary)?);
        }
        Commands::Subscribe {
            host_id,
            endpoint,
            p256dh,
            auth,
        } => {
            anyhow::ensure!(!host_id.trim().is_empty(), "--host-id must not be empty");
            host_push::notifications::push::audience(&endpoint)?;
            host_push::notifications::ece::SubscriberKeys::from_base64url(&p256dh, &auth)
                .context("Invalid subscription keys")?;

            let store = JsonSubscriptionStore::open(&config.store_path).await?;
            let id = store
                .upsert(
                    host_id.trim(),
                    PushSubscription {
                        endpoint,
                        p256dh,
                        auth,
                    },
                )
                .await?;
            println!("{}", id);
        }
        Commands::Unsubscribe { host_id, endpoint } => {
            let store = JsonSubscriptionStore::open(&config.store_path).await?;
            if store.remove(host_id.trim(), &endpoint).await? {
                println!("Removed subscription");
            } else {
                eprintln!("No subscription for host '{}' at that endpoint", host_id);
                std::process::exit(1);
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<JsonSubscriptionStore>> {
    Ok(Arc::new(JsonSubscriptionStore::open(&config.store_path).await?))
}
