//! `ghrelay`: GitHub webhook relay.
//!
//! Composition root. Loads configuration, installs logging, builds the
//! store, sender and formatter set, then runs one of:
//!
//! - `serve` (default): restore state, start the maintenance sweep and serve
//!   webhooks until SIGINT or SIGTERM.
//! - `routes`: print the persisted subscriptions and their webhook URLs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use listener::AppState;
use messenger::{HttpMessenger, LogMessenger};
use pipeline::{MessageSender, SystemClock, TargetId};
use relay::{Relay, RouteRegistry};
use serde_json::json;
use storage::JsonFileStore;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod config;
mod telemetry;

use config::{Config, ProcessEnv};

#[derive(Debug, Parser)]
#[command(name = "ghrelay", version, about = "Relays GitHub webhooks to chat targets")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short, env = "GHRELAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve webhooks (the default).
    Serve,
    /// List persisted subscriptions.
    Routes {
        /// Only show routes for this target.
        #[arg(long)]
        target: Option<String>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config =
        Config::load(cli.config.as_deref(), &ProcessEnv).context("loading configuration")?;
    let telemetry = telemetry::init(config.log_format, config.otlp_endpoint.as_deref())?;

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Routes { target, json } => routes(&config, target, json).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "ghrelay exited with an error");
    }
    telemetry.shutdown();
    result
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let base_url = config.require_base_url()?.to_string();
    let store = JsonFileStore::open(&config.state_file)
        .await
        .with_context(|| format!("opening state file {}", config.state_file.display()))?;

    let sender: Arc<dyn MessageSender> = match config.gateway_config() {
        Some(gateway) => {
            let messenger = HttpMessenger::new(gateway).context("building gateway client")?;
            info!(endpoint = %messenger.endpoint(), "Forwarding messages to gateway");
            Arc::new(messenger)
        }
        None => {
            warn!("No gateway configured; outbound messages are only logged");
            Arc::new(LogMessenger)
        }
    };

    let relay = Arc::new(Relay::new(
        config.relay_settings(),
        Arc::new(store),
        sender,
        github::default_formatters(),
        Arc::new(SystemClock),
    ));
    let report = relay.start().await.context("restoring relay state")?;
    info!(
        routes = report.routes_restored,
        routes_failed = report.routes_failed,
        dedup_entries = report.dedup_entries,
        history_records = report.history_records,
        "Relay state restored"
    );

    let maintenance = relay.sweeper().spawn(config.cleanup_interval());

    let app = listener::router(AppState {
        relay,
        base_url,
        admin_token: config.admin_token.clone(),
    });
    let addr = config.bind_addr()?;
    let socket = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let served = listener::serve(socket, app, shutdown_signal()).await;
    maintenance.abort();
    info!("Relay stopped");
    served.context("HTTP server failed")
}

async fn routes(config: &Config, target: Option<String>, as_json: bool) -> anyhow::Result<()> {
    let store = JsonFileStore::open(&config.state_file)
        .await
        .with_context(|| format!("opening state file {}", config.state_file.display()))?;
    let settings = config.relay_settings();
    let registry = RouteRegistry::new(Arc::new(store), settings.path_prefix);

    let target = target.and_then(TargetId::new);
    let routes = registry.list(target.as_ref()).await?;
    let base_url = config.base_url.as_deref().unwrap_or("");

    if as_json {
        let views: Vec<_> = routes
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "target_id": r.target_id,
                    "target_type": r.target_type,
                    "platform": r.platform,
                    "repository": r.repository,
                    "events": r.subscribed_events,
                    "enabled": r.enabled,
                    "created_at": r.created_at,
                    "webhook_url": registry.webhook_url(r, base_url),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if routes.is_empty() {
        println!("No routes.");
        return Ok(());
    }
    for route in &routes {
        let events: Vec<&str> = route.subscribed_events.iter().map(|e| e.as_str()).collect();
        println!(
            "{id}  {state:<8}  {target} ({kind}, {platform})  {repo}  [{events}]\n    {url}",
            id = route.id,
            state = if route.enabled { "enabled" } else { "disabled" },
            target = route.target_id,
            kind = route.target_type,
            platform = route.platform,
            repo = route.repository,
            events = events.join(", "),
            url = registry.webhook_url(route, base_url),
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
