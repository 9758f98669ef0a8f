//! Genie Gateway
//!
//! Long-running HTTP server forwarding user chats to the Genie completion
//! service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::broadcast;
use tracing::{error, info};

use genie_client::GenieClient;
use genie_gateway::{AppState, GatewayConfig, Result, router};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (default: ~/.config/genie-gateway/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    listen: Option<SocketAddr>,
}

/// Initializes structured logging with tracing.
///
/// Supports two output formats via `GENIE_LOG_FORMAT` environment variable:
/// - `json`: Machine-readable JSON logs
/// - `pretty`: Human-readable formatted logs (default)
///
/// Log level is controlled via `RUST_LOG` environment variable.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("GENIE_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("genie_gateway=info,genie_client=info,tower_http=info"));

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::load(args.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok())?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    info!("Starting Genie gateway");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            if args.config.is_none()
                && let Ok(path) = GatewayConfig::config_path()
            {
                error!("Looked for config at: {}", path.display());
            }
            return Err(e);
        }
    };

    info!(
        model = %config.genie.model,
        completion_url = %config.genie.completion_url,
        "Loaded configuration"
    );

    let client = GenieClient::new(config.genie.clone())?;
    let state = AppState::new(Arc::new(client), config.email_domain.as_str());
    let app = router(state, config.max_body_bytes);

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    // Set up signal handlers
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();
    tokio::spawn(async move {
        use futures::stream::StreamExt;
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    let _ = shutdown_tx.send(());
                    break;
                }
                SIGINT => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    let _ = shutdown_tx.send(());
                    break;
                }
                _ => {}
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    handle.close();
    info!("Gateway shutdown complete");

    Ok(())
}
