//! vr-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) and `VR_*`
//! environment variables, opens the SQLite report store, starts the
//! contact-change listener in the background, and serves the report API over
//! HTTP until interrupted.

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use vr_api::AppState;
use vr_core::transport::{Subscription, Topic};
use vr_store_sqlite::SqliteStore;
use vr_sync::{ContactChangeListener, EventPublisher};

use crate::settings::{ServerConfig, TransportKind};

#[derive(Parser)]
#[command(author, version, about = "Visit report service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config).context("failed to load configuration")?;

  let store_path = cfg.expanded_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  match cfg.transport {
    TransportKind::Memory => {
      let inbound = vr_bus::MemoryTopic::new(cfg.inbound_topic.clone());
      let subscription = inbound
        .subscribe_with_limit(cfg.subscription.clone(), cfg.max_delivery_count)
        .context("failed to subscribe to inbound topic")?;
      let outbound = vr_bus::MemoryTopic::new(cfg.outbound_topic.clone());
      warn!("memory transport: contact changes and report events stay in this process");

      serve(&cfg, store, outbound, subscription).await?;
      inbound.close();
    }
    TransportKind::Amqp => amqp(&cfg, store).await?,
  }

  Ok(())
}

#[cfg(feature = "amqp")]
async fn amqp(cfg: &ServerConfig, store: Arc<SqliteStore>) -> anyhow::Result<()> {
  let prefetch = u16::try_from(cfg.max_in_flight).unwrap_or(u16::MAX);
  let subscription = vr_bus::AmqpSubscription::connect(
    &cfg.amqp_url,
    &cfg.inbound_topic,
    cfg.subscription.clone(),
    prefetch,
  )
  .await
  .context("failed to subscribe to inbound exchange")?;
  let outbound = vr_bus::AmqpTopic::connect(&cfg.amqp_url, cfg.outbound_topic.clone())
    .await
    .context("failed to connect outbound exchange")?;

  serve(cfg, store, outbound, subscription).await
}

#[cfg(not(feature = "amqp"))]
async fn amqp(_cfg: &ServerConfig, _store: Arc<SqliteStore>) -> anyhow::Result<()> {
  anyhow::bail!("transport `amqp` requires building vr-server with the `amqp` feature")
}

/// Run the listener and the HTTP server until ctrl-c, then stop the listener
/// and wait for its in-flight deliveries.
async fn serve<T, Sub>(
  cfg: &ServerConfig,
  store: Arc<SqliteStore>,
  outbound: T,
  subscription: Sub,
) -> anyhow::Result<()>
where
  T: Topic + 'static,
  Sub: Subscription,
{
  let publisher = Arc::new(EventPublisher::new(outbound).with_deadline(cfg.publish_deadline()));
  let listener = Arc::new(ContactChangeListener::new(store.clone(), cfg.listener_config()));

  let (stop_tx, mut stop_rx) = watch::channel(false);
  let listener_task = tokio::spawn(listener.run(subscription, async move {
    let _ = stop_rx.changed().await;
  }));

  let app = vr_api::api_router(AppState::new(store, publisher));
  let address = cfg.address();

  info!("Listening on http://{address}");
  let tcp = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(tcp, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  let _ = stop_tx.send(true);
  listener_task.await.context("listener task failed")?;
  info!("shut down");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!("shutdown requested");
}
