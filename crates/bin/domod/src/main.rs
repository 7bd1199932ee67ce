//! # domod — the domo hub daemon
//!
//! Composition root that wires the runtime, the entry store and the item
//! modules together and runs the daemon loop.
//!
//! ## Responsibilities
//! - Parse configuration (TOML file + env overrides)
//! - Initialize tracing
//! - Populate the type registry with the compiled-in modules
//! - Restore persisted items, then reconcile the declared item set
//! - Mirror bus events into the log
//! - Reload declarations on SIGHUP, shut down gracefully on SIGINT/SIGTERM
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;
mod signals;

use anyhow::Context;

use domo_adapter_storage_file::FileStore;
use domo_domain::entry::PROVIDER_FILE;
use domo_domain::event::Event;
use domo_runtime::event_bus::EventBus;
use domo_runtime::module::TypeRegistry;
use domo_runtime::registry::Registry;

use crate::config::Config;
use crate::signals::{DaemonSignal, Signals};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("DOMO_CONFIG").unwrap_or_else(|_| Config::DEFAULT_PATH.to_string());
    let config = Config::load(&config_path).context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.filter))
        .init();
    tracing::info!(config = %config_path, store = %config.store.path, "domod starting");

    let mut types = TypeRegistry::new();
    domo_adapter_virtual::register(&mut types).context("registering virtual item types")?;

    let bus = EventBus::new(config.events.capacity);
    let log_task = tokio::spawn(log_events(bus.subscribe()));

    let store = FileStore::new(config.store.path.as_str());
    let registry = Registry::new(types, store, bus);

    registry.load().await.context("restoring persisted items")?;
    let declared = config.entries().context("reading item declarations")?;
    registry.reload_provider(PROVIDER_FILE, declared).await;
    tracing::info!(items = registry.items().await.len(), "startup complete");

    let mut signals = Signals::install().context("installing signal handlers")?;
    loop {
        match signals.next().await {
            DaemonSignal::Reload => reload(&registry, &config_path).await,
            DaemonSignal::Shutdown => break,
        }
    }

    tracing::info!("shutting down");
    registry.shutdown().await;
    log_task.abort();
    Ok(())
}

/// Re-read the config file and reconcile the declared item set. A broken
/// file keeps the current items running.
async fn reload(registry: &Registry<FileStore>, config_path: &str) {
    let declared = match Config::load(config_path).and_then(|config| config.entries()) {
        Ok(declared) => declared,
        Err(error) => {
            tracing::error!(%error, "config reload failed, keeping current items");
            return;
        }
    };
    tracing::info!(items = declared.len(), "reloading declared items");
    registry.reload_provider(PROVIDER_FILE, declared).await;
    tracing::info!(items = registry.items().await.len(), "reload complete");
}

/// Mirror every bus event into the log.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<Event>) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match rx.recv().await {
            Ok(event) => match &event.item {
                Some(item) => {
                    tracing::info!(kind = %event.event_type, %item, data = %event.data, "event");
                }
                None => tracing::info!(kind = %event.event_type, data = %event.data, "event"),
            },
            Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}
