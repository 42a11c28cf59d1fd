//! Herald event fanout service.
//!
//! Reads newline-delimited JSON events from stdin, fans each one out to its
//! webhook subscribers (or the enabled integrations when there are none),
//! and delivers them on a pool of workers. EOF, Ctrl-C or SIGTERM drain the
//! queue and stop the workers.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use herald_core::Attributes;
use herald_delivery::{DeliveryEngine, IntegrationRegistry};
use herald_dispatch::{Config, Dispatcher, InMemorySubscriberRegistry};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!(
        worker_count = config.delivery.worker_count,
        queue_capacity = config.delivery.queue_capacity,
        max_attempts = config.retry.max_attempts,
        subscribers = config.subscribers.len(),
        "configuration loaded"
    );

    let integrations = IntegrationRegistry::from_config(&config.integrations);
    for adapter in integrations.enabled() {
        info!(integration = %adapter.kind(), "integration enabled");
    }

    let mut engine = DeliveryEngine::new(config.to_engine_config(), integrations)
        .context("failed to create delivery engine")?;

    let registry =
        Arc::new(InMemorySubscriberRegistry::from_subscribers(config.subscribers.clone()));
    let dispatcher = Dispatcher::new(registry, engine.integrations(), engine.queue())
        .with_max_attempts(config.retry.max_attempts);

    engine.start().context("failed to start delivery engine")?;
    info!("herald is ready, reading events from stdin");

    tokio::select! {
        result = read_events(&dispatcher) => result?,
        () = shutdown_signal() => {},
    }

    let stats = engine.stats();
    info!(
        queued = stats.tasks_queued,
        succeeded = stats.succeeded,
        skipped = stats.skipped,
        failed = stats.permanent_failures,
        in_flight = stats.in_flight,
        "shutting down"
    );

    engine.shutdown().await.context("delivery engine did not shut down cleanly")?;

    info!("herald shutdown complete");
    Ok(())
}

/// Initializes tracing, preferring `RUST_LOG` over the configured filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

/// Triggers one event per stdin line until EOF.
async fn read_events(dispatcher: &Dispatcher) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (name, attributes) = match parse_event_line(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "skipping malformed event line");
                continue;
            },
        };

        // Failures are logged by the dispatcher; the next line is independent.
        if let Err(e) = dispatcher.trigger_event(name, attributes) {
            debug!(error = %e, "event not dispatched");
        }
    }

    info!("stdin closed");
    Ok(())
}

/// Splits `{"event": name, ...attributes}` into the name and the attributes.
fn parse_event_line(line: &str) -> Result<(String, Attributes)> {
    let value: Value = serde_json::from_str(line).context("invalid JSON")?;
    let Value::Object(mut attributes) = value else {
        bail!("event line must be a JSON object");
    };

    match attributes.remove("event") {
        Some(Value::String(name)) => Ok((name, attributes)),
        Some(other) => bail!("`event` must be a string, got {other}"),
        None => bail!("missing `event` field"),
    }
}

/// Waits for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c"),
            Err(e) => {
                error!(error = %e, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received SIGTERM");
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
