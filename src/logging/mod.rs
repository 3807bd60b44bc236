//! Console logging via `tracing`.
//!
//! Hosts embedding the services call [`setup_tracing`] once during startup. The services
//! themselves only emit events and never install a subscriber.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RUST_LOG` | Log filter (e.g. `info`, `littlebit_services=debug`) | `info` |
//!
//! Without the `pretty_logs` feature, output is plain text suitable for log aggregation:
//! ```text
//! INFO  littlebit_services::services: Initializing services... [sign_in{username=jane}]
//! ```
//!
//! With `pretty_logs`, output is colorized with timestamps and span nesting:
//! ```text
//! 14:32:01.234 INFO  | littlebit_services::services: Initializing services...
//! ```

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[cfg(feature = "pretty_logs")]
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(not(feature = "pretty_logs"))]
mod production;

#[cfg(feature = "pretty_logs")]
mod pretty;

const DEFAULT_FILTER: &str = "info";

/// Installs the console subscriber as global default.
///
/// Fails if another global subscriber has already been installed.
pub fn setup_tracing() -> anyhow::Result<()> {
    Registry::default()
        .with(console_layer(filter_from_env()))
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    tracing::info!("Tracing initialized successfully [reporting to console]");
    Ok(())
}

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(feature = "pretty_logs")]
fn console_layer(filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW)
        .event_format(pretty::PrettyLogFormat)
        .with_filter(filter)
        .boxed()
}

#[cfg(not(feature = "pretty_logs"))]
fn console_layer(filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(production::PlainLogFormat)
        .with_filter(filter)
        .boxed()
}
