// src/logging.rs

//! Logging setup: console output, a daily-rolling file in the day-local
//! log directory, and a broadcast feed of formatted lines that the hub
//! client forwards to the dashboard as `log_update` events.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `FILEJOBROUTER_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::cli::LogLevel;

/// Capacity of the log-line broadcast channel; slow consumers lag and
/// drop lines rather than blocking logging.
const LOG_BROADCAST_CAPACITY: usize = 1024;

const LOG_FILE_PREFIX: &str = "filejobrouter.log";

/// Initialise the global subscriber. Safe to call once at startup.
///
/// Returns the broadcast sender for streamed log lines and the file
/// appender guard; keep both alive for the process lifetime.
pub fn init_logging(
    cli_level: Option<LogLevel>,
    log_dir: &Path,
) -> Result<(broadcast::Sender<String>, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {:?}", log_dir))?;

    let level = match cli_level {
        Some(lvl) => level_str(lvl).to_string(),
        None => std::env::var("FILEJOBROUTER_LOG").unwrap_or_else(|_| "info".to_string()),
    };
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let (log_tx, _) = broadcast::channel(LOG_BROADCAST_CAPACITY);
    let broadcast_layer = BroadcastLayer {
        tx: log_tx.clone(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking))
        .with(broadcast_layer)
        .init();

    Ok((log_tx, guard))
}

fn level_str(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Layer that renders each event to a single line and broadcasts it.
struct BroadcastLayer {
    tx: broadcast::Sender<String>,
}

impl<S> Layer<S> for BroadcastLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();

        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let line = format!("{} {}: {}", metadata.level(), metadata.target(), message);

        // No subscribers is fine; the hub may be disconnected.
        let _ = self.tx.send(line);
    }
}

/// Visitor extracting the `message` field from a tracing event.
struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{:?}", value);
        } else if self.0.is_empty() {
            *self.0 = format!("{}: {:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" || self.0.is_empty() {
            *self.0 = value.to_string();
        }
    }
}
