// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod hub;
pub mod lock;
pub mod logging;
pub mod paths;
pub mod queue;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader;
use crate::config::model::Settings;
use crate::engine::{EngineContext, Processor};
use crate::errors::Result;
use crate::hub::OutboundMessage;
use crate::lock::{DeviceLock, InstanceGuard};
use crate::queue::record::RecordWriter;
use crate::queue::QueueStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - logging (console + day-local file + dashboard stream)
/// - instance guard
/// - queue store / watcher / processor
/// - dashboard hub client
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = loader::effective_config_path(args.config.as_deref());
    let mut settings = loader::load_and_validate(&config_path)?;

    let root = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    resolve_settings_paths(&mut settings, &root);

    if args.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    let day = paths::startup_day();
    let user = paths::current_user();
    let log_dir = paths::day_log_dir(&settings.log_directory, &user, &day);

    let (log_tx, _log_guard) = logging::init_logging(args.log_level, &log_dir)?;

    info!(
        config = %config_path.display(),
        day = %day,
        user = %user,
        "filejobrouter starting"
    );

    // One engine per host; fatal with a clear diagnostic otherwise.
    let mut instance = InstanceGuard::acquire(&log_dir)?;

    let cancel = CancellationToken::new();
    let (retry_tx, retry_rx) = mpsc::channel::<String>(16);

    let hub = hub::spawn_hub_client(retry_tx, log_tx.subscribe(), cancel.clone());
    hub.send(OutboundMessage::system_status("Starting", "engine starting"));

    let store = QueueStore::new(&settings.queue_base_directory, &day);
    let records = RecordWriter::new(paths::day_jobs_dir(&settings.jobs_directory, &user, &day));
    let mutex_name = settings.mutex_name.clone();

    let ctx = Arc::new(EngineContext {
        settings,
        config_path,
        day,
        user,
        store,
        records,
        hub: hub.clone(),
        cancel: cancel.clone(),
    });

    let _watcher = watch::spawn_watcher(Arc::clone(&ctx))?;

    // Pre-existing files go through the same intake pipeline.
    {
        let boot_ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            watch::bootstrap_scan(boot_ctx).await;
        });
    }

    // Ctrl-C -> graceful shutdown.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received; shutting down");
            cancel.cancel();
        });
    }

    let processor = Processor::new(Arc::clone(&ctx), DeviceLock::new(&mutex_name), retry_rx);
    let result = processor.run().await;

    hub.send(OutboundMessage::system_status("Stopped", "engine stopped"));
    instance.release();

    result
}

/// Resolve relative directory settings against the solution root and
/// pin down the watch root so event paths relativise cleanly.
fn resolve_settings_paths(settings: &mut Settings, root: &Path) {
    settings.watch_directory = paths::resolve_against_root(root, &settings.watch_directory);
    if let Ok(canonical) = settings.watch_directory.canonicalize() {
        settings.watch_directory = canonical;
    }
    settings.log_directory = paths::resolve_against_root(root, &settings.log_directory);
    settings.jobs_directory = paths::resolve_against_root(root, &settings.jobs_directory);
    settings.queue_base_directory =
        paths::resolve_against_root(root, &settings.queue_base_directory);
    for mapping in settings.mappings.values_mut() {
        mapping.output_directory = paths::resolve_against_root(root, &mapping.output_directory);
    }
}

/// Simple dry-run output: print the routing table without executing
/// anything.
fn print_dry_run(settings: &Settings) {
    println!("filejobrouter dry-run");
    println!("  WatchDirectory = {}", settings.watch_directory.display());
    println!("  TimeoutSeconds = {}", settings.timeout_seconds);
    println!("  MaxRetryCount  = {}", settings.max_retry_count);
    if let Some(default) = settings.default_worker_for_root.as_deref() {
        println!("  DefaultWorkerForRoot = {default}");
    }
    println!();

    println!("mappings ({}):", settings.mappings.len());
    for (key, mapping) in settings.mappings.iter() {
        println!("  - {key}");
        println!("      exec:   {}", mapping.executable_path);
        println!("      output: {}", mapping.output_directory.display());
    }
}
