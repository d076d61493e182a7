// src/engine/context.rs

//! The process context: everything the components share, constructed
//! once at startup and passed explicitly. There is no global mutable
//! state in this crate.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::config::model::Settings;
use crate::hub::HubHandle;
use crate::queue::record::RecordWriter;
use crate::queue::QueueStore;

/// Shared state of one engine run.
///
/// `settings` is the validated configuration with all directory fields
/// resolved to absolute paths; only the tunables (`TimeoutSeconds`,
/// `MaxRetryCount`) are ever reread after startup, and those live in
/// the processor, not here.
#[derive(Debug)]
pub struct EngineContext {
    pub settings: Settings,
    /// Where the settings came from; the processor rereads tunables
    /// from here.
    pub config_path: PathBuf,
    /// Day partition fixed at startup.
    pub day: String,
    /// OS user the engine runs as.
    pub user: String,
    pub store: QueueStore,
    pub records: RecordWriter,
    pub hub: HubHandle,
    pub cancel: CancellationToken,
}
