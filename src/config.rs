//! Core configuration parameters
//!
//! All tunables of the automation core. Values can be overridden via NVS
//! (namespace `ts_core`, see [`NvsAdapter`](crate::adapters::nvs::NvsAdapter)).

use serde::{Deserialize, Serialize};

/// Default capacity of the action queue (entries).
pub const ACTION_QUEUE_CAPACITY: usize = 32;

/// Output text carried in an action result (bytes).
pub const ACTION_OUTPUT_MAX: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    // --- Variables ---
    /// Maximum number of registered variables
    pub max_variables: u16,

    // --- Action executor ---
    /// Executor task stack (KiB)
    pub executor_stack_kb: u16,
    /// Executor task priority
    pub executor_priority: u8,
    /// How long `queue` waits for a free slot (milliseconds)
    pub enqueue_wait_ms: u32,
    /// Worker idle wake-up period (milliseconds)
    pub worker_idle_ms: u32,
    /// Sync execute deadline for non-SSH kinds (milliseconds)
    pub sync_deadline_ms: u32,
    /// Sync execute deadline for SSH and SSH-ref (milliseconds)
    pub ssh_sync_deadline_ms: u32,
    /// SSH transport timeout when the host gives none (milliseconds)
    pub ssh_default_timeout_ms: u32,

    // --- Log-watch ---
    /// Log-watch task stack (KiB)
    pub log_watch_stack_kb: u16,
    /// Log-watch task priority
    pub log_watch_priority: u8,

    // --- Persistence ---
    /// Mount point of the removable medium
    pub media_root: String,
    /// Deferred loader delay for the host store (milliseconds)
    pub hosts_load_delay_ms: u32,
    /// Deferred loader delay for the command store (milliseconds)
    pub commands_load_delay_ms: u32,
    /// Deferred loader delay for the action template store (milliseconds)
    pub templates_load_delay_ms: u32,
    /// Delay before a scheduled file export runs (milliseconds)
    pub file_sync_delay_ms: u32,
    /// Spawn deferred loaders and async file exports. Tests turn this off
    /// and drive reconciliation directly.
    pub background_tasks: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            // Variables
            max_variables: 128,

            // Action executor
            executor_stack_kb: 16,
            executor_priority: 5,
            enqueue_wait_ms: 100,
            worker_idle_ms: 1000,
            sync_deadline_ms: 30_000,
            ssh_sync_deadline_ms: 60_000,
            ssh_default_timeout_ms: 10_000,

            // Log-watch
            log_watch_stack_kb: 8,
            log_watch_priority: 3,

            // Persistence
            media_root: String::from("/sdcard"),
            hosts_load_delay_ms: 2500,
            commands_load_delay_ms: 2000,
            templates_load_delay_ms: 3500,
            file_sync_delay_ms: 500,
            background_tasks: true,
        }
    }
}

impl CoreConfig {
    /// Range-check every field; the message names the offending field.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(1..=1024).contains(&self.max_variables) {
            return Err("max_variables must be 1–1024");
        }
        if self.executor_stack_kb < 16 {
            return Err("executor_stack_kb must be at least 16");
        }
        if self.log_watch_stack_kb < 8 {
            return Err("log_watch_stack_kb must be at least 8");
        }
        if !(10..=5000).contains(&self.enqueue_wait_ms) {
            return Err("enqueue_wait_ms must be 10–5000");
        }
        if self.sync_deadline_ms == 0 || self.ssh_sync_deadline_ms == 0 {
            return Err("sync deadlines must be non-zero");
        }
        if self.media_root.is_empty() || !self.media_root.starts_with('/') {
            return Err("media_root must be an absolute path");
        }
        Ok(())
    }
}
