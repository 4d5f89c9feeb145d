//! TianShan automation core: firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │  NvsAdapter   SdCardStore   ConsoleAdapter   ConsoleLeds      │
//! │  GpioDriver   UnavailableSsh   LogEventSink                  │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ─────────────────       │
//! │                                                              │
//! │  VariableStore · HostStore · CommandStore · Keystore         │
//! │  ActionManager ─▶ ActionExecutor ─▶ LogWatchEngine           │
//! │  ActionTemplateStore                                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use tscore::adapters::console::ConsoleAdapter;
use tscore::adapters::leds::ConsoleLeds;
use tscore::adapters::log_sink::LogEventSink;
use tscore::adapters::nvs::NvsAdapter;
use tscore::adapters::sdcard::SdCardStore;
use tscore::adapters::ssh::UnavailableSsh;
use tscore::app::ports::{ConfigPort, ConsolePort, EventSink, FileStore};
use tscore::automation::variables::{VarFlags, Variable};
use tscore::automation::{
    ActionExecutor, ActionManager, ActionTemplateStore, ExecutorDeps, Value, VariableStore,
};
use tscore::config::CoreConfig;
use tscore::drivers::gpio::GpioDriver;
use tscore::ssh::{CommandStore, HostStore, Keystore, LogWatchEngine, RemoteRunner};

/// How often persistent variables are flushed to NVS.
const VARIABLE_SAVE_PERIOD: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("TianShan core v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. NVS + config ───────────────────────────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            CoreConfig::default()
        }
    };

    // ── 3. Adapters ───────────────────────────────────────────
    let sink: Arc<dyn EventSink> = Arc::new(LogEventSink::new());
    let files: Arc<dyn FileStore> = Arc::new(SdCardStore::new(config.media_root.as_str()));
    let console: Arc<dyn ConsolePort> = Arc::new(ConsoleAdapter::new());
    let leds = Arc::new(ConsoleLeds::new(console.clone()));
    let gpio = Arc::new(GpioDriver::new());

    // ── 4. Stores ─────────────────────────────────────────────
    let vars = Arc::new(VariableStore::new(usize::from(config.max_variables), Some(sink.clone())));
    vars.init();
    vars.register(Variable::new("system.uptime_s", "system", Value::Int(0)).with_flags(VarFlags::READ_ONLY))?;
    vars.register(Variable::new("system.boot_count", "system", Value::Int(0)).with_flags(VarFlags {
        read_only: true,
        persistent: true,
    }))?;
    let mut store = nvs.handle();
    match vars.load_all(store.as_ref()) {
        Ok(n) => info!("Restored {} persistent variables", n),
        Err(e) => warn!("Variable restore skipped: {}", e),
    }
    let boots = vars.get_int("system.boot_count").unwrap_or(0).saturating_add(1);
    vars.set_internal("system.boot_count", Value::Int(boots))?;
    if let Err(e) = vars.save_all(store.as_mut()) {
        warn!("Variable save failed: {}", e);
    }

    let keystore = Arc::new(Keystore::new(files.clone()));
    keystore.init(nvs.handle());

    let hosts = HostStore::new(files.clone(), &config);
    hosts.init(nvs.handle())?;
    let commands = CommandStore::new(files.clone(), &config);
    commands.init(nvs.handle())?;
    commands.attach_variables(vars.clone());

    // ── 5. Remote execution + log-watch ───────────────────────
    warn!("No SSH client linked: SSH actions and log-watch probes will fail to connect");
    let runner = Arc::new(RemoteRunner::new(
        Arc::new(UnavailableSsh),
        hosts.clone(),
        keystore.clone(),
        files.clone(),
        config.ssh_default_timeout_ms,
    ));
    let log_watch = Arc::new(LogWatchEngine::new(runner.clone(), vars.clone(), Some(sink.clone()), &config));

    // ── 6. Dispatcher ─────────────────────────────────────────
    let executor = ActionExecutor::new(ExecutorDeps {
        vars: vars.clone(),
        runner,
        commands: commands.clone(),
        log_watch: log_watch.clone(),
        console,
        gpio,
        leds,
    });
    let manager: ActionManager = ActionManager::new(executor, Some(sink), &config);
    manager.init()?;

    let templates = ActionTemplateStore::new(files, &config);
    templates.init(nvs.handle())?;

    info!(
        "Core ready: {} hosts, {} commands, {} templates, {} keys",
        hosts.count(),
        commands.count(),
        templates.count(),
        keystore.list_keys().map(|k| k.len()).unwrap_or(0)
    );

    // ── 7. Housekeeping loop ──────────────────────────────────
    let mut uptime_s: i32 = 0;
    loop {
        std::thread::sleep(VARIABLE_SAVE_PERIOD);
        uptime_s = uptime_s.saturating_add(VARIABLE_SAVE_PERIOD.as_secs() as i32);
        if let Err(e) = vars.set_internal("system.uptime_s", Value::Int(uptime_s)) {
            warn!("uptime variable: {}", e);
        }
        if let Err(e) = vars.save_all(store.as_mut()) {
            warn!("Variable save failed: {}", e);
        }
        let stats = manager.stats();
        info!(
            "Actions: {} run, {} ok, {} failed, {} timeout, queue peak {}, {} watches",
            stats.total_executed,
            stats.total_success,
            stats.total_failed,
            stats.total_timeout,
            stats.queue_high_water,
            log_watch.active_count()
        );
    }
}
