//! Service log-watch.
//!
//! After a `nohup` launch, a watch task polls the service's redirected log
//! on the remote host until a ready or fail pattern shows up, mirroring the
//! outcome into `<var>.status` (and `<var>.ready_time` on success).
//!
//! Each poll opens a fresh SSH session and runs a small shell probe that
//! answers with one token of `NOTFOUND | FAIL | READY | WAITING`. Patterns
//! are fixed strings (`grep -F`). The fail check runs first, so a log that
//! holds both a startup banner and a later error reads as failed.
//!
//! ```text
//!   start ──▶ Checking ──READY──▶ Ready
//!                │ ──FAIL───▶ Failed
//!                │ ──elapsed ≥ timeout──▶ Timeout
//!                └─ NOTFOUND / WAITING / probe error: poll again
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::remote::RemoteRunner;
use crate::adapters::time::{unix_secs, uptime_ms};
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, SshConnectConfig};
use crate::automation::value::Value;
use crate::automation::variables::VariableStore;
use crate::config::CoreConfig;
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::{Error, Result};

pub const DEFAULT_TIMEOUT_SEC: u32 = 60;
pub const DEFAULT_CHECK_INTERVAL_MS: u32 = 3000;

/// Transport timeout of a single probe session.
const PROBE_TIMEOUT_MS: u32 = 5000;
/// Granularity at which a sleeping watch notices a stop request.
const STOP_POLL_MS: u64 = 100;
/// How long `stop` waits for the task to exit on its own.
const STOP_WAIT_MS: u64 = 2000;

const VAR_SOURCE: &str = "log_watch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogWatchConfig {
    pub host_id: String,
    pub log_file: String,
    pub ready_pattern: String,
    /// Empty disables the fail check.
    pub fail_pattern: String,
    pub var_name: String,
    pub timeout_sec: u32,
    pub check_interval_ms: u32,
}

impl LogWatchConfig {
    pub fn new(host_id: &str, log_file: &str, ready_pattern: &str, var_name: &str) -> Self {
        Self {
            host_id: host_id.into(),
            log_file: log_file.into(),
            ready_pattern: ready_pattern.into(),
            fail_pattern: String::new(),
            var_name: var_name.into(),
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        }
    }

    pub fn with_fail_pattern(mut self, pattern: &str) -> Self {
        self.fail_pattern = pattern.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.host_id.is_empty()
            || self.log_file.is_empty()
            || self.ready_pattern.is_empty()
            || self.var_name.is_empty()
        {
            return Err(Error::InvalidArgument("log watch needs host, log file, pattern and variable"));
        }
        Ok(())
    }

    fn status_var(&self) -> String {
        format!("{}.status", self.var_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Checking,
    Ready,
    Failed,
    Timeout,
}

impl WatchState {
    /// Value written to `<var>.status`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Checking
    }
}

/// Answer of one remote probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    NotFound,
    Fail,
    Ready,
    Waiting,
}

impl Probe {
    /// First recognised token in the probe output.
    pub fn parse(output: &str) -> Option<Self> {
        output.split_whitespace().find_map(|tok| match tok {
            "NOTFOUND" => Some(Self::NotFound),
            "FAIL" => Some(Self::Fail),
            "READY" => Some(Self::Ready),
            "WAITING" => Some(Self::Waiting),
            _ => None,
        })
    }
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The remote probe. The fail clause is left out when `fail` is empty.
pub fn probe_script(log_file: &str, ready: &str, fail: &str) -> String {
    let log = shell_quote(log_file);
    let mut script = format!("if [ ! -f {log} ]; then echo NOTFOUND\n");
    if !fail.is_empty() {
        script.push_str(&format!(
            "elif grep -qF {} {log} 2>/dev/null; then echo FAIL\n",
            shell_quote(fail)
        ));
    }
    script.push_str(&format!(
        "elif grep -qF {} {log} 2>/dev/null; then echo READY\n",
        shell_quote(ready)
    ));
    script.push_str("else echo WAITING\nfi");
    script
}

/// Transition for one poll. `None` keeps checking.
pub fn next_state(probe: Result<Probe>, elapsed_ms: u64, timeout_sec: u32) -> Option<WatchState> {
    match probe {
        Ok(Probe::Fail) => Some(WatchState::Failed),
        Ok(Probe::Ready) => Some(WatchState::Ready),
        Ok(Probe::NotFound | Probe::Waiting) | Err(_) => {
            (elapsed_ms >= u64::from(timeout_sec) * 1000).then_some(WatchState::Timeout)
        }
    }
}

struct Watch {
    id: u32,
    config: LogWatchConfig,
    /// Endpoint the service was launched on. `None` resolves `host_id`
    /// through the host store on every poll.
    target: Option<SshConnectConfig>,
    stop: AtomicBool,
    running: AtomicBool,
}

/// Handle onto a started watch.
#[derive(Clone)]
pub struct WatchHandle(Arc<Watch>);

impl WatchHandle {
    pub fn var_name(&self) -> &str {
        &self.0.config.var_name
    }

    pub fn is_running(&self) -> bool {
        self.0.running.load(Ordering::Acquire)
    }

    /// Block until the watch ends or `timeout_ms` passes. Returns whether
    /// it ended.
    pub fn wait(&self, timeout_ms: u64) -> bool {
        let deadline = uptime_ms() + timeout_ms;
        while self.is_running() {
            if uptime_ms() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

impl core::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.0.id)
            .field("var_name", &self.0.config.var_name)
            .field("running", &self.is_running())
            .finish()
    }
}

type Registry = Arc<Mutex<Vec<Arc<Watch>>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, Vec<Arc<Watch>>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct LogWatchEngine {
    runner: Arc<RemoteRunner>,
    vars: Arc<VariableStore>,
    sink: Option<Arc<dyn EventSink>>,
    watches: Registry,
    next_id: AtomicU32,
    stack_kb: usize,
    priority: u8,
}

impl LogWatchEngine {
    pub fn new(
        runner: Arc<RemoteRunner>,
        vars: Arc<VariableStore>,
        sink: Option<Arc<dyn EventSink>>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            runner,
            vars,
            sink,
            watches: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU32::new(1),
            stack_kb: usize::from(config.log_watch_stack_kb),
            priority: config.log_watch_priority,
        }
    }

    /// Start watching a stored host. A running watch on the same variable
    /// is stopped first.
    pub fn start(&self, config: LogWatchConfig) -> Result<WatchHandle> {
        self.launch(config, None)
    }

    /// Like [`start`](Self::start), but every probe connects to `target`
    /// instead of looking `host_id` up again. Used when the launch went to
    /// an endpoint the host store does not know (or knows differently).
    pub fn start_on(&self, config: LogWatchConfig, target: SshConnectConfig) -> Result<WatchHandle> {
        self.launch(config, Some(target))
    }

    fn launch(&self, config: LogWatchConfig, target: Option<SshConnectConfig>) -> Result<WatchHandle> {
        config.validate()?;

        let prior: Vec<Arc<Watch>> = lock(&self.watches)
            .iter()
            .filter(|w| w.config.var_name == config.var_name)
            .cloned()
            .collect();
        for w in prior {
            info!("LogWatch: replacing watch on '{}'", config.var_name);
            self.stop(&WatchHandle(w));
        }

        set_status(&self.vars, &config, WatchState::Checking);

        let watch = Arc::new(Watch {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            config,
            target,
            stop: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });
        lock(&self.watches).push(watch.clone());

        let task = WatchTask {
            watch: watch.clone(),
            runner: self.runner.clone(),
            vars: self.vars.clone(),
            sink: self.sink.clone(),
            registry: self.watches.clone(),
        };
        if let Err(e) = spawn_on_core(Core::App, self.priority, self.stack_kb, "ssh_log_watch\0", move || task.run()) {
            error!("LogWatch: task for '{}' not created", watch.config.var_name);
            watch.running.store(false, Ordering::Release);
            lock(&self.watches).retain(|w| w.id != watch.id);
            return Err(e);
        }

        info!(
            "LogWatch: started var={} pattern='{}' timeout={}s interval={}ms",
            watch.config.var_name, watch.config.ready_pattern, watch.config.timeout_sec, watch.config.check_interval_ms
        );
        Ok(WatchHandle(watch))
    }

    /// Ask the watch to stop and wait up to 2 s. A task that does not exit
    /// in time is detached; it exits at its next stop check without
    /// writing a status.
    pub fn stop(&self, handle: &WatchHandle) {
        let watch = &handle.0;
        watch.stop.store(true, Ordering::Release);
        if !handle.wait(STOP_WAIT_MS) {
            warn!("LogWatch: '{}' did not stop in time, detaching", watch.config.var_name);
        }
        lock(&self.watches).retain(|w| w.id != watch.id);
        info!("LogWatch: stopped '{}'", watch.config.var_name);
    }

    pub fn stop_all(&self) {
        let all: Vec<Arc<Watch>> = lock(&self.watches).clone();
        for w in &all {
            w.stop.store(true, Ordering::Release);
        }
        for w in all {
            self.stop(&WatchHandle(w));
        }
        info!("LogWatch: stopped all watches");
    }

    pub fn is_running(&self, var_name: &str) -> bool {
        lock(&self.watches)
            .iter()
            .any(|w| w.config.var_name == var_name && w.running.load(Ordering::Acquire))
    }

    pub fn active_count(&self) -> usize {
        lock(&self.watches)
            .iter()
            .filter(|w| w.running.load(Ordering::Acquire))
            .count()
    }
}

impl Drop for LogWatchEngine {
    fn drop(&mut self) {
        for w in lock(&self.watches).iter() {
            w.stop.store(true, Ordering::Release);
        }
    }
}

impl core::fmt::Debug for LogWatchEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LogWatchEngine")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

fn set_status(vars: &VariableStore, config: &LogWatchConfig, state: WatchState) {
    let name = config.status_var();
    match vars.upsert_internal(&name, Value::text(state.as_str()), VAR_SOURCE) {
        Ok(()) => info!("LogWatch: {} = {}", name, state.as_str()),
        Err(e) => warn!("LogWatch: failed to set {}: {}", name, e),
    }
}

struct WatchTask {
    watch: Arc<Watch>,
    runner: Arc<RemoteRunner>,
    vars: Arc<VariableStore>,
    sink: Option<Arc<dyn EventSink>>,
    registry: Registry,
}

impl WatchTask {
    fn stopped(&self) -> bool {
        self.watch.stop.load(Ordering::Acquire)
    }

    fn probe(&self) -> Result<Probe> {
        let c = &self.watch.config;
        let script = probe_script(&c.log_file, &c.ready_pattern, &c.fail_pattern);
        let out = match &self.watch.target {
            Some(target) => {
                let mut target = target.clone();
                target.timeout_ms = PROBE_TIMEOUT_MS;
                self.runner.exec(target, &script)?
            }
            None => self.runner.exec_on(&c.host_id, &script, PROBE_TIMEOUT_MS)?,
        };
        Probe::parse(&out.stdout).ok_or(Error::TransportFailure)
    }

    /// Sleep one interval; false when a stop arrived meanwhile.
    fn pause(&self) -> bool {
        let mut left = u64::from(self.watch.config.check_interval_ms);
        while left > 0 {
            if self.stopped() {
                return false;
            }
            let step = left.min(STOP_POLL_MS);
            std::thread::sleep(Duration::from_millis(step));
            left -= step;
        }
        !self.stopped()
    }

    fn run(self) {
        let c = &self.watch.config;
        let started = uptime_ms();
        let mut outcome = None;

        while !self.stopped() {
            let probe = self.probe();
            match &probe {
                Ok(p) => debug!("LogWatch: {} probe {:?}", c.var_name, p),
                Err(e) => warn!("LogWatch: {} probe failed (will retry): {}", c.var_name, e),
            }
            if let Some(state) = next_state(probe, uptime_ms() - started, c.timeout_sec) {
                outcome = Some(state);
                break;
            }
            if !self.pause() {
                break;
            }
        }

        // A stop request wins over anything found after it arrived.
        if let Some(state) = outcome.filter(|_| !self.stopped()) {
            set_status(&self.vars, c, state);
            if state == WatchState::Ready {
                let name = format!("{}.ready_time", c.var_name);
                if let Err(e) = self.vars.upsert_internal(&name, Value::Int(unix_secs() as i32), VAR_SOURCE) {
                    warn!("LogWatch: failed to set {}: {}", name, e);
                }
            }
            match state {
                WatchState::Failed => error!("LogWatch: '{}' matched in log of {}", c.fail_pattern, c.var_name),
                WatchState::Timeout => warn!("LogWatch: {} timed out after {}s", c.var_name, c.timeout_sec),
                _ => info!("LogWatch: {} is {}", c.var_name, state.as_str()),
            }
            if let Some(sink) = &self.sink {
                sink.emit(&AppEvent::WatchFinished {
                    var_name: c.var_name.clone(),
                    state,
                });
            }
        }

        lock(&self.registry).retain(|w| w.id != self.watch.id);
        self.watch.running.store(false, Ordering::Release);
        debug!("LogWatch: task for {} finished", c.var_name);
    }
}
