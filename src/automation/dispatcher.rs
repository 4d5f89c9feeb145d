//! Action dispatcher: a bounded queue feeding one executor task.
//!
//! ```text
//!  callers ──queue()/execute()──▶ Channel<QueueEntry, N> ──▶ worker (Core::App)
//!                                                             │
//!            ◀── Signal<ActionResult> (sync execute only) ────┘
//! ```
//!
//! Actions run strictly in FIFO order on a single worker so durable writes
//! made by executors never race each other. `delay_ms` is slept on the
//! worker, so delays are serial.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use async_io_mini::Timer;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, info, warn};

use super::action::{Action, ActionResult, ActionStatus, ActionType};
use super::executors::{ActionExecutor, RuntimeHost};
use crate::adapters::time::uptime_ms;
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::config::{ACTION_QUEUE_CAPACITY, CoreConfig};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::{Error, Result};

/// Invoked on the worker after an action completes. Captures whatever
/// context the caller needs.
pub type Callback = Box<dyn FnOnce(&Action, &ActionResult) + Send>;

type Completion = Signal<CriticalSectionRawMutex, ActionResult>;

struct QueueEntry {
    action: Action,
    callback: Option<Callback>,
    priority: u8,
    enqueued_ms: u64,
    done: Option<Arc<Completion>>,
}

/// Aggregate counters, readable at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStats {
    pub total_executed: u32,
    pub total_success: u32,
    pub total_failed: u32,
    pub total_timeout: u32,
    pub ssh_commands: u32,
    pub led_actions: u32,
    pub gpio_actions: u32,
    /// Deepest queue observed right after an enqueue.
    pub queue_high_water: u32,
}

impl ActionStats {
    fn record(&mut self, kind: ActionType, status: ActionStatus) {
        self.total_executed += 1;
        match status {
            ActionStatus::Success => self.total_success += 1,
            ActionStatus::Timeout => self.total_timeout += 1,
            _ => self.total_failed += 1,
        }
        match kind {
            ActionType::Ssh | ActionType::SshRef => self.ssh_commands += 1,
            ActionType::Led => self.led_actions += 1,
            ActionType::Gpio => self.gpio_actions += 1,
            _ => {}
        }
    }
}

/// State shared between callers and the worker task.
struct Shared<const N: usize> {
    queue: Channel<CriticalSectionRawMutex, QueueEntry, N>,
    executor: ActionExecutor,
    stats: Mutex<ActionStats>,
    running: AtomicBool,
    sink: Option<Arc<dyn EventSink>>,
    idle: Duration,
}

impl<const N: usize> Shared<N> {
    fn stats(&self) -> MutexGuard<'_, ActionStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Worker loop: wake at least every idle period to notice shutdown.
    fn run(&self) {
        info!("ActionManager: executor task started");
        while self.running.load(Ordering::Acquire) {
            let next = future::block_on(future::or(async { Some(self.queue.receive().await) }, async {
                Timer::after(self.idle).await;
                None
            }));
            if let Some(entry) = next {
                self.process(entry);
            }
        }
        info!("ActionManager: executor task stopped");
    }

    fn process(&self, entry: QueueEntry) {
        let QueueEntry {
            action,
            callback,
            priority,
            enqueued_ms,
            done,
        } = entry;
        let kind = action.action_type();
        let started = uptime_ms();
        debug!(
            "ActionManager: running {} (prio={}, waited {}ms)",
            kind.name(),
            priority,
            started.saturating_sub(enqueued_ms)
        );

        if action.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(u64::from(action.delay_ms)));
        }
        let mut result = self.executor.run(&action);
        // Measured from before the delay.
        result.duration_ms = uptime_ms().saturating_sub(started) as u32;

        self.stats().record(kind, result.status);
        debug!(
            "ActionManager: {} -> {} in {}ms",
            kind.name(),
            result.status.name(),
            result.duration_ms
        );

        if let Some(cb) = callback {
            cb(&action, &result);
        }
        if let Some(sink) = &self.sink {
            sink.emit(&AppEvent::ActionCompleted {
                kind,
                status: result.status,
                duration_ms: result.duration_ms,
            });
        }
        if let Some(done) = done {
            done.signal(result);
        }
    }
}

/// Queue front-end and owner of the executor task.
///
/// `N` is the queue capacity.
pub struct ActionManager<const N: usize = ACTION_QUEUE_CAPACITY> {
    shared: Arc<Shared<N>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    enqueue_wait: Duration,
    sync_deadline: Duration,
    ssh_sync_deadline: Duration,
    stack_kb: usize,
    priority: u8,
}

impl<const N: usize> ActionManager<N> {
    pub fn new(executor: ActionExecutor, sink: Option<Arc<dyn EventSink>>, config: &CoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Channel::new(),
                executor,
                stats: Mutex::new(ActionStats::default()),
                running: AtomicBool::new(false),
                sink,
                idle: Duration::from_millis(u64::from(config.worker_idle_ms)),
            }),
            worker: Mutex::new(None),
            enqueue_wait: Duration::from_millis(u64::from(config.enqueue_wait_ms)),
            sync_deadline: Duration::from_millis(u64::from(config.sync_deadline_ms)),
            ssh_sync_deadline: Duration::from_millis(u64::from(config.ssh_sync_deadline_ms)),
            stack_kb: usize::from(config.executor_stack_kb),
            priority: config.executor_priority,
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the executor task. A second call is a no-op.
    pub fn init(&self) -> Result<()> {
        let mut slot = self.worker_slot();
        if slot.is_some() {
            warn!("ActionManager: already initialized");
            return Ok(());
        }
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        match spawn_on_core(Core::App, self.priority, self.stack_kb, "action_exec\0", move || shared.run()) {
            Ok(handle) => {
                *slot = Some(handle);
                info!("ActionManager: initialized (queue={}, stack={}KB)", N, self.stack_kb);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Stop the worker after the in-flight action and drop pending entries.
    pub fn deinit(&self) {
        let handle = self.worker_slot().take();
        let Some(handle) = handle else {
            return;
        };
        self.shared.running.store(false, Ordering::Release);
        if handle.join().is_err() {
            warn!("ActionManager: executor task panicked");
        }
        let dropped = self.cancel_all();
        info!("ActionManager: deinitialized ({} pending dropped)", dropped);
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn ensure_up(&self) -> Result<()> {
        if self.is_initialized() { Ok(()) } else { Err(Error::Uninitialized) }
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.shared.executor
    }

    fn enqueue(&self, entry: QueueEntry) -> Result<()> {
        let queue = &self.shared.queue;
        let sent = match queue.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => future::block_on(future::or(
                async {
                    queue.send(entry).await;
                    true
                },
                async {
                    Timer::after(self.enqueue_wait).await;
                    false
                },
            )),
        };
        if !sent {
            warn!("ActionManager: queue full");
            return Err(Error::QueueFull);
        }
        let depth = queue.len() as u32;
        let mut stats = self.shared.stats();
        stats.queue_high_water = stats.queue_high_water.max(depth);
        Ok(())
    }

    /// Copy `action` into the queue. Waits up to the configured enqueue
    /// wait for a free slot.
    pub fn queue(&self, action: Action, callback: Option<Callback>, priority: u8) -> Result<()> {
        self.ensure_up()?;
        debug!("ActionManager: queue {} (prio={})", action.action_type().name(), priority);
        self.enqueue(QueueEntry {
            action,
            callback,
            priority,
            enqueued_ms: uptime_ms(),
            done: None,
        })
    }

    /// Run `action` on the worker and wait for it.
    ///
    /// `result` is always filled. Returns `Ok` only when the action
    /// succeeded; a deadline miss yields [`Error::Timeout`] with a
    /// `Timeout` status, any other outcome [`Error::ActionFailed`].
    pub fn execute(&self, action: &Action, result: &mut ActionResult) -> Result<()> {
        self.ensure_up()?;
        let deadline = if action.action_type().is_ssh() {
            self.ssh_sync_deadline
        } else {
            self.sync_deadline
        };
        let done = Arc::new(Completion::new());
        if let Err(e) = self.enqueue(QueueEntry {
            action: action.clone(),
            callback: None,
            priority: 0,
            enqueued_ms: uptime_ms(),
            done: Some(Arc::clone(&done)),
        }) {
            *result = ActionResult::failed("Action queue full");
            return Err(e);
        }

        let outcome = future::block_on(future::or(async { Some(done.wait().await) }, async {
            Timer::after(deadline).await;
            None
        }));
        match outcome {
            Some(r) => {
                *result = r;
                if result.is_success() {
                    Ok(())
                } else {
                    Err(result.error.unwrap_or(Error::ActionFailed))
                }
            }
            None => {
                warn!(
                    "ActionManager: {} missed its {}ms deadline",
                    action.action_type().name(),
                    deadline.as_millis()
                );
                *result = ActionResult {
                    status: ActionStatus::Timeout,
                    timestamp_ms: uptime_ms(),
                    ..ActionResult::default()
                };
                result.set_output("Execution timeout");
                Err(Error::Timeout)
            }
        }
    }

    /// Execute `actions` one after another. With `stop_on_error` the first
    /// failure ends the run and is returned.
    pub fn execute_sequence(&self, actions: &[Action], stop_on_error: bool) -> Result<()> {
        if actions.is_empty() {
            return Err(Error::InvalidArgument("empty action sequence"));
        }
        let mut result = ActionResult::default();
        for (i, action) in actions.iter().enumerate() {
            if let Err(e) = self.execute(action, &mut result) {
                warn!("ActionManager: action {} failed: {}", i, result.output);
                if stop_on_error {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Drop every queued entry; the running action is unaffected. Sync
    /// callers waiting on a dropped entry are released with `Cancelled`.
    pub fn cancel_all(&self) -> usize {
        let mut drained = 0;
        while let Ok(entry) = self.shared.queue.try_receive() {
            drained += 1;
            if let Some(done) = entry.done {
                let mut r = ActionResult {
                    status: ActionStatus::Cancelled,
                    timestamp_ms: uptime_ms(),
                    ..ActionResult::default()
                };
                r.set_output("Cancelled");
                done.signal(r);
            }
        }
        if drained > 0 {
            info!("ActionManager: cancelled {} pending actions", drained);
        }
        drained
    }

    pub fn pending_count(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn stats(&self) -> ActionStats {
        *self.shared.stats()
    }

    pub fn reset_stats(&self) {
        *self.shared.stats() = ActionStats::default();
    }

    // ── Runtime hosts ────────────────────────────────────────────

    pub fn register_host(&self, host: RuntimeHost) -> Result<()> {
        self.shared.executor.register_host(host)
    }

    pub fn unregister_host(&self, id: &str) -> Result<()> {
        self.shared.executor.unregister_host(id)
    }

    pub fn get_host(&self, id: &str) -> Option<RuntimeHost> {
        self.shared.executor.get_host(id)
    }
}

impl<const N: usize> Drop for ActionManager<N> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
    }
}

impl<const N: usize> core::fmt::Debug for ActionManager<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActionManager")
            .field("capacity", &N)
            .field("pending", &self.pending_count())
            .field("running", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
