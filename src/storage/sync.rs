//! Deferred reconciliation and coalesced export between NVS and files.
//!
//! ```text
//!   boot ──(delay)──▶ reconcile ──▶ files > nvs : clear + reimport
//!                                 ├ files missing : export NVS
//!                                 └ otherwise     : merge additions
//!
//!   mutation ──▶ ExportScheduler::schedule ──(delay, coalesced)──▶ export_files
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, warn};

use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::{Error, Result};

/// Stack for loader and export tasks (KiB). JSON encoding of a full
/// catalog is the deepest path.
const SYNC_TASK_STACK_KB: usize = 8;
const SYNC_TASK_PRIORITY: u8 = 2;

/// A store whose NVS records are mirrored to the removable medium.
pub trait MirroredCatalog: Send + Sync {
    /// Component name used in log lines.
    fn label(&self) -> &'static str;

    /// Records currently held in NVS.
    fn count(&self) -> usize;

    /// Import records from files. With `merge == false` the store is
    /// cleared first. Missing, empty or unparsable documents are
    /// [`Error::NotFound`]; an unmounted medium is a transport failure.
    fn import_files(&self, merge: bool) -> Result<usize>;

    /// Write every record to files. Returns how many were written.
    fn export_files(&self) -> Result<usize>;
}

/// Outcome of one boot-time reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Files held more records: NVS now equals the files.
    Reloaded(usize),
    /// Non-conflicting additions merged into NVS.
    Merged(usize),
    /// Files were missing or malformed: NVS written out.
    Exported(usize),
    /// Neither side holds anything.
    Empty,
    /// The medium could not be used; nothing changed.
    Skipped,
}

/// Bring NVS and files into agreement, files first.
///
/// Never fails: problems with the medium are logged and reported as
/// [`Reconciled::Skipped`].
pub fn reconcile(catalog: &dyn MirroredCatalog) -> Reconciled {
    let label = catalog.label();
    let nvs_count = catalog.count();

    match catalog.import_files(true) {
        Ok(_) => {
            let count = catalog.count();
            if count > nvs_count {
                info!(
                    "{}: files hold more records ({} > {}), reloading",
                    label, count, nvs_count
                );
                match catalog.import_files(false) {
                    Ok(n) => Reconciled::Reloaded(n),
                    Err(e) => {
                        warn!("{}: reload from files failed: {}", label, e);
                        Reconciled::Skipped
                    }
                }
            } else {
                debug!("{}: merged, {} records", label, count);
                Reconciled::Merged(count)
            }
        }
        Err(Error::NotFound) => {
            if nvs_count == 0 {
                info!("{}: no records in NVS or files", label);
                return Reconciled::Empty;
            }
            info!("{}: no usable files, exporting {} records", label, nvs_count);
            match catalog.export_files() {
                Ok(n) => Reconciled::Exported(n),
                Err(e) => {
                    warn!("{}: export failed: {}", label, e);
                    Reconciled::Skipped
                }
            }
        }
        Err(e) => {
            warn!("{}: file import failed: {}", label, e);
            Reconciled::Skipped
        }
    }
}

/// Run [`reconcile`] on a one-shot task after `delay_ms`, giving the
/// medium time to mount. The task holds only a weak reference, so a store
/// dropped in the meantime is simply skipped.
pub fn spawn_loader<C>(catalog: &Arc<C>, delay_ms: u32, name: &'static str) -> Result<()>
where
    C: MirroredCatalog + 'static,
{
    let weak: Weak<C> = Arc::downgrade(catalog);
    spawn_on_core(Core::Pro, SYNC_TASK_PRIORITY, SYNC_TASK_STACK_KB, name, move || {
        std::thread::sleep(Duration::from_millis(u64::from(delay_ms)));
        if let Some(catalog) = weak.upgrade() {
            let outcome = reconcile(catalog.as_ref());
            info!("{}: deferred load {:?}", catalog.label(), outcome);
        }
    })
    .map(|_| ())
}

/// Coalesces bursts of mutations into one delayed export.
///
/// While an export is pending further calls to [`schedule`](Self::schedule)
/// are absorbed. With background tasks disabled the export runs inline on
/// the caller, which must not hold the store's lock.
pub struct ExportScheduler {
    pending: Arc<AtomicBool>,
    delay_ms: u32,
    background: bool,
    name: &'static str,
}

impl ExportScheduler {
    /// `name` is the task name, null-terminated.
    pub fn new(name: &'static str, delay_ms: u32, background: bool) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
            delay_ms,
            background,
            name,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn schedule<C>(&self, catalog: Weak<C>)
    where
        C: MirroredCatalog + 'static,
    {
        if !self.background {
            if let Some(c) = catalog.upgrade() {
                if let Err(e) = c.export_files() {
                    debug!("{}: export skipped: {}", c.label(), e);
                }
            }
            return;
        }

        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let pending = Arc::clone(&self.pending);
        let delay = Duration::from_millis(u64::from(self.delay_ms));
        let spawned = spawn_on_core(Core::Pro, SYNC_TASK_PRIORITY, SYNC_TASK_STACK_KB, self.name, {
            let pending = Arc::clone(&pending);
            move || {
                std::thread::sleep(delay);
                // Cleared before exporting so a mutation during the export
                // schedules another one.
                pending.store(false, Ordering::Release);
                if let Some(c) = catalog.upgrade() {
                    if let Err(e) = c.export_files() {
                        debug!("{}: export skipped: {}", c.label(), e);
                    }
                }
            }
        });
        if let Err(e) = spawned {
            warn!("ExportScheduler: could not spawn export task: {}", e);
            pending.store(false, Ordering::Release);
        }
    }
}
