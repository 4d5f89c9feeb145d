//! Variable store: typed registry with change notification.
//!
//! One mutex guards the whole registry. Change events are emitted through
//! the [`EventSink`] only after the lock is released, so a sink may call
//! back into the store.
//!
//! [`VariableStore::enumerate`] is the exception: it holds the lock for the
//! full traversal. Keep its callback short and never touch the store from
//! inside it.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::value::{ShortString, Value};
use crate::adapters::time::uptime_ms;
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, StorageError, StoragePort};
use crate::bounded::bounded;
use crate::error::{Error, Result};

/// Longest variable name (bytes).
pub const VAR_NAME_MAX: usize = 64;

/// Longest source id (bytes).
pub const SOURCE_ID_MAX: usize = 32;

const NVS_NAMESPACE: &str = "ts_var";
const NVS_KEY: &str = "vars";

pub type VarName = heapless::String<VAR_NAME_MAX>;
pub type SourceId = heapless::String<SOURCE_ID_MAX>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarFlags {
    /// Rejects [`VariableStore::set`]; [`VariableStore::set_internal`] still works.
    pub read_only: bool,
    /// Included in [`VariableStore::save_all`].
    pub persistent: bool,
}

impl VarFlags {
    pub const NONE: Self = Self {
        read_only: false,
        persistent: false,
    };
    pub const READ_ONLY: Self = Self {
        read_only: true,
        persistent: false,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: VarName,
    pub source_id: SourceId,
    pub flags: VarFlags,
    pub value: Value,
    pub default: Value,
    pub last_change_ms: u64,
}

impl Variable {
    /// A variable whose current value starts at `default`. Names longer
    /// than [`VAR_NAME_MAX`] bytes are cut to it.
    pub fn new(name: &str, source_id: &str, default: Value) -> Self {
        Self {
            name: bounded(name),
            source_id: bounded(source_id),
            flags: VarFlags::NONE,
            value: default.clone(),
            default,
            last_change_ms: 0,
        }
    }

    pub fn with_flags(mut self, flags: VarFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Persisted form of one variable.
#[derive(Serialize, Deserialize)]
struct SavedVar {
    name: VarName,
    value: Value,
}

struct Registry {
    vars: Vec<Variable>,
}

impl Registry {
    fn position(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name.as_str() == name)
    }
}

pub struct VariableStore {
    // `None` until `init`, and again after `deinit`.
    state: Mutex<Option<Registry>>,
    capacity: usize,
    sink: Option<Arc<dyn EventSink>>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("variable name is empty"));
    }
    if name.len() > VAR_NAME_MAX {
        return Err(Error::InvalidArgument("variable name too long"));
    }
    Ok(())
}

impl VariableStore {
    pub fn new(capacity: usize, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            state: Mutex::new(None),
            capacity,
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Registry>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let reg = guard.as_mut().ok_or(Error::Uninitialized)?;
        f(reg)
    }

    /// Bring the store up. A second call is a no-op.
    pub fn init(&self) {
        let mut guard = self.lock();
        if guard.is_some() {
            return;
        }
        *guard = Some(Registry {
            vars: Vec::with_capacity(self.capacity),
        });
        info!("VariableStore: initialized (capacity {})", self.capacity);
    }

    /// Drop every variable and clear the init latch.
    pub fn deinit(&self) {
        if self.lock().take().is_some() {
            info!("VariableStore: deinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    // ── Registration ──────────────────────────────────────────────

    /// Add a variable, or update an existing one of the same name in place.
    pub fn register(&self, var: Variable) -> Result<()> {
        validate_name(&var.name)?;
        self.with_registry(|reg| {
            let now = uptime_ms();
            if let Some(i) = reg.position(&var.name) {
                let slot = &mut reg.vars[i];
                slot.source_id = var.source_id;
                slot.flags = var.flags;
                slot.value = var.value;
                slot.default = var.default;
                slot.last_change_ms = now.max(slot.last_change_ms + 1);
                debug!("VariableStore: updated '{}'", slot.name);
                return Ok(());
            }
            if reg.vars.len() >= self.capacity {
                warn!("VariableStore: full, cannot register '{}'", var.name);
                return Err(Error::NoSpace);
            }
            debug!("VariableStore: registered '{}'", var.name);
            reg.vars.push(Variable {
                last_change_ms: now,
                ..var
            });
            Ok(())
        })
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        self.with_registry(|reg| {
            let i = reg.position(name).ok_or(Error::NotFound)?;
            reg.vars.remove(i);
            Ok(())
        })
    }

    /// Remove every variable registered by `source_id`. Returns how many went.
    pub fn unregister_by_source(&self, source_id: &str) -> Result<usize> {
        self.with_registry(|reg| {
            let before = reg.vars.len();
            reg.vars.retain(|v| v.source_id.as_str() != source_id);
            let removed = before - reg.vars.len();
            if removed > 0 {
                debug!(
                    "VariableStore: removed {} variables of source '{}'",
                    removed, source_id
                );
            }
            Ok(removed)
        })
    }

    // ── Writes ────────────────────────────────────────────────────

    /// External write. Fails with [`Error::ReadOnly`] on read-only variables.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.set_inner(name, value, true)
    }

    /// Internal write; ignores the read-only flag.
    pub fn set_internal(&self, name: &str, value: Value) -> Result<()> {
        self.set_inner(name, value, false)
    }

    fn set_inner(&self, name: &str, value: Value, check_read_only: bool) -> Result<()> {
        validate_name(name)?;
        let change = self.with_registry(|reg| {
            let i = reg.position(name).ok_or(Error::NotFound)?;
            let var = &mut reg.vars[i];
            if check_read_only && var.flags.read_only {
                return Err(Error::ReadOnly);
            }
            if var.value == value {
                return Ok(None);
            }
            let old = core::mem::replace(&mut var.value, value.clone());
            var.last_change_ms = uptime_ms().max(var.last_change_ms + 1);
            Ok(Some(old))
        })?;

        if let Some(old) = change {
            self.notify(name, old, value);
        }
        Ok(())
    }

    /// Internal write that registers the variable first when missing.
    /// Executors use this to publish results under a caller-chosen prefix.
    pub fn upsert_internal(&self, name: &str, value: Value, source_id: &str) -> Result<()> {
        match self.set_internal(name, value.clone()) {
            Err(Error::NotFound) => {
                self.register(Variable::new(name, source_id, value.clone()))?;
                self.notify(name, Value::Null, value);
                Ok(())
            }
            other => other,
        }
    }

    fn notify(&self, name: &str, old: Value, new: Value) {
        if let Some(sink) = &self.sink {
            sink.emit(&AppEvent::VariableChanged {
                name: name.into(),
                old,
                new,
            });
        }
    }

    pub fn set_bool(&self, name: &str, v: bool) -> Result<()> {
        self.set(name, Value::Bool(v))
    }

    pub fn set_int(&self, name: &str, v: i32) -> Result<()> {
        self.set(name, Value::Int(v))
    }

    pub fn set_float(&self, name: &str, v: f64) -> Result<()> {
        self.set(name, Value::Float(v))
    }

    pub fn set_string(&self, name: &str, v: &str) -> Result<()> {
        self.set(name, Value::text(v))
    }

    // ── Reads ─────────────────────────────────────────────────────

    /// Snapshot of the full variable record.
    pub fn get_variable(&self, name: &str) -> Result<Variable> {
        self.with_registry(|reg| {
            let i = reg.position(name).ok_or(Error::NotFound)?;
            Ok(reg.vars[i].clone())
        })
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.get_variable(name).map(|v| v.value)
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get(name)?.as_bool()
    }

    pub fn get_int(&self, name: &str) -> Result<i32> {
        self.get(name)?.as_int()
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        self.get(name)?.as_float()
    }

    pub fn get_string(&self, name: &str) -> Result<ShortString> {
        Ok(self.get(name)?.to_text())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.with_registry(|reg| Ok(reg.position(name).is_some()))
            .unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.with_registry(|reg| Ok(reg.vars.len())).unwrap_or(0)
    }

    /// Visit variables whose name starts with `prefix` (all when empty) in
    /// registration order, until `f` returns `false`. Returns the number of
    /// variables visited. The registry lock is held throughout.
    pub fn enumerate(&self, prefix: &str, mut f: impl FnMut(&Variable) -> bool) -> usize {
        let guard = self.lock();
        let Some(reg) = guard.as_ref() else {
            return 0;
        };
        let mut visited = 0;
        for var in reg.vars.iter().filter(|v| v.name.starts_with(prefix)) {
            visited += 1;
            if !f(var) {
                break;
            }
        }
        visited
    }

    /// Copy of the variable at `*cursor`, advancing the cursor. `Ok(None)`
    /// past the end.
    pub fn iterate(&self, cursor: &mut usize) -> Result<Option<Variable>> {
        self.with_registry(|reg| {
            let var = reg.vars.get(*cursor).cloned();
            if var.is_some() {
                *cursor += 1;
            }
            Ok(var)
        })
    }

    // ── Persistence ───────────────────────────────────────────────

    /// Write every persistent variable to NVS. Returns the number saved.
    pub fn save_all(&self, nvs: &mut dyn StoragePort) -> Result<usize> {
        let saved: Vec<SavedVar> = self.with_registry(|reg| {
            Ok(reg
                .vars
                .iter()
                .filter(|v| v.flags.persistent)
                .map(|v| SavedVar {
                    name: v.name.clone(),
                    value: v.value.clone(),
                })
                .collect())
        })?;
        let bytes = postcard::to_allocvec(&saved)
            .map_err(|_| Error::InvalidArgument("variable encoding"))?;
        nvs.write(NVS_NAMESPACE, NVS_KEY, &bytes)?;
        info!("VariableStore: saved {} persistent variables", saved.len());
        Ok(saved.len())
    }

    /// Apply saved values to variables that are registered now. Unknown
    /// names are skipped. Returns the number applied.
    pub fn load_all(&self, nvs: &dyn StoragePort) -> Result<usize> {
        if !self.is_initialized() {
            return Err(Error::Uninitialized);
        }
        let bytes = match nvs.read_blob(NVS_NAMESPACE, NVS_KEY) {
            Ok(b) => b,
            Err(StorageError::NotFound) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let saved: Vec<SavedVar> = match postcard::from_bytes(&bytes) {
            Ok(s) => s,
            Err(_) => {
                warn!("VariableStore: saved variables corrupted, ignoring");
                return Ok(0);
            }
        };
        let mut applied = 0;
        for entry in saved {
            match self.set_internal(&entry.name, entry.value) {
                Ok(()) => applied += 1,
                Err(Error::NotFound) => {
                    debug!("VariableStore: skipping unknown saved '{}'", entry.name)
                }
                Err(e) => return Err(e),
            }
        }
        info!("VariableStore: loaded {} persistent variables", applied);
        Ok(applied)
    }
}
