//! Stored SSH commands ("quick commands"), mirrored to
//! `config/ssh_commands*.json`.
//!
//! Records use the V3 packed layout (2034 bytes, adds
//! `service_fail_pattern`). Older or foreign blob sizes are ignored.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::record::{RecordReader, RecordWriter};
use crate::adapters::time::{unix_secs, uptime_ms};
use crate::app::ports::{FileStore, StoragePort};
use crate::automation::value::{Value, ValueType};
use crate::automation::variables::{Variable, VariableStore};
use crate::bounded::truncate_str;
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::storage::documents::{CatalogFiles, check_record_id};
use crate::storage::slots::{PackedRecord, SlotTable};
use crate::storage::{ExportScheduler, MirroredCatalog, spawn_loader};

pub const NVS_NAMESPACE: &str = "ts_ssh_cmd";
pub const MAX_COMMANDS: usize = 64;

pub const DEFAULT_TIMEOUT_SEC: u16 = 30;
pub const DEFAULT_READY_TIMEOUT_SEC: u16 = 60;
pub const DEFAULT_CHECK_INTERVAL_MS: u16 = 3000;

const ID_WIDTH: usize = 32;
const HOST_ID_WIDTH: usize = 32;
const NAME_WIDTH: usize = 64;
const COMMAND_WIDTH: usize = 1024;
const DESC_WIDTH: usize = 128;
const ICON_WIDTH: usize = 64;
const PATTERN_WIDTH: usize = 128;
const VAR_WIDTH: usize = 32;

/// V3 record size.
pub const RECORD_SIZE: usize = 2034;

const TABLE: SlotTable = SlotTable {
    namespace: NVS_NAMESPACE,
    prefix: "c_",
    capacity: MAX_COMMANDS,
};

const FILES: CatalogFiles = CatalogFiles {
    aggregate: "config/ssh_commands.json",
    dir: "config/ssh_commands",
};

/// Child variables every command with a `var_name` owns.
pub const RESULT_VARIABLES: [(&str, ValueType); 7] = [
    ("status", ValueType::Str),
    ("exit_code", ValueType::Int),
    ("extracted", ValueType::Str),
    ("expect_matched", ValueType::Bool),
    ("fail_matched", ValueType::Bool),
    ("host", ValueType::Str),
    ("timestamp", ValueType::Int),
];

fn default_timeout() -> u16 {
    DEFAULT_TIMEOUT_SEC
}

fn default_true() -> bool {
    true
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

fn is_zero(v: &u16) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub desc: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub expect_pattern: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub fail_pattern: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub extract_pattern: String,
    /// Prefix of the result variables; empty for none.
    #[serde(default, skip_serializing_if = "is_empty")]
    pub var_name: String,
    #[serde(default = "default_timeout")]
    pub timeout_sec: u16,
    #[serde(default)]
    pub stop_on_match: bool,
    /// Launch in the background with output redirected to a log file.
    #[serde(default)]
    pub nohup: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Watch the nohup log for `ready_pattern` after launch.
    #[serde(default)]
    pub service_mode: bool,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub ready_pattern: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub service_fail_pattern: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ready_timeout_sec: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ready_check_interval_ms: u16,
    #[serde(default)]
    pub created_time: u32,
    #[serde(default)]
    pub last_exec_time: u32,
}

impl CommandRecord {
    pub fn new(id: &str, host_id: &str, name: &str, command: &str) -> Self {
        Self {
            id: id.into(),
            host_id: host_id.into(),
            name: name.into(),
            command: command.into(),
            desc: String::new(),
            icon: String::new(),
            expect_pattern: String::new(),
            fail_pattern: String::new(),
            extract_pattern: String::new(),
            var_name: String::new(),
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            stop_on_match: false,
            nohup: false,
            enabled: true,
            service_mode: false,
            ready_pattern: String::new(),
            service_fail_pattern: String::new(),
            ready_timeout_sec: DEFAULT_READY_TIMEOUT_SEC,
            ready_check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            created_time: 0,
            last_exec_time: 0,
        }
    }

    /// Truncate to the packed widths and fill zero timings with defaults.
    fn normalize(&mut self) {
        fn cut(s: &mut String, width: usize) {
            let keep = truncate_str(s, width - 1).len();
            s.truncate(keep);
        }
        cut(&mut self.id, ID_WIDTH);
        cut(&mut self.host_id, HOST_ID_WIDTH);
        cut(&mut self.name, NAME_WIDTH);
        cut(&mut self.command, COMMAND_WIDTH);
        cut(&mut self.desc, DESC_WIDTH);
        cut(&mut self.icon, ICON_WIDTH);
        cut(&mut self.expect_pattern, PATTERN_WIDTH);
        cut(&mut self.fail_pattern, PATTERN_WIDTH);
        cut(&mut self.extract_pattern, PATTERN_WIDTH);
        cut(&mut self.var_name, VAR_WIDTH);
        cut(&mut self.ready_pattern, PATTERN_WIDTH);
        cut(&mut self.service_fail_pattern, PATTERN_WIDTH);
        if self.timeout_sec == 0 {
            self.timeout_sec = DEFAULT_TIMEOUT_SEC;
        }
        if self.ready_timeout_sec == 0 {
            self.ready_timeout_sec = DEFAULT_READY_TIMEOUT_SEC;
        }
        if self.ready_check_interval_ms == 0 {
            self.ready_check_interval_ms = DEFAULT_CHECK_INTERVAL_MS;
        }
    }
}

impl PackedRecord for CommandRecord {
    const SIZE: usize = RECORD_SIZE;

    fn id(&self) -> &str {
        &self.id
    }

    fn pack(&self) -> Vec<u8> {
        let mut w = RecordWriter::with_size(RECORD_SIZE);
        w.str(&self.id, ID_WIDTH)
            .str(&self.host_id, HOST_ID_WIDTH)
            .str(&self.name, NAME_WIDTH)
            .str(&self.command, COMMAND_WIDTH)
            .str(&self.desc, DESC_WIDTH)
            .str(&self.icon, ICON_WIDTH)
            .str(&self.expect_pattern, PATTERN_WIDTH)
            .str(&self.fail_pattern, PATTERN_WIDTH)
            .str(&self.extract_pattern, PATTERN_WIDTH)
            .str(&self.var_name, VAR_WIDTH)
            .u16(self.timeout_sec)
            .bool(self.stop_on_match)
            .bool(self.nohup)
            .bool(self.enabled)
            .u32(self.created_time)
            .u32(self.last_exec_time)
            // V2
            .bool(self.service_mode)
            .str(&self.ready_pattern, PATTERN_WIDTH)
            .u16(self.ready_timeout_sec)
            .u16(self.ready_check_interval_ms)
            // V3
            .str(&self.service_fail_pattern, PATTERN_WIDTH);
        w.finish()
    }

    fn unpack(blob: &[u8]) -> Option<Self> {
        if blob.len() != Self::SIZE {
            return None;
        }
        let mut r = RecordReader::new(blob);
        let rec = Self {
            id: r.str(ID_WIDTH),
            host_id: r.str(HOST_ID_WIDTH),
            name: r.str(NAME_WIDTH),
            command: r.str(COMMAND_WIDTH),
            desc: r.str(DESC_WIDTH),
            icon: r.str(ICON_WIDTH),
            expect_pattern: r.str(PATTERN_WIDTH),
            fail_pattern: r.str(PATTERN_WIDTH),
            extract_pattern: r.str(PATTERN_WIDTH),
            var_name: r.str(VAR_WIDTH),
            timeout_sec: r.u16(),
            stop_on_match: r.bool(),
            nohup: r.bool(),
            enabled: r.bool(),
            created_time: r.u32(),
            last_exec_time: r.u32(),
            service_mode: r.bool(),
            ready_pattern: r.str(PATTERN_WIDTH),
            ready_timeout_sec: r.u16(),
            ready_check_interval_ms: r.u16(),
            service_fail_pattern: r.str(PATTERN_WIDTH),
        };
        (!rec.id.is_empty()).then_some(rec)
    }
}

/// `cmd_<8 hex>`, unique enough for a catalog of 64.
fn generate_id() -> String {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&uptime_ms().to_le_bytes());
    seed[8..12].copy_from_slice(&unix_secs().to_le_bytes());
    seed[12..].copy_from_slice(&SEQ.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hmac_sha256::Hash::hash(&seed);
    format!(
        "cmd_{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

pub struct CommandStore {
    // `None` until `init`.
    nvs: Mutex<Option<Box<dyn StoragePort>>>,
    files: Arc<dyn FileStore>,
    exporter: ExportScheduler,
    load_delay_ms: u32,
    background: bool,
    /// Receives result variables for commands added by a file import.
    vars: Mutex<Option<Arc<VariableStore>>>,
    me: Weak<CommandStore>,
}

impl CommandStore {
    pub fn new(files: Arc<dyn FileStore>, config: &CoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            nvs: Mutex::new(None),
            files,
            exporter: ExportScheduler::new("ssh_cmd_sync\0", config.file_sync_delay_ms, config.background_tasks),
            load_delay_ms: config.commands_load_delay_ms,
            background: config.background_tasks,
            vars: Mutex::new(None),
            me: me.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn StoragePort>>> {
        self.nvs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_nvs<T>(&self, f: impl FnOnce(&mut dyn StoragePort) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let nvs = guard.as_mut().ok_or(Error::Uninitialized)?;
        f(nvs.as_mut())
    }

    /// Take the NVS handle and start the deferred loader. Child variables
    /// are not created here; see [`attach_variables`](Self::attach_variables).
    pub fn init(&self, nvs: Box<dyn StoragePort>) -> Result<()> {
        let count = {
            let mut guard = self.lock();
            if guard.is_some() {
                return Ok(());
            }
            let count = TABLE.count::<CommandRecord>(nvs.as_ref());
            *guard = Some(nvs);
            count
        };
        info!("CommandStore: initialized, {} commands in NVS", count);

        if self.background {
            if let Some(me) = self.me.upgrade() {
                spawn_loader(&me, self.load_delay_ms, "ssh_cmd_load\0")?;
            }
        }
        Ok(())
    }

    pub fn deinit(&self) {
        if self.lock().take().is_some() {
            info!("CommandStore: deinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Insert or update by id; an empty id gets a generated one. Returns
    /// the id used.
    pub fn add(&self, rec: &CommandRecord) -> Result<String> {
        let id = self.put(rec)?;
        self.exporter.schedule(self.me.clone());
        Ok(id)
    }

    fn put(&self, rec: &CommandRecord) -> Result<String> {
        if rec.host_id.is_empty() {
            return Err(Error::InvalidArgument("command host_id is empty"));
        }
        if rec.name.is_empty() {
            return Err(Error::InvalidArgument("command name is empty"));
        }
        let mut rec = rec.clone();
        if rec.id.is_empty() {
            rec.id = generate_id();
        }
        check_record_id(&rec.id)?;
        rec.normalize();

        self.with_nvs(|nvs| {
            let (slot, updated) = match TABLE.find::<CommandRecord>(nvs, &rec.id) {
                Some((slot, existing)) => {
                    rec.created_time = existing.created_time;
                    (slot, true)
                }
                None => {
                    rec.created_time = unix_secs();
                    let slot = TABLE.free_slot::<CommandRecord>(nvs).inspect_err(|_| {
                        warn!("CommandStore: max commands reached");
                    })?;
                    (slot, false)
                }
            };
            TABLE.write(nvs, slot, &rec)?;
            info!(
                "CommandStore: {} '{}' ({})",
                if updated { "updated" } else { "added" },
                rec.name,
                rec.id
            );
            Ok(rec.id.clone())
        })
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.with_nvs(|nvs| {
            let (slot, _) = TABLE.find::<CommandRecord>(nvs, id).ok_or(Error::NotFound)?;
            TABLE.erase(nvs, slot)
        })?;
        info!("CommandStore: removed '{}'", id);
        self.exporter.schedule(self.me.clone());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<CommandRecord> {
        self.with_nvs(|nvs| {
            TABLE
                .find::<CommandRecord>(nvs, id)
                .map(|(_, r)| r)
                .ok_or(Error::NotFound)
        })
    }

    pub fn list(&self) -> Result<Vec<CommandRecord>> {
        self.with_nvs(|nvs| Ok(TABLE.scan::<CommandRecord>(nvs).into_iter().map(|(_, r)| r).collect()))
    }

    pub fn list_by_host(&self, host_id: &str) -> Result<Vec<CommandRecord>> {
        Ok(self.list()?.into_iter().filter(|c| c.host_id == host_id).collect())
    }

    /// Visit records `offset..offset + limit` (`limit == 0` means all)
    /// until `f` returns false. Returns the total record count.
    pub fn iterate(&self, offset: usize, limit: usize, f: impl FnMut(usize, &CommandRecord) -> bool) -> Result<usize> {
        Ok(page(&self.list()?, offset, limit, f))
    }

    /// As [`iterate`](Self::iterate), restricted to one host. The total
    /// counts that host's commands only.
    pub fn iterate_by_host(
        &self,
        host_id: &str,
        offset: usize,
        limit: usize,
        f: impl FnMut(usize, &CommandRecord) -> bool,
    ) -> Result<usize> {
        Ok(page(&self.list_by_host(host_id)?, offset, limit, f))
    }

    pub fn count(&self) -> usize {
        self.with_nvs(|nvs| Ok(TABLE.count::<CommandRecord>(nvs))).unwrap_or(0)
    }

    pub fn clear(&self) -> Result<()> {
        self.clear_nvs()?;
        info!("CommandStore: cleared");
        self.exporter.schedule(self.me.clone());
        Ok(())
    }

    fn clear_nvs(&self) -> Result<()> {
        self.with_nvs(|nvs| {
            for (slot, _) in TABLE.scan::<CommandRecord>(nvs) {
                TABLE.erase(nvs, slot)?;
            }
            Ok(())
        })
    }

    /// Stamp `last_exec_time` with the current wall-clock time.
    pub fn update_exec_time(&self, id: &str) -> Result<()> {
        self.with_nvs(|nvs| {
            let (slot, mut rec) = TABLE.find::<CommandRecord>(nvs, id).ok_or(Error::NotFound)?;
            rec.last_exec_time = unix_secs();
            TABLE.write(nvs, slot, &rec)
        })?;
        self.exporter.schedule(self.me.clone());
        Ok(())
    }

    /// Pre-create result variables in `vars` now, and again after every
    /// file import that brings in commands.
    pub fn attach_variables(&self, vars: Arc<VariableStore>) {
        if let Err(e) = self.precreate_variables(&vars) {
            warn!("CommandStore: result variables not created: {}", e);
        }
        *self.vars.lock().unwrap_or_else(|e| e.into_inner()) = Some(vars);
    }

    /// Register the seven result variables of every command that has a
    /// `var_name`, with typed zero values. Existing variables keep their
    /// current values. Returns how many were created.
    pub fn precreate_variables(&self, vars: &VariableStore) -> Result<usize> {
        let mut created = 0;
        for cmd in self.list()?.iter().filter(|c| !c.var_name.is_empty()) {
            for (suffix, ty) in RESULT_VARIABLES {
                let name = format!("{}.{}", cmd.var_name, suffix);
                if vars.exists(&name) {
                    continue;
                }
                match vars.register(Variable::new(&name, &cmd.var_name, Value::zero(ty))) {
                    Ok(()) => created += 1,
                    Err(e) => warn!("CommandStore: cannot create '{}': {}", name, e),
                }
            }
        }
        info!("CommandStore: pre-created {} variables", created);
        Ok(created)
    }
}

fn page(all: &[CommandRecord], offset: usize, limit: usize, mut f: impl FnMut(usize, &CommandRecord) -> bool) -> usize {
    let take = if limit == 0 { usize::MAX } else { limit };
    for (i, rec) in all.iter().enumerate().skip(offset).take(take) {
        if !f(i, rec) {
            break;
        }
    }
    all.len()
}

impl MirroredCatalog for CommandStore {
    fn label(&self) -> &'static str {
        "CommandStore"
    }

    fn count(&self) -> usize {
        CommandStore::count(self)
    }

    fn import_files(&self, merge: bool) -> Result<usize> {
        if !self.is_initialized() {
            return Err(Error::Uninitialized);
        }
        let items = FILES.read_array(self.files.as_ref())?;
        if !merge {
            self.clear_nvs()?;
        }
        let (mut imported, mut skipped) = (0usize, 0usize);
        for item in items {
            let rec = match serde_json::from_value::<CommandRecord>(item) {
                Ok(r) if !r.host_id.is_empty() && !r.name.is_empty() => r,
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            match self.put(&rec) {
                Ok(_) => imported += 1,
                Err(e) => {
                    debug!("CommandStore: import of '{}' failed: {}", rec.name, e);
                    skipped += 1;
                }
            }
        }
        info!("CommandStore: imported {} commands (skipped {})", imported, skipped);
        if imported > 0 {
            let vars = self.vars.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(vars) = vars {
                self.precreate_variables(&vars)?;
            }
        }
        Ok(imported)
    }

    fn export_files(&self) -> Result<usize> {
        let records: Vec<(String, CommandRecord)> = self.list()?.into_iter().map(|r| (r.id.clone(), r)).collect();
        let n = FILES.write_all(self.files.as_ref(), &records)?;
        info!("CommandStore: exported {} commands", n);
        Ok(n)
    }
}
