//! SSH host catalog: NVS slots mirrored to `config/ssh_hosts*.json`.
//!
//! Each host occupies one packed 172-byte record under key `h_<slot>`.
//! Passwords are held in memory only and never reach NVS or files.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::record::{RecordReader, RecordWriter};
use crate::adapters::time::unix_secs;
use crate::app::ports::{FileStore, StoragePort};
use crate::bounded::truncate_str;
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::storage::documents::{CatalogFiles, check_record_id};
use crate::storage::slots::{PackedRecord, SlotTable};
use crate::storage::{ExportScheduler, MirroredCatalog, spawn_loader};

pub const NVS_NAMESPACE: &str = "ts_ssh_cfg";
pub const MAX_HOSTS: usize = 16;
pub const DEFAULT_PORT: u16 = 22;

const ID_WIDTH: usize = 32;
const HOST_WIDTH: usize = 64;
const USER_WIDTH: usize = 32;
const KEYID_WIDTH: usize = 32;

/// Packed record size; blobs of any other size are ignored.
pub const RECORD_SIZE: usize = ID_WIDTH + HOST_WIDTH + 2 + USER_WIDTH + 1 + KEYID_WIDTH + 4 + 4 + 1;

const TABLE: SlotTable = SlotTable {
    namespace: NVS_NAMESPACE,
    prefix: "h_",
    capacity: MAX_HOSTS,
};

const FILES: CatalogFiles = CatalogFiles {
    aggregate: "config/ssh_hosts.json",
    dir: "config/ssh_hosts",
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostAuth {
    #[default]
    Password,
    Key,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

/// One SSH endpoint. Field names double as the JSON document keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default, rename = "auth_type")]
    pub auth: HostAuth,
    /// Keystore id (or key file path) for key auth.
    #[serde(default, skip_serializing_if = "is_empty")]
    pub keyid: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub created_time: u32,
    #[serde(default)]
    pub last_used_time: u32,
}

impl HostRecord {
    pub fn new(id: &str, host: &str, username: &str) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            auth: HostAuth::Password,
            keyid: String::new(),
            enabled: true,
            created_time: 0,
            last_used_time: 0,
        }
    }

    pub fn with_key(mut self, keyid: &str) -> Self {
        self.auth = HostAuth::Key;
        self.keyid = keyid.into();
        self
    }

    pub fn uses_key(&self) -> bool {
        self.auth == HostAuth::Key
    }

    /// Cut string fields to what the packed layout can hold.
    fn normalize(&mut self) {
        fn cut(s: &mut String, width: usize) {
            let keep = truncate_str(s, width - 1).len();
            s.truncate(keep);
        }
        cut(&mut self.id, ID_WIDTH);
        cut(&mut self.host, HOST_WIDTH);
        cut(&mut self.username, USER_WIDTH);
        cut(&mut self.keyid, KEYID_WIDTH);
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
    }
}

impl PackedRecord for HostRecord {
    const SIZE: usize = RECORD_SIZE;

    fn id(&self) -> &str {
        &self.id
    }

    fn pack(&self) -> Vec<u8> {
        let mut w = RecordWriter::with_size(RECORD_SIZE);
        w.str(&self.id, ID_WIDTH)
            .str(&self.host, HOST_WIDTH)
            .u16(self.port)
            .str(&self.username, USER_WIDTH)
            .u8(match self.auth {
                HostAuth::Password => 0,
                HostAuth::Key => 1,
            })
            .str(&self.keyid, KEYID_WIDTH)
            .u32(self.created_time)
            .u32(self.last_used_time)
            .bool(self.enabled);
        w.finish()
    }

    fn unpack(blob: &[u8]) -> Option<Self> {
        if blob.len() != Self::SIZE {
            return None;
        }
        let mut r = RecordReader::new(blob);
        let rec = Self {
            id: r.str(ID_WIDTH),
            host: r.str(HOST_WIDTH),
            port: r.u16(),
            username: r.str(USER_WIDTH),
            auth: if r.u8() == 1 { HostAuth::Key } else { HostAuth::Password },
            keyid: r.str(KEYID_WIDTH),
            created_time: r.u32(),
            last_used_time: r.u32(),
            enabled: r.bool(),
        };
        (!rec.id.is_empty()).then_some(rec)
    }
}

pub struct HostStore {
    // `None` until `init`: the open NVS handle doubles as the init latch.
    nvs: Mutex<Option<Box<dyn StoragePort>>>,
    passwords: Mutex<HashMap<String, Zeroizing<String>>>,
    files: Arc<dyn FileStore>,
    exporter: ExportScheduler,
    load_delay_ms: u32,
    background: bool,
    me: Weak<HostStore>,
}

impl HostStore {
    pub fn new(files: Arc<dyn FileStore>, config: &CoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            nvs: Mutex::new(None),
            passwords: Mutex::new(HashMap::new()),
            files,
            exporter: ExportScheduler::new("ssh_host_sync\0", config.file_sync_delay_ms, config.background_tasks),
            load_delay_ms: config.hosts_load_delay_ms,
            background: config.background_tasks,
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

    /// Take ownership of the NVS handle and start the deferred loader.
    /// A second call is a no-op.
    pub fn init(&self, nvs: Box<dyn StoragePort>) -> Result<()> {
        let count = {
            let mut guard = self.lock();
            if guard.is_some() {
                return Ok(());
            }
            let count = TABLE.count::<HostRecord>(nvs.as_ref());
            *guard = Some(nvs);
            count
        };
        info!("HostStore: initialized, {} hosts in NVS", count);

        if self.background {
            if let Some(me) = self.me.upgrade() {
                spawn_loader(&me, self.load_delay_ms, "ssh_host_load\0")?;
            }
        }
        Ok(())
    }

    pub fn deinit(&self) {
        if self.lock().take().is_some() {
            self.passwords.lock().unwrap_or_else(|e| e.into_inner()).clear();
            info!("HostStore: deinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    fn schedule_export(&self) {
        self.exporter.schedule(self.me.clone());
    }

    /// Insert or update by id. Updates keep the original `created_time`.
    pub fn add(&self, rec: &HostRecord) -> Result<()> {
        self.put(rec)?;
        self.schedule_export();
        Ok(())
    }

    fn put(&self, rec: &HostRecord) -> Result<()> {
        if rec.id.is_empty() {
            return Err(Error::InvalidArgument("host id is empty"));
        }
        if rec.host.is_empty() {
            return Err(Error::InvalidArgument("host address is empty"));
        }
        check_record_id(&rec.id)?;
        let mut rec = rec.clone();
        rec.normalize();

        self.with_nvs(|nvs| {
            let slot = match TABLE.find::<HostRecord>(nvs, &rec.id) {
                Some((slot, existing)) => {
                    rec.created_time = existing.created_time;
                    slot
                }
                None => {
                    rec.created_time = unix_secs();
                    TABLE.free_slot::<HostRecord>(nvs).inspect_err(|_| {
                        warn!("HostStore: no free slot for '{}'", rec.id);
                    })?
                }
            };
            TABLE.write(nvs, slot, &rec)?;
            debug!("HostStore: saved '{}' in slot {}", rec.id, slot);
            Ok(())
        })
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.with_nvs(|nvs| {
            let (slot, _) = TABLE.find::<HostRecord>(nvs, id).ok_or(Error::NotFound)?;
            TABLE.erase(nvs, slot)
        })?;
        self.passwords.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
        info!("HostStore: removed '{}'", id);
        self.schedule_export();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<HostRecord> {
        self.with_nvs(|nvs| {
            TABLE
                .find::<HostRecord>(nvs, id)
                .map(|(_, r)| r)
                .ok_or(Error::NotFound)
        })
    }

    /// Match on address and port (0 means 22), and on username when given.
    pub fn find_by_address(&self, host: &str, port: u16, username: Option<&str>) -> Result<HostRecord> {
        let port = if port == 0 { DEFAULT_PORT } else { port };
        self.with_nvs(|nvs| {
            TABLE
                .scan::<HostRecord>(nvs)
                .into_iter()
                .map(|(_, r)| r)
                .find(|r| r.host == host && r.port == port && username.is_none_or(|u| r.username == u))
                .ok_or(Error::NotFound)
        })
    }

    pub fn list(&self) -> Result<Vec<HostRecord>> {
        self.with_nvs(|nvs| Ok(TABLE.scan::<HostRecord>(nvs).into_iter().map(|(_, r)| r).collect()))
    }

    /// Visit records `offset..offset + limit` in slot order (`limit == 0`
    /// means no limit) until `f` returns false. Returns the total number of
    /// records in the store.
    pub fn iterate(&self, offset: usize, limit: usize, mut f: impl FnMut(usize, &HostRecord) -> bool) -> Result<usize> {
        let all = self.list()?;
        let take = if limit == 0 { usize::MAX } else { limit };
        for (i, rec) in all.iter().enumerate().skip(offset).take(take) {
            if !f(i, rec) {
                break;
            }
        }
        Ok(all.len())
    }

    /// Number of hosts in NVS; zero when not initialized.
    pub fn count(&self) -> usize {
        self.with_nvs(|nvs| Ok(TABLE.count::<HostRecord>(nvs))).unwrap_or(0)
    }

    /// Stamp `last_used_time` with the current wall-clock time.
    pub fn touch(&self, id: &str) -> Result<()> {
        self.with_nvs(|nvs| {
            let (slot, mut rec) = TABLE.find::<HostRecord>(nvs, id).ok_or(Error::NotFound)?;
            rec.last_used_time = unix_secs();
            TABLE.write(nvs, slot, &rec)
        })?;
        self.schedule_export();
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.clear_nvs()?;
        self.passwords.lock().unwrap_or_else(|e| e.into_inner()).clear();
        info!("HostStore: cleared");
        self.schedule_export();
        Ok(())
    }

    fn clear_nvs(&self) -> Result<()> {
        self.with_nvs(|nvs| {
            for (slot, _) in TABLE.scan::<HostRecord>(nvs) {
                TABLE.erase(nvs, slot)?;
            }
            Ok(())
        })
    }

    /// Attach a password for this boot only.
    pub fn set_password(&self, id: &str, password: &str) -> Result<()> {
        self.get(id)?;
        self.passwords
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into(), Zeroizing::new(password.into()));
        Ok(())
    }

    pub fn password(&self, id: &str) -> Option<Zeroizing<String>> {
        self.passwords.lock().unwrap_or_else(|e| e.into_inner()).get(id).cloned()
    }

    /// Write the catalog files now instead of waiting for the scheduler.
    pub fn sync_now(&self) -> Result<usize> {
        self.export_files()
    }
}

impl MirroredCatalog for HostStore {
    fn label(&self) -> &'static str {
        "HostStore"
    }

    fn count(&self) -> usize {
        HostStore::count(self)
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
            let rec = match serde_json::from_value::<HostRecord>(item) {
                Ok(r) if !r.id.is_empty() && !r.host.is_empty() => r,
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            match self.put(&rec) {
                Ok(()) => imported += 1,
                Err(e) => {
                    debug!("HostStore: import of '{}' failed: {}", rec.id, e);
                    skipped += 1;
                }
            }
        }
        info!("HostStore: imported {} hosts (skipped {})", imported, skipped);
        Ok(imported)
    }

    fn export_files(&self) -> Result<usize> {
        let records: Vec<(String, HostRecord)> = self.list()?.into_iter().map(|r| (r.id.clone(), r)).collect();
        let n = FILES.write_all(self.files.as_ref(), &records)?;
        info!("HostStore: exported {} hosts", n);
        Ok(n)
    }
}

impl core::fmt::Debug for HostStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostStore")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
