//! Private key storage for SSH key authentication.
//!
//! Keys live in NVS namespace `ts_keystore` (on the encrypted partition on
//! device). Per key id: `<id>_priv` holds the PEM private key, `<id>_pub`
//! the optional public key and `<id>_meta` a postcard [`KeyInfo`]. The
//! `_index` key lists all ids.
//!
//! Private material only leaves the keystore through
//! [`Keystore::load_private_key`] (as a [`Zeroizing`] buffer) or through
//! [`Keystore::export_private_key_to_file`] for keys stored exportable.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::adapters::time::unix_secs;
use crate::app::ports::{FileStore, StoragePort};
use crate::bounded::truncate_str;
use crate::error::{Error, Result};

pub const NVS_NAMESPACE: &str = "ts_keystore";
const INDEX_KEY: &str = "_index";

pub const MAX_KEYS: usize = 8;
/// Longest id, exclusive of any terminator.
pub const ID_MAX: usize = 31;
pub const COMMENT_MAX: usize = 63;
pub const PRIVATE_KEY_MAX: usize = 4096;
pub const PUBLIC_KEY_MAX: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[default]
    Unknown,
    Rsa2048,
    Rsa4096,
    EcdsaP256,
    EcdsaP384,
}

impl KeyType {
    /// Guess the type from a PEM header and the encoded size.
    pub fn detect(pem: &[u8]) -> Self {
        let text = String::from_utf8_lossy(pem);
        if text.contains("BEGIN RSA PRIVATE KEY") {
            if pem.len() > 2500 { Self::Rsa4096 } else { Self::Rsa2048 }
        } else if text.contains("BEGIN EC PRIVATE KEY") {
            if pem.len() > 300 { Self::EcdsaP384 } else { Self::EcdsaP256 }
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Rsa2048 => "rsa2048",
            Self::Rsa4096 => "rsa4096",
            Self::EcdsaP256 => "ecdsa_p256",
            Self::EcdsaP384 => "ecdsa_p384",
        }
    }
}

/// Key metadata; never contains key material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub id: String,
    pub key_type: KeyType,
    pub comment: String,
    pub created_at: u32,
    pub last_used: u32,
    pub has_public_key: bool,
    /// Private key may be written to a file.
    pub exportable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StoreOptions<'a> {
    pub comment: &'a str,
    pub exportable: bool,
}

fn key_of(id: &str, suffix: &str) -> String {
    format!("{}{}", id, suffix)
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > ID_MAX {
        return Err(Error::InvalidArgument("key id must be 1-31 bytes"));
    }
    if id.contains(',') || id.starts_with('_') {
        return Err(Error::InvalidArgument("key id has reserved characters"));
    }
    Ok(())
}

pub struct Keystore {
    nvs: Mutex<Option<Box<dyn StoragePort>>>,
    files: Arc<dyn FileStore>,
}

impl Keystore {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self {
            nvs: Mutex::new(None),
            files,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn StoragePort>>> {
        self.nvs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_nvs<T>(&self, f: impl FnOnce(&mut dyn StoragePort) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let nvs = guard.as_mut().ok_or(Error::Uninitialized)?;
        f(nvs.as_mut())
    }

    /// A second call is a no-op.
    pub fn init(&self, nvs: Box<dyn StoragePort>) {
        let mut guard = self.lock();
        if guard.is_none() {
            let count = read_index(nvs.as_ref()).len();
            *guard = Some(nvs);
            info!("Keystore: initialized, {} keys", count);
        }
    }

    pub fn deinit(&self) {
        if self.lock().take().is_some() {
            info!("Keystore: deinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Store (or replace) a key pair.
    pub fn store_key(
        &self,
        id: &str,
        private_key: &[u8],
        public_key: Option<&[u8]>,
        key_type: KeyType,
        opts: &StoreOptions<'_>,
    ) -> Result<()> {
        validate_id(id)?;
        if private_key.is_empty() || private_key.len() > PRIVATE_KEY_MAX {
            return Err(Error::InvalidArgument("private key size"));
        }
        let public_key = public_key.filter(|p| !p.is_empty() && p.len() < PUBLIC_KEY_MAX);

        self.with_nvs(|nvs| {
            let mut index = read_index(nvs);
            let is_new = !index.iter().any(|k| k == id);
            if is_new && index.len() >= MAX_KEYS {
                warn!("Keystore: full, cannot store '{}'", id);
                return Err(Error::NoSpace);
            }

            nvs.write(NVS_NAMESPACE, &key_of(id, "_priv"), private_key)?;
            let has_public_key = match public_key {
                Some(pub_key) => match nvs.write(NVS_NAMESPACE, &key_of(id, "_pub"), pub_key) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Keystore: public key for '{}' not stored: {}", id, e);
                        false
                    }
                },
                None => {
                    nvs.delete(NVS_NAMESPACE, &key_of(id, "_pub"))?;
                    false
                }
            };

            let info = KeyInfo {
                id: id.into(),
                key_type,
                comment: truncate_str(opts.comment, COMMENT_MAX).into(),
                created_at: unix_secs(),
                last_used: 0,
                has_public_key,
                exportable: opts.exportable,
            };
            write_meta(nvs, &info)?;

            if is_new {
                index.push(id.into());
                write_index(nvs, &index)?;
            }
            Ok(())
        })?;
        info!(
            "Keystore: stored '{}' ({}, {} bytes, exportable={})",
            id,
            key_type.as_str(),
            private_key.len(),
            opts.exportable
        );
        Ok(())
    }

    /// The private key, zeroed on drop. Stamps `last_used`.
    pub fn load_private_key(&self, id: &str) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.with_nvs(|nvs| {
            let mut blob = Zeroizing::new(nvs.read_blob(NVS_NAMESPACE, &key_of(id, "_priv"))?);
            // PEM text ends at the first NUL, if one was stored.
            if let Some(end) = blob.iter().position(|&b| b == 0) {
                blob.truncate(end);
            }
            Ok(blob)
        })?;
        if let Err(e) = self.touch(id) {
            debug!("Keystore: touch '{}' failed: {}", id, e);
        }
        debug!("Keystore: loaded private key '{}' ({} bytes)", id, key.len());
        Ok(key)
    }

    pub fn load_public_key(&self, id: &str) -> Result<String> {
        self.with_nvs(|nvs| {
            let blob = nvs.read_blob(NVS_NAMESPACE, &key_of(id, "_pub"))?;
            Ok(String::from_utf8_lossy(&blob).trim_end_matches('\0').to_owned())
        })
    }

    pub fn exists(&self, id: &str) -> bool {
        self.with_nvs(|nvs| Ok(nvs.exists(NVS_NAMESPACE, &key_of(id, "_priv"))))
            .unwrap_or(false)
    }

    pub fn delete_key(&self, id: &str) -> Result<()> {
        self.with_nvs(|nvs| {
            let mut index = read_index(nvs);
            let before = index.len();
            index.retain(|k| k != id);
            if index.len() == before && !nvs.exists(NVS_NAMESPACE, &key_of(id, "_priv")) {
                return Err(Error::NotFound);
            }
            for suffix in ["_priv", "_pub", "_meta"] {
                nvs.delete(NVS_NAMESPACE, &key_of(id, suffix))?;
            }
            write_index(nvs, &index)
        })?;
        info!("Keystore: deleted '{}'", id);
        Ok(())
    }

    pub fn key_info(&self, id: &str) -> Result<KeyInfo> {
        self.with_nvs(|nvs| read_meta(nvs, id))
    }

    /// Metadata of every key in the index. Keys whose metadata went
    /// missing are listed with defaults.
    pub fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        self.with_nvs(|nvs| {
            Ok(read_index(nvs)
                .into_iter()
                .map(|id| {
                    read_meta(nvs, &id).unwrap_or(KeyInfo {
                        id,
                        ..KeyInfo::default()
                    })
                })
                .collect())
        })
    }

    pub fn touch(&self, id: &str) -> Result<()> {
        self.with_nvs(|nvs| {
            let mut info = read_meta(nvs, id)?;
            info.last_used = unix_secs();
            write_meta(nvs, &info)
        })
    }

    /// Read `path` (and `<path>.pub` if present) into the keystore.
    pub fn import_from_file(&self, id: &str, path: &str, comment: &str) -> Result<()> {
        info!("Keystore: importing '{}' from {}", id, path);
        let private = Zeroizing::new(self.files.read(path)?);
        if private.is_empty() || private.len() > PRIVATE_KEY_MAX {
            return Err(Error::InvalidArgument("private key file size"));
        }
        let public = self.files.read(&format!("{}.pub", path)).ok();
        let key_type = KeyType::detect(&private);
        self.store_key(
            id,
            &private,
            public.as_deref(),
            key_type,
            &StoreOptions {
                comment,
                exportable: false,
            },
        )
    }

    pub fn export_public_key_to_file(&self, id: &str, path: &str) -> Result<()> {
        let public = self.load_public_key(id)?;
        if public.is_empty() {
            return Err(Error::NotFound);
        }
        self.files.write(path, public.as_bytes())?;
        info!("Keystore: public key '{}' exported to {}", id, path);
        Ok(())
    }

    /// Refused with [`Error::ReadOnly`] unless the key was stored exportable.
    pub fn export_private_key_to_file(&self, id: &str, path: &str) -> Result<()> {
        let info = self.key_info(id)?;
        if !info.exportable {
            warn!("Keystore: '{}' is not exportable", id);
            return Err(Error::ReadOnly);
        }
        let private = self.load_private_key(id)?;
        self.files.write(path, &private)?;
        warn!("Keystore: private key '{}' exported to {}", id, path);
        Ok(())
    }
}

fn read_index(nvs: &dyn StoragePort) -> Vec<String> {
    nvs.read_blob(NVS_NAMESPACE, INDEX_KEY)
        .ok()
        .and_then(|b| postcard::from_bytes::<Vec<String>>(&b).ok())
        .unwrap_or_default()
}

fn write_index(nvs: &mut dyn StoragePort, index: &[String]) -> Result<()> {
    let bytes = postcard::to_allocvec(index).map_err(|_| Error::InvalidArgument("key index encode"))?;
    nvs.write(NVS_NAMESPACE, INDEX_KEY, &bytes)?;
    Ok(())
}

fn read_meta(nvs: &dyn StoragePort, id: &str) -> Result<KeyInfo> {
    let bytes = nvs.read_blob(NVS_NAMESPACE, &key_of(id, "_meta"))?;
    postcard::from_bytes(&bytes).map_err(|_| Error::NotFound)
}

fn write_meta(nvs: &mut dyn StoragePort, info: &KeyInfo) -> Result<()> {
    let bytes = postcard::to_allocvec(info).map_err(|_| Error::InvalidArgument("key info encode"))?;
    nvs.write(NVS_NAMESPACE, &key_of(&info.id, "_meta"), &bytes)?;
    Ok(())
}

impl core::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Keystore")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
