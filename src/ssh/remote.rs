//! Remote execution over the SSH transport port.
//!
//! Resolves credentials for a stored host (keystore first, then a key file
//! on the removable medium, then the runtime password) and runs one command
//! per session. Sessions never outlive the call that opened them.

use std::sync::Arc;

use log::{debug, warn};
use zeroize::Zeroizing;

use super::hosts::{HostRecord, HostStore};
use super::keystore::Keystore;
use crate::app::ports::{ExecOutput, FileStore, SshAuth, SshConnectConfig, SshTransport};
use crate::error::{Error, Result};

/// Directory on the medium searched for key files named by key id.
const KEY_DIR: &str = "ssh";

pub struct RemoteRunner {
    transport: Arc<dyn SshTransport>,
    hosts: Arc<HostStore>,
    keystore: Arc<Keystore>,
    files: Arc<dyn FileStore>,
    default_timeout_ms: u32,
}

impl RemoteRunner {
    pub fn new(
        transport: Arc<dyn SshTransport>,
        hosts: Arc<HostStore>,
        keystore: Arc<Keystore>,
        files: Arc<dyn FileStore>,
        default_timeout_ms: u32,
    ) -> Self {
        Self {
            transport,
            hosts,
            keystore,
            files,
            default_timeout_ms,
        }
    }

    pub fn hosts(&self) -> &Arc<HostStore> {
        &self.hosts
    }

    pub fn default_timeout_ms(&self) -> u32 {
        self.default_timeout_ms
    }

    /// Private key by id. Ids missing from the keystore are tried as a file
    /// path: absolute as given, otherwise `ssh/<id>` under the media root.
    pub fn load_key(&self, key_id: &str) -> Result<Zeroizing<Vec<u8>>> {
        if key_id.is_empty() {
            return Err(Error::InvalidArgument("key id is empty"));
        }
        match self.keystore.load_private_key(key_id) {
            Ok(key) => return Ok(key),
            Err(e) => debug!("RemoteRunner: keystore miss for '{}' ({}), trying file", key_id, e),
        }
        let path = if key_id.starts_with('/') {
            key_id.to_owned()
        } else {
            format!("{}/{}", KEY_DIR, key_id)
        };
        let key = Zeroizing::new(self.files.read(&path).inspect_err(|e| {
            warn!("RemoteRunner: key '{}' not in keystore nor at {}: {}", key_id, path, e);
        })?);
        Ok(key)
    }

    /// Connection parameters for a stored host. `timeout_ms == 0` uses the
    /// configured default.
    pub fn connect_config(&self, host: &HostRecord, timeout_ms: u32) -> Result<SshConnectConfig> {
        let auth = if host.uses_key() {
            SshAuth::PrivateKey(self.load_key(&host.keyid)?)
        } else {
            let password = self.hosts.password(&host.id).ok_or_else(|| {
                warn!("RemoteRunner: host '{}' needs a password and none is set", host.id);
                Error::InvalidArgument("no password for host")
            })?;
            SshAuth::Password(password)
        };
        Ok(SshConnectConfig {
            host: host.host.clone(),
            port: host.port,
            username: host.username.clone(),
            auth,
            timeout_ms: if timeout_ms == 0 { self.default_timeout_ms } else { timeout_ms },
        })
    }

    /// Open a session, run `command`, close the session.
    pub fn exec(&self, config: SshConnectConfig, command: &str) -> Result<ExecOutput> {
        let target = format!("{}@{}:{}", config.username, config.host, config.port);
        let mut session = self.transport.create_session(config).inspect_err(|e| {
            warn!("RemoteRunner: session for {} not created: {}", target, e);
        })?;
        if let Err(e) = session.connect() {
            warn!("RemoteRunner: connect to {} failed: {}", target, e);
            return Err(e.into());
        }
        let out = session.exec(command);
        session.disconnect();
        let out = out.inspect_err(|e| warn!("RemoteRunner: exec on {} failed: {}", target, e))?;
        debug!("RemoteRunner: {} exit={}", target, out.exit_code);
        Ok(out)
    }

    /// Run `command` on the stored host `host_id`.
    pub fn exec_on(&self, host_id: &str, command: &str, timeout_ms: u32) -> Result<ExecOutput> {
        let host = self.hosts.get(host_id)?;
        if !host.enabled {
            return Err(Error::InvalidArgument("host is disabled"));
        }
        let config = self.connect_config(&host, timeout_ms)?;
        let out = self.exec(config, command)?;
        if let Err(e) = self.hosts.touch(host_id) {
            debug!("RemoteRunner: touch '{}' failed: {}", host_id, e);
        }
        Ok(out)
    }
}

impl core::fmt::Debug for RemoteRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RemoteRunner")
            .field("default_timeout_ms", &self.default_timeout_ms)
            .finish_non_exhaustive()
    }
}
