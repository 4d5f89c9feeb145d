//! Port traits: the hexagonal boundary between the automation core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ stores / dispatcher / log-watch (domain)
//! ```
//!
//! Driven adapters (NVS, removable medium, SSH transport, console, GPIO,
//! LEDs, event sinks) implement these traits. The domain holds them as
//! `Arc<dyn Port>` so one adapter instance can be shared between the
//! executor task, log-watch tasks and background loaders.
//!
//! ## Security notes
//!
//! - **StoragePort** implementations SHOULD place the keystore namespace on
//!   the encrypted NVS partition.
//! - **SshAuth** carries secrets in [`Zeroizing`] buffers; adapters must not
//!   copy them into long-lived memory.

use embedded_hal::digital::{ErrorKind, OutputPin};
use zeroize::Zeroizing;

use super::events::AppEvent;
use crate::config::CoreConfig;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage (NVS).
///
/// - Keys are namespaced to prevent collisions between stores.
/// - Write operations MUST be committed before returning.
pub trait StoragePort: Send {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Size in bytes of the stored value.
    fn blob_len(&self, namespace: &str, key: &str) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Read a whole value of unknown size.
    fn read_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let len = self.blob_len(namespace, key)?;
        let mut buf = vec![0u8; len];
        let n = self.read(namespace, key, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`CoreConfig`].
///
/// Implementations MUST validate before persisting and reject out-of-range
/// values with [`ConfigError::ValidationFailed`].
pub trait ConfigPort {
    /// Load configuration, or [`CoreConfig::default()`] if none is stored.
    fn load(&self) -> Result<CoreConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &CoreConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// File store port (driven adapter: domain ↔ removable medium)
// ───────────────────────────────────────────────────────────────

/// Human-editable document storage on the removable medium.
///
/// Relative paths are resolved against the medium root; absolute paths are
/// used as given. Every call is best-effort: callers log and swallow
/// failures instead of failing the upstream operation.
pub trait FileStore: Send + Sync {
    /// Whether the medium is mounted and usable.
    fn is_mounted(&self) -> bool;

    fn read(&self, path: &str) -> Result<Vec<u8>, FileError>;

    /// Create or truncate `path` and write `data`.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), FileError>;

    fn remove(&self, path: &str) -> Result<(), FileError>;

    fn exists(&self, path: &str) -> bool;

    fn create_dir_all(&self, path: &str) -> Result<(), FileError>;

    /// File names (not paths) directly inside `dir`.
    fn list_dir(&self, dir: &str) -> Result<Vec<String>, FileError>;
}

// ───────────────────────────────────────────────────────────────
// SSH transport port (black-box connect / exec primitives)
// ───────────────────────────────────────────────────────────────

/// Credentials for one session.
#[derive(Clone)]
pub enum SshAuth {
    Password(Zeroizing<String>),
    /// PEM private key material.
    PrivateKey(Zeroizing<Vec<u8>>),
}

impl core::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Password(_) => write!(f, "Password(..)"),
            Self::PrivateKey(k) => write!(f, "PrivateKey({} bytes)", k.len()),
        }
    }
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SshConnectConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub timeout_ms: u32,
}

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Session factory.
pub trait SshTransport: Send + Sync {
    /// Create an unconnected session.
    fn create_session(&self, config: SshConnectConfig) -> Result<Box<dyn SshSession>, SshError>;
}

/// One SSH session, owned by the task that created it. Dropping the box
/// destroys the session.
pub trait SshSession: Send {
    fn connect(&mut self) -> Result<(), SshError>;

    fn exec(&mut self, command: &str) -> Result<ExecOutput, SshError>;

    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Console port (external shell-exec collaborator)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub code: i32,
    pub output: String,
}

/// Runs one command line through the device console.
pub trait ConsolePort: Send + Sync {
    fn exec(&self, line: &str) -> Result<ConsoleOutput, ConsoleError>;
}

// ───────────────────────────────────────────────────────────────
// GPIO port
// ───────────────────────────────────────────────────────────────

/// A configured push-pull output.
pub type OutputHandle = Box<dyn OutputPin<Error = GpioError> + Send>;

pub trait GpioPort: Send + Sync {
    /// Configure `pin` as a push-pull output and hand back its driver.
    fn configure_output(&self, pin: u8) -> Result<OutputHandle, GpioError>;
}

// ───────────────────────────────────────────────────────────────
// LED port (rendering layer lives elsewhere)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Device-level LED control. `device` is the full device name
/// (`led_touch`, `led_board`, `led_matrix`).
pub trait LedPort: Send + Sync {
    fn stop_animation(&self, device: &str) -> Result<(), LedError>;

    fn fill(&self, device: &str, color: Rgb) -> Result<(), LedError>;

    fn set_pixel(&self, device: &str, index: u16, color: Rgb) -> Result<(), LedError>;

    fn set_brightness(&self, device: &str, brightness: u8) -> Result<(), LedError>;

    /// Start a built-in animation by name.
    fn start_effect(&self, device: &str, effect: &str, speed: u8) -> Result<(), LedError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits [`AppEvent`]s through this port. Delivery is
/// best-effort and must never block the emitter for long.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`FileStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileError {
    NotMounted,
    NotFound,
    Io,
    /// The document exists but could not be parsed.
    Malformed,
}

/// Errors from the SSH transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshError {
    ConnectFailed,
    AuthFailed,
    Timeout,
    ChannelFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleError {
    UnknownCommand,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    InvalidPin(u8),
    ConfigFailed(i32),
    WriteFailed(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedError {
    DeviceNotFound,
    UnknownEffect,
    Unsupported,
    Failed,
}

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for FileError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotMounted => write!(f, "medium not mounted"),
            Self::NotFound => write!(f, "file not found"),
            Self::Io => write!(f, "I/O error"),
            Self::Malformed => write!(f, "malformed document"),
        }
    }
}

impl core::fmt::Display for SshError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::AuthFailed => write!(f, "authentication failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::ChannelFailed => write!(f, "channel failed"),
        }
    }
}

impl core::fmt::Display for GpioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "invalid pin {}", pin),
            Self::ConfigFailed(rc) => write!(f, "gpio config failed (rc={})", rc),
            Self::WriteFailed(rc) => write!(f, "gpio write failed (rc={})", rc),
        }
    }
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::Failed => write!(f, "command failed"),
        }
    }
}

impl core::fmt::Display for LedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DeviceNotFound => write!(f, "device not found"),
            Self::UnknownEffect => write!(f, "unknown effect"),
            Self::Unsupported => write!(f, "not supported"),
            Self::Failed => write!(f, "LED operation failed"),
        }
    }
}
