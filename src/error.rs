//! Unified error types for the automation core.
//!
//! Every store, the dispatcher and the log-watch engine return this one
//! `Error` so callers see the same kinds regardless of which subsystem
//! failed. Port-level errors (`StorageError`, `SshError`, ...) convert into
//! it with `From`.

use core::fmt;

use crate::app::ports::{ConsoleError, FileError, GpioError, LedError, SshError, StorageError};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A required argument was empty, too long or out of range.
    InvalidArgument(&'static str),
    /// The store or engine has not been initialised (or was torn down).
    Uninitialized,
    /// The addressed record, variable or key does not exist.
    NotFound,
    /// A record with the same id already exists (strict insert paths only).
    AlreadyExists,
    /// Catalog, registry or queue capacity is exhausted.
    NoSpace,
    /// A typed getter or setter was used on a value of another type.
    IncompatibleType,
    /// The target rejects external writes.
    ReadOnly,
    /// A bounded wait elapsed.
    Timeout,
    /// The SSH transport (or another remote collaborator) failed.
    TransportFailure,
    /// The operation is declared but not provided by this build.
    NotImplemented,
    /// A task or buffer could not be allocated.
    OutOfMemory,
    /// The action queue had no free slot within the enqueue wait.
    QueueFull,
    /// The action ran to completion and reported failure.
    ActionFailed,
    /// A durable NVS write or read failed.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Self::Uninitialized => write!(f, "not initialised"),
            Self::NotFound => write!(f, "not found"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::NoSpace => write!(f, "no space left"),
            Self::IncompatibleType => write!(f, "incompatible type"),
            Self::ReadOnly => write!(f, "read-only"),
            Self::Timeout => write!(f, "timed out"),
            Self::TransportFailure => write!(f, "transport failure"),
            Self::NotImplemented => write!(f, "not implemented"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::QueueFull => write!(f, "queue full"),
            Self::ActionFailed => write!(f, "action failed"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Port error conversions
// ---------------------------------------------------------------------------

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            StorageError::Full => Self::NoSpace,
            other => Self::Storage(other),
        }
    }
}

impl From<FileError> for Error {
    fn from(e: FileError) -> Self {
        match e {
            FileError::NotFound => Self::NotFound,
            FileError::NotMounted | FileError::Io | FileError::Malformed => {
                Self::TransportFailure
            }
        }
    }
}

impl From<SshError> for Error {
    fn from(e: SshError) -> Self {
        match e {
            SshError::Timeout => Self::Timeout,
            _ => Self::TransportFailure,
        }
    }
}

impl From<ConsoleError> for Error {
    fn from(e: ConsoleError) -> Self {
        match e {
            ConsoleError::UnknownCommand => Self::NotFound,
            ConsoleError::Failed => Self::TransportFailure,
        }
    }
}

impl From<GpioError> for Error {
    fn from(e: GpioError) -> Self {
        match e {
            GpioError::InvalidPin(_) => Self::InvalidArgument("gpio pin"),
            GpioError::ConfigFailed(_) | GpioError::WriteFailed(_) => Self::TransportFailure,
        }
    }
}

impl From<LedError> for Error {
    fn from(e: LedError) -> Self {
        match e {
            LedError::DeviceNotFound | LedError::UnknownEffect => Self::NotFound,
            LedError::Unsupported => Self::NotImplemented,
            LedError::Failed => Self::TransportFailure,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
