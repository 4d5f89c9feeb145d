//! SSH side of the core: host and command catalogs, the keystore, remote
//! execution and service log-watch.

pub mod commands;
pub mod hosts;
pub mod keystore;
pub mod log_watch;
pub mod record;
pub mod remote;

pub use commands::{CommandRecord, CommandStore};
pub use hosts::{HostAuth, HostRecord, HostStore};
pub use keystore::{KeyInfo, KeyType, Keystore};
pub use log_watch::{LogWatchConfig, LogWatchEngine, WatchHandle, WatchState};
pub use remote::RemoteRunner;
