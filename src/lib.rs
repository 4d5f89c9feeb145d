//! TianShan automation core library.
//!
//! Typed variables, action dispatch and execution, SSH host/command
//! catalogs with a keystore, service log-watch, and the dual-writer that
//! mirrors NVS catalogs to the SD card. All ESP-IDF-specific code is
//! guarded by `#[cfg(target_os = "espidf")]` within each module, so the
//! whole core runs and tests on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod automation;
pub mod bounded;
pub mod config;
pub mod error;
pub mod ssh;
pub mod storage;

pub mod adapters;
pub mod drivers;

pub use error::{Error, Result};
