//! Dual-writer persistence shared by the host, command and template stores.
//!
//! NVS is the store of record at runtime; the removable medium carries a
//! human-editable mirror that wins on cold boot when it holds more records.

pub mod documents;
pub mod slots;
pub mod sync;

pub use sync::{ExportScheduler, MirroredCatalog, Reconciled, reconcile, spawn_loader};
