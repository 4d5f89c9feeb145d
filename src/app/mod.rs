//! Application boundary: events and port traits.
//!
//! The automation core never touches NVS, the SD card, sockets or GPIO
//! registers directly. All of that happens through the **port traits**
//! defined in [`ports`], keeping the stores, dispatcher and log-watch
//! engine testable on the host with mock adapters.

pub mod events;
pub mod ports;
