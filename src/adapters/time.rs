//! ESP32 time adapter.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` for monotonic
//!   time and `time()` for the wall clock.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` from first use
//!   and `SystemTime` for host-side testing and simulation.

#[cfg(not(target_os = "espidf"))]
use std::sync::OnceLock;

#[cfg(not(target_os = "espidf"))]
static START: OnceLock<std::time::Instant> = OnceLock::new();

/// Milliseconds since boot (monotonic).
#[cfg(target_os = "espidf")]
pub fn uptime_ms() -> u64 {
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
}

/// Milliseconds since first use (monotonic).
#[cfg(not(target_os = "espidf"))]
pub fn uptime_ms() -> u64 {
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_millis() as u64
}

/// Wall-clock seconds since the Unix epoch. Before SNTP sync this is the
/// RTC's idea of time, which starts at zero on a cold boot.
#[cfg(target_os = "espidf")]
pub fn unix_secs() -> u32 {
    let now = unsafe { esp_idf_svc::sys::time(core::ptr::null_mut()) };
    now.max(0) as u32
}

#[cfg(not(target_os = "espidf"))]
pub fn unix_secs() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
