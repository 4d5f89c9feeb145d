//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! mock adapters. All tests run on the host (x86_64) with no real
//! hardware, SSH server or SD card required.

mod dispatcher_tests;
mod dual_writer_tests;
mod log_watch_tests;
mod mocks;
mod ssh_ref_tests;
mod variable_tests;

use std::time::{Duration, Instant};

/// Poll `cond` every 10 ms until it holds or `timeout_ms` passes.
pub fn eventually(timeout_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
