//! GPIO outputs and core-pinned task spawning.

pub mod gpio;
pub mod task_pin;
