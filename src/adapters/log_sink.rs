//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing automation events to the ESP-IDF
//! logger (UART / USB-CDC in production). A WebSocket push adapter or the
//! rule evaluator would implement the same trait.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::automation::action::ActionStatus;
use crate::ssh::log_watch::WatchState;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&self, event: &AppEvent) {
        match event {
            AppEvent::VariableChanged { name, old, new } => {
                debug!(
                    "VAR | {} : {} -> {}",
                    name,
                    old.to_text(),
                    new.to_text()
                );
            }
            AppEvent::ActionCompleted {
                kind,
                status,
                duration_ms,
            } => match status {
                ActionStatus::Success => {
                    info!("ACTION | {} {} in {} ms", kind.name(), status.name(), duration_ms);
                }
                _ => {
                    warn!("ACTION | {} {} in {} ms", kind.name(), status.name(), duration_ms);
                }
            },
            AppEvent::WatchFinished { var_name, state } => match state {
                WatchState::Ready => info!("WATCH | {} ready", var_name),
                other => warn!("WATCH | {} ended {}", var_name, other.as_str()),
            },
        }
    }
}
