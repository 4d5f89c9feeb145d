//! Outbound application events.
//!
//! The variable store, dispatcher and log-watch engine emit these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them (serial log, WebSocket push, rule
//! evaluation).

use crate::automation::action::{ActionStatus, ActionType};
use crate::automation::value::Value;
use crate::ssh::log_watch::WatchState;

/// Structured events emitted by the automation core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A variable's value changed (never emitted for equal writes).
    VariableChanged { name: String, old: Value, new: Value },

    /// The executor finished an action.
    ActionCompleted {
        kind: ActionType,
        status: ActionStatus,
        duration_ms: u32,
    },

    /// A log-watch reached a terminal state.
    WatchFinished { var_name: String, state: WatchState },
}
