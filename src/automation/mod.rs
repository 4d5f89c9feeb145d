//! Automation core: typed variables, `${...}` substitution, actions and
//! their dispatcher, and reusable action templates.
//!
//! ```text
//!  ActionTemplateStore ──▶ ActionManager ──queue──▶ worker ──▶ ActionExecutor
//!                                                                  │
//!           VariableStore ◀── result variables / ${...} ───────────┘
//! ```

pub mod action;
pub mod color;
pub mod dispatcher;
pub mod executors;
pub mod template;
pub mod templates;
pub mod value;
pub mod variables;

pub use action::{Action, ActionKind, ActionResult, ActionStatus, ActionType};
pub use dispatcher::{ActionManager, ActionStats, Callback};
pub use executors::{ActionExecutor, ExecutorDeps, RuntimeHost};
pub use templates::{ActionTemplate, ActionTemplateStore};
pub use value::{Value, ValueType};
pub use variables::VariableStore;
