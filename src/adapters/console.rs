//! Console adapter: runs command lines for CLI and matrix LED actions.
//!
//! On ESP-IDF the line goes to `esp_console_run`; the registered command's
//! return code is the exit code and no output text is captured. On host,
//! commands are closures registered by name, so simulations and tests can
//! stand in for the device shell.

use std::collections::VecDeque;
use std::sync::Mutex;

use log::debug;

use crate::app::ports::{ConsoleError, ConsoleOutput, ConsolePort};

/// Lines kept in the history ring.
const HISTORY_DEPTH: usize = 16;

#[cfg(not(target_os = "espidf"))]
type Handler = Box<dyn Fn(&str) -> ConsoleOutput + Send + Sync>;

#[derive(Default)]
pub struct ConsoleAdapter {
    history: Mutex<VecDeque<String>>,
    #[cfg(not(target_os = "espidf"))]
    handlers: Mutex<Vec<(String, Handler)>>,
}

impl ConsoleAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent lines, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).iter().cloned().collect()
    }

    fn remember(&self, line: &str) {
        let mut h = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if h.len() == HISTORY_DEPTH {
            h.pop_front();
        }
        h.push_back(line.into());
    }

    /// Register `name`; the handler receives the whole line.
    #[cfg(not(target_os = "espidf"))]
    pub fn register(&self, name: &str, handler: impl Fn(&str) -> ConsoleOutput + Send + Sync + 'static) {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.retain(|(n, _)| n != name);
        handlers.push((name.into(), Box::new(handler)));
    }

    #[cfg(target_os = "espidf")]
    fn run(&self, line: &str) -> Result<ConsoleOutput, ConsoleError> {
        use esp_idf_svc::sys::*;

        let cmd = std::ffi::CString::new(line).map_err(|_| ConsoleError::Failed)?;
        let mut code: i32 = 0;
        // SAFETY: `cmd` is a valid NUL-terminated string that outlives the call.
        let ret = unsafe { esp_console_run(cmd.as_ptr(), &mut code) };
        match ret {
            r if r == ESP_OK as i32 => Ok(ConsoleOutput {
                code,
                output: String::new(),
            }),
            r if r == ESP_ERR_NOT_FOUND as i32 => Err(ConsoleError::UnknownCommand),
            _ => Err(ConsoleError::Failed),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn run(&self, line: &str) -> Result<ConsoleOutput, ConsoleError> {
        let name = line.split_whitespace().next().ok_or(ConsoleError::Failed)?;
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let (_, handler) = handlers
            .iter()
            .find(|(n, _)| n == name)
            .ok_or(ConsoleError::UnknownCommand)?;
        Ok(handler(line))
    }
}

impl ConsolePort for ConsoleAdapter {
    fn exec(&self, line: &str) -> Result<ConsoleOutput, ConsoleError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ConsoleError::Failed);
        }
        self.remember(line);
        let out = self.run(line);
        debug!("console: '{}' -> {:?}", line, out.as_ref().map(|o| o.code));
        out
    }
}
