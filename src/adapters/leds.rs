//! LED adapter over the console `led` command.
//!
//! The rendering layer (strips, matrix, effects) is owned by the LED
//! component and driven through its shell command, the same way matrix
//! text and images are. Effect names unknown to the device come back with
//! a non-zero exit code.

use std::sync::Arc;

use log::debug;

use crate::app::ports::{ConsoleError, ConsolePort, LedError, LedPort, Rgb};
use crate::automation::color::format_color;

pub struct ConsoleLeds {
    console: Arc<dyn ConsolePort>,
}

impl ConsoleLeds {
    pub fn new(console: Arc<dyn ConsolePort>) -> Self {
        Self { console }
    }

    fn run(&self, line: &str, on_nonzero: LedError) -> Result<(), LedError> {
        debug!("leds: {}", line);
        match self.console.exec(line) {
            Ok(out) if out.code == 0 => Ok(()),
            Ok(_) => Err(on_nonzero),
            Err(ConsoleError::UnknownCommand) => Err(LedError::DeviceNotFound),
            Err(_) => Err(LedError::Failed),
        }
    }
}

impl LedPort for ConsoleLeds {
    fn stop_animation(&self, device: &str) -> Result<(), LedError> {
        self.run(&format!("led --stop --device {}", device), LedError::Failed)
    }

    fn fill(&self, device: &str, color: Rgb) -> Result<(), LedError> {
        self.run(
            &format!("led --fill --device {} --color {}", device, format_color(color)),
            LedError::Failed,
        )
    }

    fn set_pixel(&self, device: &str, index: u16, color: Rgb) -> Result<(), LedError> {
        self.run(
            &format!("led --pixel --device {} --index {} --color {}", device, index, format_color(color)),
            LedError::Failed,
        )
    }

    fn set_brightness(&self, device: &str, brightness: u8) -> Result<(), LedError> {
        self.run(
            &format!("led --brightness --device {} --value {}", device, brightness),
            LedError::Failed,
        )
    }

    fn start_effect(&self, device: &str, effect: &str, speed: u8) -> Result<(), LedError> {
        let mut line = format!("led --effect --device {} --name {}", device, effect);
        if speed > 0 {
            line.push_str(&format!(" --speed {}", speed));
        }
        self.run(&line, LedError::UnknownEffect)
    }
}
