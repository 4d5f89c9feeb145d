//! Push-pull GPIO outputs for automation actions.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: `gpio_config` + `gpio_set_level` on the requested pin.
//! On host/test: levels are tracked in a shared in-memory map so tests can
//! observe what an action drove.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use embedded_hal::digital::{ErrorType, OutputPin};
use log::debug;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::app::ports::{GpioError, GpioPort, OutputHandle};

/// Highest usable GPIO number on the ESP32-S3.
pub const MAX_GPIO: u8 = 48;

/// Pin levels shared between the driver and every pin it handed out.
type Levels = Arc<Mutex<HashMap<u8, bool>>>;

#[derive(Default)]
pub struct GpioDriver {
    levels: Levels,
}

impl GpioDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to `pin`, `None` if never driven.
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner()).get(&pin).copied()
    }
}

impl GpioPort for GpioDriver {
    fn configure_output(&self, pin: u8) -> Result<OutputHandle, GpioError> {
        if pin > MAX_GPIO {
            return Err(GpioError::InvalidPin(pin));
        }
        configure(pin)?;
        debug!("gpio: pin {} configured as output", pin);
        Ok(Box::new(Output {
            pin,
            levels: Arc::clone(&self.levels),
        }))
    }
}

#[cfg(target_os = "espidf")]
fn configure(pin: u8) -> Result<(), GpioError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: plain register configuration of a validated pin number.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(GpioError::ConfigFailed(ret));
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn configure(_pin: u8) -> Result<(), GpioError> {
    Ok(())
}

struct Output {
    pin: u8,
    levels: Levels,
}

impl Output {
    fn write(&mut self, high: bool) -> Result<(), GpioError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: the pin was configured as an output in configure().
            let ret = unsafe { gpio_set_level(i32::from(self.pin), u32::from(high)) };
            if ret != ESP_OK as i32 {
                return Err(GpioError::WriteFailed(ret));
            }
        }
        self.levels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(self.pin, high);
        Ok(())
    }
}

impl ErrorType for Output {
    type Error = GpioError;
}

impl OutputPin for Output {
    fn set_low(&mut self) -> Result<(), GpioError> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), GpioError> {
        self.write(true)
    }
}
