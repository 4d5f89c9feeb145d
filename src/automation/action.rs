//! Action payloads and results.
//!
//! An [`Action`] is a value type: every payload embeds fixed-capacity
//! strings so it can be copied into the dispatcher queue without pointing
//! back at the caller.

use core::fmt;

use heapless::String;

use super::value::Value;
use crate::app::ports::Rgb;
use crate::bounded::bounded;
use crate::config::ACTION_OUTPUT_MAX;
use crate::error::Error;

// ───────────────────────────────────────────────────────────────
// Kinds and statuses
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Led,
    Ssh,
    SshRef,
    Cli,
    Gpio,
    Webhook,
    Log,
    SetVar,
    Device,
}

impl ActionType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Led => "LED",
            Self::Ssh => "SSH",
            Self::SshRef => "SSH-Ref",
            Self::Cli => "CLI",
            Self::Gpio => "GPIO",
            Self::Webhook => "Webhook",
            Self::Log => "Log",
            Self::SetVar => "SetVar",
            Self::Device => "Device",
        }
    }

    /// Key used in template documents (`"type"`).
    pub fn key(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Led => "led",
            Self::Ssh => "ssh_cmd",
            Self::SshRef => "ssh_cmd_ref",
            Self::Gpio => "gpio",
            Self::Webhook => "webhook",
            Self::Log => "log",
            Self::SetVar => "set_var",
            Self::Device => "device_ctrl",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "cli" => Self::Cli,
            "led" => Self::Led,
            "ssh_cmd" => Self::Ssh,
            "ssh_cmd_ref" => Self::SshRef,
            "gpio" => Self::Gpio,
            "webhook" => Self::Webhook,
            "log" => Self::Log,
            "set_var" => Self::SetVar,
            "device_ctrl" => Self::Device,
            _ => return None,
        })
    }

    /// SSH kinds get the longer sync-execute deadline.
    pub fn is_ssh(self) -> bool {
        matches!(self, Self::Ssh | Self::SshRef)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

impl ActionStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Payloads
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SshAction {
    /// Host id in the runtime registry or the host store.
    pub host_ref: String<32>,
    pub command: String<256>,
    /// 0 uses the configured default.
    pub timeout_ms: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SshRefAction {
    pub cmd_id: String<32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliAction {
    pub command: String<256>,
    /// Prefix for `.exit_code` / `.status` / `.output`; empty for none.
    pub var_name: String<64>,
    pub timeout_ms: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedControl {
    #[default]
    Fill,
    Effect,
    Brightness,
    Off,
    Text,
    Image,
    QrCode,
    Filter,
    FilterStop,
    TextStop,
}

impl LedControl {
    pub fn key(self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::Effect => "effect",
            Self::Brightness => "brightness",
            Self::Off => "off",
            Self::Text => "text",
            Self::Image => "image",
            Self::QrCode => "qrcode",
            Self::Filter => "filter",
            Self::FilterStop => "filter_stop",
            Self::TextStop => "text_stop",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "fill" => Self::Fill,
            "effect" => Self::Effect,
            "brightness" => Self::Brightness,
            "off" => Self::Off,
            "text" => Self::Text,
            "image" => Self::Image,
            "qrcode" => Self::QrCode,
            "filter" => Self::Filter,
            "filter_stop" => Self::FilterStop,
            "text_stop" => Self::TextStop,
            _ => return None,
        })
    }
}

/// Pixel index meaning "the whole strip".
pub const LED_INDEX_ALL: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq)]
pub struct LedAction {
    /// `touch`, `board`, `matrix` or a full device name.
    pub device: String<16>,
    pub ctrl_type: LedControl,
    pub index: u8,
    pub color: Rgb,
    pub brightness: u8,
    pub effect: String<32>,
    pub speed: u8,
    pub duration_ms: u16,
    pub text: String<128>,
    pub font: String<32>,
    pub image_path: String<128>,
    pub qr_text: String<128>,
    /// `L`, `M`, `Q` or `H`.
    pub qr_ecc: Option<char>,
    pub filter: String<32>,
    pub center: bool,
    pub looped: bool,
    pub scroll: String<16>,
    pub align: String<16>,
    pub x: i16,
    pub y: i16,
}

impl Default for LedAction {
    fn default() -> Self {
        Self {
            device: String::new(),
            ctrl_type: LedControl::Fill,
            index: LED_INDEX_ALL,
            color: Rgb::BLACK,
            brightness: 0,
            effect: String::new(),
            speed: 0,
            duration_ms: 0,
            text: String::new(),
            font: String::new(),
            image_path: String::new(),
            qr_text: String::new(),
            qr_ecc: None,
            filter: String::new(),
            center: false,
            looped: false,
            scroll: String::new(),
            align: String::new(),
            x: 0,
            y: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpioAction {
    pub pin: u8,
    pub level: bool,
    /// When non-zero, restore the opposite level after this long.
    pub pulse_ms: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookAction {
    pub url: String<128>,
    pub method: String<8>,
    pub body_template: String<256>,
}

/// ESP-IDF log level numbering (`ESP_LOG_ERROR` = 1 … `ESP_LOG_VERBOSE` = 5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Verbose,
}

impl LogLevel {
    /// Anything outside 1–5 logs at info.
    pub fn from_esp(level: u8) -> Self {
        match level {
            1 => Self::Error,
            2 => Self::Warn,
            4 => Self::Debug,
            5 => Self::Verbose,
            _ => Self::Info,
        }
    }

    pub fn to_esp(self) -> u8 {
        match self {
            Self::Error => 1,
            Self::Warn => 2,
            Self::Info => 3,
            Self::Debug => 4,
            Self::Verbose => 5,
        }
    }

    pub fn as_log(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Verbose => log::Level::Trace,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogAction {
    pub level: LogLevel,
    pub message: String<256>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetVarAction {
    pub variable: String<64>,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceAction {
    pub device: String<32>,
    pub action: String<32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Ssh(SshAction),
    SshRef(SshRefAction),
    Cli(CliAction),
    Led(LedAction),
    Gpio(GpioAction),
    Webhook(WebhookAction),
    Log(LogAction),
    SetVar(SetVarAction),
    Device(DeviceAction),
}

/// One unit of work for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// Sleep this long on the worker before running.
    pub delay_ms: u32,
    /// Template hint: queue instead of waiting.
    pub run_async: bool,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            delay_ms: 0,
            run_async: false,
        }
    }

    pub fn with_delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn action_type(&self) -> ActionType {
        match &self.kind {
            ActionKind::Ssh(_) => ActionType::Ssh,
            ActionKind::SshRef(_) => ActionType::SshRef,
            ActionKind::Cli(_) => ActionType::Cli,
            ActionKind::Led(_) => ActionType::Led,
            ActionKind::Gpio(_) => ActionType::Gpio,
            ActionKind::Webhook(_) => ActionType::Webhook,
            ActionKind::Log(_) => ActionType::Log,
            ActionKind::SetVar(_) => ActionType::SetVar,
            ActionKind::Device(_) => ActionType::Device,
        }
    }

    // ── Shorthand constructors ────────────────────────────────

    pub fn ssh(host_ref: &str, command: &str) -> Self {
        Self::new(ActionKind::Ssh(SshAction {
            host_ref: bounded(host_ref),
            command: bounded(command),
            timeout_ms: 0,
        }))
    }

    pub fn ssh_ref(cmd_id: &str) -> Self {
        Self::new(ActionKind::SshRef(SshRefAction {
            cmd_id: bounded(cmd_id),
        }))
    }

    pub fn cli(command: &str, var_name: &str) -> Self {
        Self::new(ActionKind::Cli(CliAction {
            command: bounded(command),
            var_name: bounded(var_name),
            timeout_ms: 0,
        }))
    }

    pub fn gpio(pin: u8, level: bool, pulse_ms: u32) -> Self {
        Self::new(ActionKind::Gpio(GpioAction {
            pin,
            level,
            pulse_ms,
        }))
    }

    pub fn log(level: LogLevel, message: &str) -> Self {
        Self::new(ActionKind::Log(LogAction {
            level,
            message: bounded(message),
        }))
    }

    pub fn set_var(variable: &str, value: Value) -> Self {
        Self::new(ActionKind::SetVar(SetVarAction {
            variable: bounded(variable),
            value,
        }))
    }
}

// ───────────────────────────────────────────────────────────────
// Result
// ───────────────────────────────────────────────────────────────

pub type OutputText = String<ACTION_OUTPUT_MAX>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub exit_code: i32,
    pub duration_ms: u32,
    /// Uptime at completion (milliseconds).
    pub timestamp_ms: u64,
    pub output: OutputText,
    /// Why a failed action failed, when the executor knows better than
    /// "the action ran and did not succeed".
    pub error: Option<Error>,
}

impl ActionResult {
    /// Replace the output message, truncating to [`ACTION_OUTPUT_MAX`].
    pub fn set_output(&mut self, text: &str) {
        self.output = bounded(text);
    }

    pub fn set_output_fmt(&mut self, args: fmt::Arguments<'_>) {
        self.set_output(&args.to_string());
    }

    pub fn failed(text: &str) -> Self {
        let mut r = Self {
            status: ActionStatus::Failed,
            ..Self::default()
        };
        r.set_output(text);
        r
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}
