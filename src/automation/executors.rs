//! Per-kind action execution.
//!
//! [`ActionExecutor::run`] turns one [`Action`] into an [`ActionResult`].
//! It never fails as a Rust call: transport and collaborator errors become
//! `Failed` or `Timeout` results with a short message. String fields are
//! expanded against the variable store before use.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};
use zeroize::Zeroizing;

use super::action::{
    Action, ActionKind, ActionResult, ActionStatus, CliAction, GpioAction, LedAction, LedControl,
    LogAction, SetVarAction, SshAction, SshRefAction, LED_INDEX_ALL,
};
use super::color::format_color;
use super::template::expand;
use super::value::Value;
use super::variables::VariableStore;
use crate::adapters::time::{unix_secs, uptime_ms};
use crate::app::ports::{
    ConsolePort, ExecOutput, GpioError, GpioPort, LedError, LedPort, OutputHandle, Rgb, SshAuth,
    SshConnectConfig,
};
use crate::bounded::truncate_str;
use crate::error::{Error, Result};
use crate::ssh::commands::{CommandRecord, CommandStore, DEFAULT_CHECK_INTERVAL_MS};
use crate::ssh::log_watch::{LogWatchConfig, LogWatchEngine};
use crate::ssh::remote::RemoteRunner;

/// Runtime host registry capacity.
pub const MAX_RUNTIME_HOSTS: usize = 8;

/// Longest expanded SSH command (bytes).
const SSH_COMMAND_MAX: usize = 1024;
/// Longest expanded message or text field (bytes).
const TEXT_MAX: usize = 256;

/// Source id for result variables created on the fly.
const VAR_SOURCE: &str = "action_mgr";

const MATRIX_DEVICE: &str = "led_matrix";

/// An SSH endpoint registered at runtime, consulted before the host store.
/// Never persisted.
#[derive(Clone)]
pub struct RuntimeHost {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Zeroizing<String>,
    pub use_key_auth: bool,
    /// Keystore id or key file path.
    pub key_id: String,
}

impl core::fmt::Debug for RuntimeHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuntimeHost")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("use_key_auth", &self.use_key_auth)
            .finish_non_exhaustive()
    }
}

/// File-name-safe form of a command name: ASCII alphanumerics only, at
/// most 20 of them, `"cmd"` when nothing is left.
pub fn nohup_safe_name(name: &str) -> String {
    let safe: String = name.chars().filter(char::is_ascii_alphanumeric).take(20).collect();
    if safe.is_empty() { "cmd".into() } else { safe }
}

pub fn nohup_log_path(safe: &str) -> String {
    format!("/tmp/ts_nohup_{}.log", safe)
}

/// Background launch with output redirected to the log and the PID kept
/// next to it.
pub fn nohup_wrap(command: &str, safe: &str) -> String {
    format!(
        "nohup {} > {} 2>&1 & echo $! > /tmp/ts_nohup_{}.pid",
        command,
        nohup_log_path(safe),
        safe
    )
}

/// Full LED device name for the short aliases.
pub fn resolve_led_device(name: &str) -> &str {
    match name {
        "touch" => "led_touch",
        "board" => "led_board",
        "matrix" => "led_matrix",
        other => other,
    }
}

/// Collaborators of the executor.
pub struct ExecutorDeps {
    pub vars: Arc<VariableStore>,
    pub runner: Arc<RemoteRunner>,
    pub commands: Arc<CommandStore>,
    pub log_watch: Arc<LogWatchEngine>,
    pub console: Arc<dyn ConsolePort>,
    pub gpio: Arc<dyn GpioPort>,
    pub leds: Arc<dyn LedPort>,
}

pub struct ActionExecutor {
    vars: Arc<VariableStore>,
    runner: Arc<RemoteRunner>,
    commands: Arc<CommandStore>,
    log_watch: Arc<LogWatchEngine>,
    console: Arc<dyn ConsolePort>,
    gpio: Arc<dyn GpioPort>,
    leds: Arc<dyn LedPort>,
    hosts: Mutex<Vec<RuntimeHost>>,
}

impl ActionExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self {
            vars: deps.vars,
            runner: deps.runner,
            commands: deps.commands,
            log_watch: deps.log_watch,
            console: deps.console,
            gpio: deps.gpio,
            leds: deps.leds,
            hosts: Mutex::new(Vec::new()),
        }
    }

    pub fn vars(&self) -> &Arc<VariableStore> {
        &self.vars
    }

    fn host_table(&self) -> MutexGuard<'_, Vec<RuntimeHost>> {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Runtime host registry ─────────────────────────────────────

    pub fn register_host(&self, host: RuntimeHost) -> Result<()> {
        if host.id.is_empty() || host.host.is_empty() {
            return Err(Error::InvalidArgument("runtime host needs id and address"));
        }
        let mut table = self.host_table();
        if let Some(existing) = table.iter_mut().find(|h| h.id == host.id) {
            debug!("ActionExecutor: updated runtime host '{}'", host.id);
            *existing = host;
            return Ok(());
        }
        if table.len() >= MAX_RUNTIME_HOSTS {
            warn!("ActionExecutor: runtime host limit reached");
            return Err(Error::NoSpace);
        }
        info!(
            "ActionExecutor: registered runtime host {} ({}@{}:{})",
            host.id, host.username, host.host, host.port
        );
        table.push(host);
        Ok(())
    }

    pub fn unregister_host(&self, id: &str) -> Result<()> {
        let mut table = self.host_table();
        let i = table.iter().position(|h| h.id == id).ok_or(Error::NotFound)?;
        table.swap_remove(i);
        info!("ActionExecutor: unregistered runtime host {}", id);
        Ok(())
    }

    pub fn get_host(&self, id: &str) -> Option<RuntimeHost> {
        self.host_table().iter().find(|h| h.id == id).cloned()
    }

    pub fn host_count(&self) -> usize {
        self.host_table().len()
    }

    /// Connection parameters for `host_id`: runtime registry first, then
    /// the host store.
    fn resolve_target(&self, host_id: &str, timeout_ms: u32) -> Result<SshConnectConfig> {
        let timeout_ms = if timeout_ms == 0 { self.runner.default_timeout_ms() } else { timeout_ms };
        if let Some(h) = self.get_host(host_id) {
            let auth = if h.use_key_auth && !h.key_id.is_empty() {
                SshAuth::PrivateKey(self.runner.load_key(&h.key_id)?)
            } else {
                SshAuth::Password(h.password.clone())
            };
            return Ok(SshConnectConfig {
                host: h.host,
                port: h.port,
                username: h.username,
                auth,
                timeout_ms,
            });
        }
        let host = self.runner.hosts().get(host_id)?;
        self.runner.connect_config(&host, timeout_ms)
    }

    // ── Dispatch ──────────────────────────────────────────────────

    pub fn run(&self, action: &Action) -> ActionResult {
        let started = uptime_ms();
        let mut r = ActionResult {
            status: ActionStatus::Running,
            ..ActionResult::default()
        };

        match &action.kind {
            ActionKind::Ssh(a) => self.run_ssh(a, &mut r),
            ActionKind::SshRef(a) => self.run_ssh_ref(a, &mut r),
            ActionKind::Cli(a) => self.run_cli(a, &mut r),
            ActionKind::Led(a) => self.run_led(a, &mut r),
            ActionKind::Gpio(a) => self.run_gpio(a, &mut r),
            ActionKind::Log(a) => self.run_log(a, &mut r),
            ActionKind::SetVar(a) => self.run_set_var(a, &mut r),
            ActionKind::Webhook(_) => {
                r.status = ActionStatus::Failed;
                r.error = Some(Error::NotImplemented);
                r.set_output("Webhook not implemented");
            }
            ActionKind::Device(d) => {
                info!("ActionExecutor: device control {} -> {}", d.device, d.action);
                r.status = ActionStatus::Failed;
                r.error = Some(Error::NotImplemented);
                r.set_output_fmt(format_args!("Device control: {}.{} (not implemented)", d.device, d.action));
            }
        }

        r.timestamp_ms = uptime_ms();
        r.duration_ms = (r.timestamp_ms - started) as u32;
        r
    }

    fn expand(&self, input: &str, max: usize) -> String {
        expand(&self.vars, input, max)
    }

    fn publish(&self, name: &str, value: Value) {
        if let Err(e) = self.vars.upsert_internal(name, value, VAR_SOURCE) {
            warn!("ActionExecutor: cannot set '{}': {}", name, e);
        }
    }

    // ── SSH ───────────────────────────────────────────────────────

    fn run_ssh(&self, a: &SshAction, r: &mut ActionResult) {
        let target = match self.resolve_target(&a.host_ref, a.timeout_ms) {
            Ok(t) => t,
            Err(Error::NotFound) => {
                r.status = ActionStatus::Failed;
                r.set_output_fmt(format_args!("SSH host '{}' not found", a.host_ref));
                return;
            }
            Err(e) => {
                r.status = ActionStatus::Failed;
                r.set_output_fmt(format_args!("SSH auth setup failed: {}", e));
                return;
            }
        };
        let command = self.expand(&a.command, SSH_COMMAND_MAX);
        info!("ActionExecutor: SSH [{}]: {}", a.host_ref, command);
        let out = self.runner.exec(target, &command);
        record_exec(&out, r);
    }

    fn run_ssh_ref(&self, a: &SshRefAction, r: &mut ActionResult) {
        let cmd = match self.commands.get(&a.cmd_id) {
            Ok(c) => c,
            Err(_) => {
                warn!("ActionExecutor: SSH command ref not found: {}", a.cmd_id);
                r.status = ActionStatus::Failed;
                r.set_output_fmt(format_args!("SSH command '{}' not found", a.cmd_id));
                return;
            }
        };
        if !cmd.enabled {
            r.status = ActionStatus::Failed;
            r.set_output_fmt(format_args!("SSH command '{}' is disabled", a.cmd_id));
            return;
        }
        info!(
            "ActionExecutor: SSH ref [{}]: host={} var='{}' nohup={} service_mode={}",
            cmd.id, cmd.host_id, cmd.var_name, cmd.nohup, cmd.service_mode
        );

        let timeout_ms = u32::from(cmd.timeout_sec) * 1000;
        let watches = cmd.nohup && cmd.service_mode && !cmd.ready_pattern.is_empty() && !cmd.var_name.is_empty();
        let mut watch_target = None;
        let out = match self.resolve_target(&cmd.host_id, timeout_ms) {
            Ok(target) => {
                if watches {
                    watch_target = Some(target.clone());
                }
                let expanded = self.expand(&cmd.command, SSH_COMMAND_MAX);
                let command = if cmd.nohup {
                    let wrapped = nohup_wrap(&expanded, &nohup_safe_name(&cmd.name));
                    info!("ActionExecutor: nohup mode: {}", wrapped);
                    wrapped
                } else {
                    expanded
                };
                let out = self.runner.exec(target, &command);
                record_exec(&out, r);
                out
            }
            Err(e) => {
                r.status = ActionStatus::Failed;
                if e == Error::NotFound {
                    r.set_output_fmt(format_args!(
                        "SSH host '{}' not found for command '{}'",
                        cmd.host_id, cmd.id
                    ));
                } else {
                    r.set_output_fmt(format_args!("SSH auth setup failed: {}", e));
                }
                Err(e)
            }
        };

        if !cmd.var_name.is_empty() {
            let exit_code = out.as_ref().map(|o| o.exit_code).unwrap_or(-1);
            self.publish_ssh_ref(&cmd, exit_code);
        }
        if let (Ok(_), Some(target)) = (&out, watch_target) {
            self.start_watch(&cmd, target);
        }
        if let Err(e) = self.commands.update_exec_time(&cmd.id) {
            debug!("ActionExecutor: exec time of '{}' not updated: {}", cmd.id, e);
        }
    }

    /// `.timestamp` is wall-clock unix seconds rather than uptime, so it
    /// stays comparable across reboots.
    fn publish_ssh_ref(&self, cmd: &CommandRecord, exit_code: i32) {
        let p = &cmd.var_name;
        self.publish(&format!("{}.exit_code", p), Value::Int(exit_code));
        self.publish(
            &format!("{}.status", p),
            Value::text(if exit_code == 0 { "success" } else { "failed" }),
        );
        self.publish(&format!("{}.timestamp", p), Value::Int(unix_secs() as i32));
        let info = format!(
            "nohup={},svcmode={},pattern={}",
            u8::from(cmd.nohup),
            u8::from(cmd.service_mode),
            truncate_str(&cmd.ready_pattern, 64)
        );
        self.publish(&format!("{}.exec_info", p), Value::text(&info));
    }

    /// Probes go to the endpoint the service was launched on.
    fn start_watch(&self, cmd: &CommandRecord, target: SshConnectConfig) {
        let safe = nohup_safe_name(&cmd.name);
        let mut config = LogWatchConfig::new(&cmd.host_id, &nohup_log_path(&safe), &cmd.ready_pattern, &cmd.var_name)
            .with_fail_pattern(&cmd.service_fail_pattern);
        if cmd.ready_timeout_sec > 0 {
            config.timeout_sec = u32::from(cmd.ready_timeout_sec);
        }
        config.check_interval_ms = u32::from(if cmd.ready_check_interval_ms > 0 {
            cmd.ready_check_interval_ms
        } else {
            DEFAULT_CHECK_INTERVAL_MS
        });
        match self.log_watch.start_on(config, target) {
            Ok(_) => info!(
                "ActionExecutor: service mode, watching for '{}' (fail='{}')",
                cmd.ready_pattern, cmd.service_fail_pattern
            ),
            Err(e) => warn!("ActionExecutor: log watch not started: {}", e),
        }
    }

    // ── CLI ───────────────────────────────────────────────────────

    fn run_cli(&self, a: &CliAction, r: &mut ActionResult) {
        if a.command.is_empty() {
            r.status = ActionStatus::Failed;
            r.set_output("Empty CLI command");
            return;
        }
        let command = self.expand(&a.command, TEXT_MAX);
        info!("ActionExecutor: CLI: {}", command);
        match self.console.exec(&command) {
            Ok(out) => {
                r.exit_code = out.code;
                r.status = if out.code == 0 { ActionStatus::Success } else { ActionStatus::Failed };
                if out.output.is_empty() {
                    r.set_output_fmt(format_args!("CLI command completed (code={})", out.code));
                } else {
                    r.set_output(&out.output);
                }
                if !a.var_name.is_empty() {
                    let p = &a.var_name;
                    self.publish(&format!("{}.exit_code", p), Value::Int(out.code));
                    self.publish(
                        &format!("{}.status", p),
                        Value::text(if out.code == 0 { "success" } else { "failed" }),
                    );
                    self.publish(&format!("{}.output", p), Value::text(&r.output));
                }
            }
            Err(e) => {
                r.status = ActionStatus::Failed;
                r.set_output_fmt(format_args!("CLI exec failed: {}", e));
            }
        }
    }

    // ── LED ───────────────────────────────────────────────────────

    fn console_led(&self, cmd: &str) -> core::result::Result<(), LedError> {
        info!("ActionExecutor: LED CLI: {}", cmd);
        match self.console.exec(cmd) {
            Ok(out) if out.code == 0 => Ok(()),
            Ok(_) | Err(_) => Err(LedError::Failed),
        }
    }

    fn run_led(&self, a: &LedAction, r: &mut ActionResult) {
        let text = self.expand(&a.text, TEXT_MAX);
        let image_path = self.expand(&a.image_path, TEXT_MAX);
        let qr_text = self.expand(&a.qr_text, TEXT_MAX);
        let filter = self.expand(&a.filter, TEXT_MAX);
        let effect = self.expand(&a.effect, TEXT_MAX);

        let device = resolve_led_device(&a.device);
        let on_matrix = device == MATRIX_DEVICE;
        debug!("ActionExecutor: LED device={} ctrl={}", device, a.ctrl_type.key());

        let outcome: core::result::Result<String, (LedError, String)> = match a.ctrl_type {
            LedControl::Off => self
                .leds
                .stop_animation(device)
                .and_then(|()| self.leds.fill(device, Rgb::BLACK))
                .map(|()| format!("LED {} turned off", a.device))
                .map_err(|e| (e, String::new())),
            LedControl::Brightness => self
                .leds
                .set_brightness(device, a.brightness)
                .map(|()| format!("LED {} brightness={}", a.device, a.brightness))
                .map_err(|e| (e, String::new())),
            LedControl::Effect => {
                if effect.is_empty() {
                    Err((LedError::Failed, "No effect specified".into()))
                } else {
                    self.leds
                        .start_effect(device, &effect, a.speed)
                        .map(|()| format!("LED {} effect={} started", a.device, effect))
                        .map_err(|e| match e {
                            LedError::UnknownEffect => (e, format!("Effect '{}' not found", effect)),
                            other => (other, String::new()),
                        })
                }
            }
            LedControl::Fill => {
                // A named effect on a fill action still wins when it exists.
                let by_effect = (!effect.is_empty())
                    .then(|| self.leds.start_effect(device, &effect, a.speed))
                    .and_then(|res| res.ok());
                match by_effect {
                    Some(()) => Ok(format!("LED {} effect={} started", a.device, effect)),
                    None => {
                        let res = if a.index == LED_INDEX_ALL {
                            self.leds.fill(device, a.color)
                        } else {
                            self.leds.set_pixel(device, u16::from(a.index), a.color)
                        };
                        res.map(|()| format!("LED {} filled with color", a.device))
                            .map_err(|e| (e, String::new()))
                    }
                }
            }
            _ if !on_matrix => Err((
                LedError::Unsupported,
                format!("{} only supported on matrix", matrix_feature(a.ctrl_type)),
            )),
            LedControl::Text => {
                if text.is_empty() {
                    Err((LedError::Failed, "No text specified".into()))
                } else {
                    self.console_led(&matrix_text_command(a, &text))
                        .map(|()| format!("LED text: {}", text))
                        .map_err(|e| (e, String::new()))
                }
            }
            LedControl::Image => {
                if image_path.is_empty() {
                    Err((LedError::Failed, "No image path specified".into()))
                } else {
                    let cmd = format!(
                        "led --image --device matrix --file {}{}",
                        image_path,
                        if a.center { " --center content" } else { "" }
                    );
                    self.console_led(&cmd)
                        .map(|()| format!("LED image: {}", image_path))
                        .map_err(|e| (e, String::new()))
                }
            }
            LedControl::QrCode => {
                if qr_text.is_empty() {
                    Err((LedError::Failed, "No QR text specified".into()))
                } else {
                    let mut cmd = format!("led --qrcode --device matrix --text \"{}\"", qr_text);
                    if let Some(ecc) = a.qr_ecc {
                        cmd.push_str(&format!(" --ecc {}", ecc));
                    }
                    if a.color != Rgb::BLACK {
                        cmd.push_str(&format!(" --color {}", format_color(a.color)));
                    }
                    self.console_led(&cmd)
                        .map(|()| format!("LED QR: {}", qr_text))
                        .map_err(|e| (e, String::new()))
                }
            }
            LedControl::Filter => {
                if filter.is_empty() {
                    Err((LedError::Failed, "No filter specified".into()))
                } else {
                    let cmd = if filter == "none" || filter == "stop" {
                        "led --stop-filter --device matrix".to_owned()
                    } else {
                        format!("led --filter --device matrix --filter-name {}", filter)
                    };
                    self.console_led(&cmd)
                        .map(|()| format!("LED filter: {}", filter))
                        .map_err(|e| (e, String::new()))
                }
            }
            LedControl::FilterStop => self
                .console_led("led --stop-filter --device matrix")
                .map(|()| "LED filter stopped".to_owned())
                .map_err(|e| (e, String::new())),
            LedControl::TextStop => self
                .console_led("led --stop-text --device matrix")
                .map(|()| "LED text stopped".to_owned())
                .map_err(|e| (e, String::new())),
        };

        match outcome {
            Ok(msg) => {
                r.status = ActionStatus::Success;
                r.set_output(&msg);
            }
            Err((e, msg)) => {
                r.status = ActionStatus::Failed;
                if msg.is_empty() {
                    r.set_output_fmt(format_args!("LED failed: {}", e));
                } else {
                    r.set_output(&msg);
                }
            }
        }
    }

    // ── GPIO ──────────────────────────────────────────────────────

    fn run_gpio(&self, a: &GpioAction, r: &mut ActionResult) {
        debug!("ActionExecutor: GPIO pin={} level={} pulse={}ms", a.pin, a.level, a.pulse_ms);
        let mut pin = match self.gpio.configure_output(a.pin) {
            Ok(p) => p,
            Err(e) => {
                r.status = ActionStatus::Failed;
                r.set_output_fmt(format_args!("GPIO config failed: {}", e));
                return;
            }
        };
        if let Err(e) = drive(&mut pin, a.level) {
            r.status = ActionStatus::Failed;
            r.set_output_fmt(format_args!("GPIO set failed: {}", e));
            return;
        }
        if a.pulse_ms > 0 {
            std::thread::sleep(Duration::from_millis(u64::from(a.pulse_ms)));
            if let Err(e) = drive(&mut pin, !a.level) {
                warn!("ActionExecutor: GPIO pulse restore failed: {}", e);
            }
            r.set_output_fmt(format_args!("GPIO {} pulse {} ms", a.pin, a.pulse_ms));
        } else {
            r.set_output_fmt(format_args!("GPIO {} set to {}", a.pin, u8::from(a.level)));
        }
        r.status = ActionStatus::Success;
    }

    // ── Log / SetVar ──────────────────────────────────────────────

    fn run_log(&self, a: &LogAction, r: &mut ActionResult) {
        let message = self.expand(&a.message, TEXT_MAX);
        log::log!(target: "AUTOMATION", a.level.as_log(), "{}", message);
        r.status = ActionStatus::Success;
        r.set_output(&message);
    }

    fn run_set_var(&self, a: &SetVarAction, r: &mut ActionResult) {
        let value = match &a.value {
            Value::Str(s) => Value::text(&self.expand(s, TEXT_MAX)),
            other => other.clone(),
        };
        match self.vars.set(&a.variable, value) {
            Ok(()) => {
                r.status = ActionStatus::Success;
                r.set_output_fmt(format_args!("Variable '{}' set", a.variable));
            }
            Err(e) => {
                r.status = ActionStatus::Failed;
                r.set_output_fmt(format_args!("Set variable failed: {}", e));
            }
        }
    }
}

fn drive(pin: &mut OutputHandle, high: bool) -> core::result::Result<(), GpioError> {
    if high { pin.set_high() } else { pin.set_low() }
}

/// Human name of a matrix-only control, for the rejection message.
fn matrix_feature(ctrl: LedControl) -> &'static str {
    match ctrl {
        LedControl::Text | LedControl::TextStop => "Text display",
        LedControl::Image => "Image display",
        LedControl::QrCode => "QR code",
        LedControl::Filter | LedControl::FilterStop => "Filter",
        _ => "This control",
    }
}

fn matrix_text_command(a: &LedAction, text: &str) -> String {
    let mut cmd = format!("led --draw-text --device matrix --text \"{}\"", text);
    let font = if a.font.is_empty() { "pixel9x9" } else { a.font.as_str() };
    cmd.push_str(&format!(" --font {}", font));
    if a.color != Rgb::BLACK {
        cmd.push_str(&format!(" --color {}", format_color(a.color)));
    }
    if !a.scroll.is_empty() && a.scroll != "none" {
        cmd.push_str(&format!(" --scroll {}", a.scroll));
        if a.looped {
            cmd.push_str(" --loop");
        }
    }
    if a.speed > 0 {
        cmd.push_str(&format!(" --speed {}", a.speed));
    }
    cmd
}

/// Fold a remote execution into the result: stdout preferred over stderr,
/// exit code 0 is success, a transport timeout is `Timeout`.
fn record_exec(out: &Result<ExecOutput>, r: &mut ActionResult) {
    match out {
        Ok(o) => {
            r.exit_code = o.exit_code;
            r.set_output(if o.stdout.is_empty() { &o.stderr } else { &o.stdout });
            r.status = if o.exit_code == 0 { ActionStatus::Success } else { ActionStatus::Failed };
        }
        Err(e) => {
            r.exit_code = -1;
            r.status = if *e == Error::Timeout { ActionStatus::Timeout } else { ActionStatus::Failed };
            r.set_output_fmt(format_args!("SSH exec failed: {}", e));
        }
    }
}

impl core::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("runtime_hosts", &self.host_count())
            .finish_non_exhaustive()
    }
}
