//! Mock adapters for integration tests.
//!
//! Every mock records what the core asked of it so tests can assert on the
//! full command history without a real SSH server, console or SD card.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tscore::adapters::nvs::NvsAdapter;
use tscore::app::events::AppEvent;
use tscore::app::ports::{
    ConsoleError, ConsoleOutput, ConsolePort, EventSink, ExecOutput, FileError, FileStore, LedError, LedPort, Rgb,
    SshAuth, SshConnectConfig, SshError, SshSession, SshTransport,
};
use tscore::automation::{ActionExecutor, ActionManager, ActionTemplateStore, ExecutorDeps, VariableStore};
use tscore::config::CoreConfig;
use tscore::drivers::gpio::GpioDriver;
use tscore::ssh::{CommandStore, HostRecord, HostStore, Keystore, LogWatchEngine, RemoteRunner};

// ── MemFiles ──────────────────────────────────────────────────

/// In-memory removable medium keyed by relative path.
pub struct MemFiles {
    files: Mutex<HashMap<String, Vec<u8>>>,
    mounted: AtomicBool,
}

#[allow(dead_code)]
impl MemFiles {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            mounted: AtomicBool::new(true),
        }
    }

    pub fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::SeqCst);
    }

    pub fn put(&self, path: &str, body: &str) {
        self.files.lock().unwrap().insert(path.into(), body.as_bytes().to_vec());
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn json(&self, path: &str) -> Option<serde_json::Value> {
        self.text(path).and_then(|t| serde_json::from_str(&t).ok())
    }

    pub fn paths(&self) -> Vec<String> {
        let mut p: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        p.sort();
        p
    }

    fn check(&self) -> Result<(), FileError> {
        if self.is_mounted() { Ok(()) } else { Err(FileError::NotMounted) }
    }
}

impl FileStore for MemFiles {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, FileError> {
        self.check()?;
        self.files.lock().unwrap().get(path).cloned().ok_or(FileError::NotFound)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), FileError> {
        self.check()?;
        self.files.lock().unwrap().insert(path.into(), data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), FileError> {
        self.check()?;
        self.files.lock().unwrap().remove(path).map(|_| ()).ok_or(FileError::NotFound)
    }

    fn exists(&self, path: &str) -> bool {
        self.is_mounted() && self.files.lock().unwrap().contains_key(path)
    }

    fn create_dir_all(&self, _path: &str) -> Result<(), FileError> {
        self.check()
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>, FileError> {
        self.check()?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_owned)
            .collect())
    }
}

// ── ScriptedSsh ───────────────────────────────────────────────

/// One opened session, as the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub key_auth: bool,
    pub timeout_ms: u32,
}

#[derive(Default)]
struct SshState {
    sessions: Vec<SessionRecord>,
    commands: Vec<String>,
    replies: VecDeque<Result<ExecOutput, SshError>>,
    /// Content of the simulated remote log; `None` means the file is absent.
    remote_log: Option<String>,
}

/// SSH transport that answers from a script.
///
/// Log-watch probes are evaluated against a simulated remote log file.
/// Other commands take the next queued reply, or succeed with empty output.
/// Clones share one script.
#[derive(Clone, Default)]
pub struct ScriptedSsh {
    state: Arc<Mutex<SshState>>,
    refuse_connect: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl ScriptedSsh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn reply(&self, reply: Result<ExecOutput, SshError>) {
        self.state.lock().unwrap().replies.push_back(reply);
    }

    pub fn reply_ok(&self, stdout: &str, exit_code: i32) {
        self.reply(Ok(ExecOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code,
        }));
    }

    pub fn set_remote_log(&self, content: Option<&str>) {
        self.state.lock().unwrap().remote_log = content.map(str::to_owned);
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Commands other than log-watch probes.
    pub fn user_commands(&self) -> Vec<String> {
        self.commands().into_iter().filter(|c| !is_probe(c)).collect()
    }

    pub fn probe_count(&self) -> usize {
        self.commands().iter().filter(|c| is_probe(c)).count()
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.state.lock().unwrap().sessions.clone()
    }

    fn run(&self, command: &str) -> Result<ExecOutput, SshError> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.into());
        if is_probe(command) {
            let answer = evaluate_probe(command, state.remote_log.as_deref());
            return Ok(ExecOutput {
                stdout: format!("{}\n", answer),
                stderr: String::new(),
                exit_code: 0,
            });
        }
        state.replies.pop_front().unwrap_or_else(|| Ok(ExecOutput::default()))
    }
}

fn is_probe(command: &str) -> bool {
    command.contains("echo NOTFOUND")
}

/// Quoted pattern after `grep -qF ` on one probe line.
fn grep_pattern(line: &str) -> Option<&str> {
    let rest = line.split("grep -qF '").nth(1)?;
    rest.split('\'').next()
}

/// Answer a probe the way the remote shell would.
fn evaluate_probe(script: &str, log: Option<&str>) -> &'static str {
    let Some(log) = log else {
        return "NOTFOUND";
    };
    for line in script.lines() {
        let Some(pattern) = grep_pattern(line) else {
            continue;
        };
        if log.contains(pattern) {
            if line.ends_with("echo FAIL") {
                return "FAIL";
            }
            if line.ends_with("echo READY") {
                return "READY";
            }
        }
    }
    "WAITING"
}

struct ScriptedSession {
    ssh: ScriptedSsh,
    connected: bool,
}

impl SshTransport for ScriptedSsh {
    fn create_session(&self, config: SshConnectConfig) -> Result<Box<dyn SshSession>, SshError> {
        self.state.lock().unwrap().sessions.push(SessionRecord {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            key_auth: matches!(config.auth, SshAuth::PrivateKey(_)),
            timeout_ms: config.timeout_ms,
        });
        Ok(Box::new(ScriptedSession {
            ssh: self.clone(),
            connected: false,
        }))
    }
}

impl SshSession for ScriptedSession {
    fn connect(&mut self) -> Result<(), SshError> {
        if self.ssh.refuse_connect.load(Ordering::SeqCst) {
            return Err(SshError::ConnectFailed);
        }
        self.connected = true;
        Ok(())
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput, SshError> {
        if !self.connected {
            return Err(SshError::ChannelFailed);
        }
        self.ssh.run(command)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

// ── GatedConsole ──────────────────────────────────────────────

/// Console whose `block` command parks until released, so tests can hold
/// the executor busy. Lines containing `fail` exit with 1.
#[derive(Default)]
pub struct GatedConsole {
    lines: Mutex<Vec<String>>,
    gate: Mutex<bool>,
    released: Condvar,
    entered: AtomicBool,
}

#[allow(dead_code)]
impl GatedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn release(&self) {
        *self.gate.lock().unwrap() = true;
        self.released.notify_all();
    }

    /// Wait until a `block` command is running.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.entered.load(Ordering::SeqCst) {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

impl ConsolePort for GatedConsole {
    fn exec(&self, line: &str) -> Result<ConsoleOutput, ConsoleError> {
        self.lines.lock().unwrap().push(line.into());
        let name = line.split_whitespace().next().unwrap_or_default();
        match name {
            "block" => {
                self.entered.store(true, Ordering::SeqCst);
                let mut open = self.gate.lock().unwrap();
                while !*open {
                    open = self.released.wait(open).unwrap();
                }
                Ok(ConsoleOutput {
                    code: 0,
                    output: "released".into(),
                })
            }
            "missing" => Err(ConsoleError::UnknownCommand),
            _ => Ok(ConsoleOutput {
                code: if line.contains("fail") { 1 } else { 0 },
                output: String::new(),
            }),
        }
    }
}

// ── RecordingLeds ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LedCall {
    Stop(String),
    Fill(String, Rgb),
    Pixel(String, u16, Rgb),
    Brightness(String, u8),
    Effect(String, String, u8),
}

/// LED port that records calls. Only `rainbow` and `breathing` exist.
#[derive(Default)]
pub struct RecordingLeds {
    pub calls: Mutex<Vec<LedCall>>,
}

#[allow(dead_code)]
impl RecordingLeds {
    pub fn calls(&self) -> Vec<LedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: LedCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl LedPort for RecordingLeds {
    fn stop_animation(&self, device: &str) -> Result<(), LedError> {
        self.push(LedCall::Stop(device.into()));
        Ok(())
    }

    fn fill(&self, device: &str, color: Rgb) -> Result<(), LedError> {
        self.push(LedCall::Fill(device.into(), color));
        Ok(())
    }

    fn set_pixel(&self, device: &str, index: u16, color: Rgb) -> Result<(), LedError> {
        self.push(LedCall::Pixel(device.into(), index, color));
        Ok(())
    }

    fn set_brightness(&self, device: &str, brightness: u8) -> Result<(), LedError> {
        self.push(LedCall::Brightness(device.into(), brightness));
        Ok(())
    }

    fn start_effect(&self, device: &str, effect: &str, speed: u8) -> Result<(), LedError> {
        if !matches!(effect, "rainbow" | "breathing") {
            return Err(LedError::UnknownEffect);
        }
        self.push(LedCall::Effect(device.into(), effect.into(), speed));
        Ok(())
    }
}

// ── EventLog ──────────────────────────────────────────────────

#[derive(Default)]
pub struct EventLog {
    pub events: Mutex<Vec<AppEvent>>,
}

#[allow(dead_code)]
impl EventLog {
    pub fn events(&self) -> Vec<AppEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn changed_names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AppEvent::VariableChanged { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: &AppEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Config for tests: no background tasks, short waits.
pub fn test_config() -> CoreConfig {
    CoreConfig {
        background_tasks: false,
        enqueue_wait_ms: 20,
        worker_idle_ms: 20,
        sync_deadline_ms: 2_000,
        ssh_sync_deadline_ms: 3_000,
        ..CoreConfig::default()
    }
}

/// The whole core wired against mocks.
#[allow(dead_code)]
pub struct Rig {
    pub config: CoreConfig,
    pub nvs: NvsAdapter,
    pub files: Arc<MemFiles>,
    pub ssh: ScriptedSsh,
    pub console: Arc<GatedConsole>,
    pub leds: Arc<RecordingLeds>,
    pub gpio: Arc<GpioDriver>,
    pub events: Arc<EventLog>,
    pub vars: Arc<VariableStore>,
    pub hosts: Arc<HostStore>,
    pub commands: Arc<CommandStore>,
    pub keystore: Arc<Keystore>,
    pub log_watch: Arc<LogWatchEngine>,
    pub manager: ActionManager,
    pub templates: Arc<ActionTemplateStore>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let nvs = NvsAdapter::new().unwrap();
        let files = Arc::new(MemFiles::new());
        let ssh = ScriptedSsh::new();
        let console = Arc::new(GatedConsole::new());
        let leds = Arc::new(RecordingLeds::default());
        let gpio = Arc::new(GpioDriver::new());
        let events = Arc::new(EventLog::default());

        let vars = Arc::new(VariableStore::new(
            usize::from(config.max_variables),
            Some(events.clone() as Arc<dyn EventSink>),
        ));
        vars.init();

        let keystore = Arc::new(Keystore::new(files.clone()));
        keystore.init(nvs.handle());
        let hosts = HostStore::new(files.clone(), &config);
        hosts.init(nvs.handle()).unwrap();
        let commands = CommandStore::new(files.clone(), &config);
        commands.init(nvs.handle()).unwrap();

        let runner = Arc::new(RemoteRunner::new(
            Arc::new(ssh.clone()),
            hosts.clone(),
            keystore.clone(),
            files.clone(),
            config.ssh_default_timeout_ms,
        ));
        let log_watch = Arc::new(LogWatchEngine::new(
            runner.clone(),
            vars.clone(),
            Some(events.clone() as Arc<dyn EventSink>),
            &config,
        ));

        let executor = ActionExecutor::new(ExecutorDeps {
            vars: vars.clone(),
            runner,
            commands: commands.clone(),
            log_watch: log_watch.clone(),
            console: console.clone(),
            gpio: gpio.clone(),
            leds: leds.clone(),
        });
        let manager: ActionManager = ActionManager::new(executor, Some(events.clone() as Arc<dyn EventSink>), &config);
        manager.init().unwrap();

        let templates = ActionTemplateStore::new(files.clone(), &config);
        templates.init(nvs.handle()).unwrap();

        Self {
            config,
            nvs,
            files,
            ssh,
            console,
            leds,
            gpio,
            events,
            vars,
            hosts,
            commands,
            keystore,
            log_watch,
            manager,
            templates,
        }
    }

    /// Store a password host `id` at `10.0.0.<n>`.
    pub fn add_host(&self, id: &str, n: u8) {
        self.hosts
            .add(&HostRecord::new(id, &format!("10.0.0.{}", n), "jetson"))
            .unwrap();
        self.hosts.set_password(id, "secret").unwrap();
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.console.release();
        self.log_watch.stop_all();
        self.manager.deinit();
    }
}
