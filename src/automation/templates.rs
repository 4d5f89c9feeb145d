//! Action templates: named, pre-configured actions.
//!
//! Held in memory and persisted to NVS namespace `action_tpl` as one JSON
//! document per template (`tpl_<n>`, with `count`). The removable medium
//! mirrors them as `config/actions/<id>.json`; a legacy single
//! `config/actions.json` (`{"templates": [...]}`) is imported once and
//! migrated to the per-file layout.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::action::{
    Action, ActionKind, ActionResult, ActionStatus, ActionType, CliAction, DeviceAction, GpioAction, LedAction,
    LedControl, LogAction, LogLevel, SetVarAction, SshAction, SshRefAction, WebhookAction, LED_INDEX_ALL,
};
use super::color::{format_color, parse_color};
use super::dispatcher::ActionManager;
use super::value::Value;
use crate::adapters::time::unix_secs;
use crate::app::ports::{FileError, FileStore, Rgb, StoragePort};
use crate::bounded::bounded;
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::storage::documents::{CatalogFiles, check_record_id, read_dir_documents};
use crate::storage::{ExportScheduler, MirroredCatalog, spawn_loader};

pub const NVS_NAMESPACE: &str = "action_tpl";
pub const MAX_TEMPLATES: usize = 64;
pub const ID_MAX: usize = 31;

const COUNT_KEY: &str = "count";
const KEY_PREFIX: &str = "tpl_";

const FILES: CatalogFiles = CatalogFiles {
    aggregate: "config/actions.json",
    dir: "config/actions",
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateDoc", into = "TemplateDoc")]
pub struct ActionTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    /// Queue instead of waiting for the result.
    pub run_async: bool,
    pub action: Action,
    /// Wall-clock seconds.
    pub created_at: u32,
    pub use_count: u32,
    pub last_used_at: u32,
}

impl ActionTemplate {
    pub fn new(id: &str, name: &str, action: Action) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            run_async: false,
            action,
            created_at: 0,
            use_count: 0,
            last_used_at: 0,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// JSON document shape
// ───────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_index() -> u8 {
    LED_INDEX_ALL
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CliDoc {
    #[serde(default)]
    command: String,
    #[serde(default)]
    var_name: String,
    #[serde(default)]
    timeout_ms: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SshDoc {
    #[serde(default)]
    host_ref: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    timeout_ms: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SshRefDoc {
    #[serde(default)]
    cmd_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedDoc {
    #[serde(default)]
    device: String,
    #[serde(default)]
    ctrl_type: String,
    #[serde(default = "default_index")]
    index: u8,
    #[serde(default, skip_serializing_if = "is_empty")]
    color: String,
    // Older documents carry the channels separately.
    #[serde(default, skip_serializing)]
    r: Option<u8>,
    #[serde(default, skip_serializing)]
    g: Option<u8>,
    #[serde(default, skip_serializing)]
    b: Option<u8>,
    #[serde(default)]
    brightness: u8,
    #[serde(default, skip_serializing_if = "is_empty")]
    effect: String,
    #[serde(default)]
    speed: u8,
    #[serde(default)]
    duration_ms: u16,
    #[serde(default, skip_serializing_if = "is_empty")]
    text: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    font: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    image_path: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    qr_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qr_ecc: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty")]
    filter: String,
    #[serde(default)]
    center: bool,
    #[serde(default, rename = "loop")]
    looped: bool,
    #[serde(default, skip_serializing_if = "is_empty")]
    scroll: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    align: String,
    #[serde(default)]
    x: i16,
    #[serde(default)]
    y: i16,
}

impl Default for LedDoc {
    fn default() -> Self {
        Self {
            device: String::new(),
            ctrl_type: String::new(),
            index: LED_INDEX_ALL,
            color: String::new(),
            r: None,
            g: None,
            b: None,
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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GpioDoc {
    #[serde(default)]
    pin: u8,
    #[serde(default)]
    level: bool,
    #[serde(default)]
    pulse_ms: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LogDoc {
    /// ESP log level numbering.
    #[serde(default)]
    level: u8,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SetVarDoc {
    #[serde(default)]
    variable: String,
    #[serde(default)]
    value: Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WebhookDoc {
    #[serde(default)]
    url: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    body_template: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DeviceDoc {
    #[serde(default)]
    device: String,
    #[serde(default)]
    action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TemplateDoc {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default, rename = "async")]
    run_async: bool,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delay_ms: u32,
    #[serde(default)]
    created_at: u32,
    #[serde(default)]
    use_count: u32,
    #[serde(default)]
    last_used_at: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cli: Option<CliDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ssh: Option<SshDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ssh_ref: Option<SshRefDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    led: Option<LedDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gpio: Option<GpioDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log: Option<LogDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    set_var: Option<SetVarDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    webhook: Option<WebhookDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_ctrl: Option<DeviceDoc>,
}

fn value_to_json(v: &Value) -> Json {
    match v {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => Json::from(*f),
        Value::Str(s) => Json::String(s.as_str().into()),
    }
}

fn json_to_value(j: &Json) -> Value {
    match j {
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        Json::String(s) => Value::text(s),
        _ => Value::Null,
    }
}

impl LedDoc {
    fn color(&self) -> Rgb {
        if !self.color.is_empty() {
            return parse_color(&self.color).unwrap_or_else(|_| {
                debug!("ActionTemplates: bad color '{}', using black", self.color);
                Rgb::BLACK
            });
        }
        Rgb::new(self.r.unwrap_or(0), self.g.unwrap_or(0), self.b.unwrap_or(0))
    }
}

impl From<&LedDoc> for LedAction {
    fn from(d: &LedDoc) -> Self {
        Self {
            device: bounded(&d.device),
            ctrl_type: LedControl::from_key(&d.ctrl_type).unwrap_or_default(),
            index: d.index,
            color: d.color(),
            brightness: d.brightness,
            effect: bounded(&d.effect),
            speed: d.speed,
            duration_ms: d.duration_ms,
            text: bounded(&d.text),
            font: bounded(&d.font),
            image_path: bounded(&d.image_path),
            qr_text: bounded(&d.qr_text),
            qr_ecc: d.qr_ecc.as_deref().and_then(|s| s.chars().next()),
            filter: bounded(&d.filter),
            center: d.center,
            looped: d.looped,
            scroll: bounded(&d.scroll),
            align: bounded(&d.align),
            x: d.x,
            y: d.y,
        }
    }
}

impl From<&LedAction> for LedDoc {
    fn from(a: &LedAction) -> Self {
        Self {
            device: a.device.as_str().into(),
            ctrl_type: a.ctrl_type.key().into(),
            index: a.index,
            color: format_color(a.color),
            r: None,
            g: None,
            b: None,
            brightness: a.brightness,
            effect: a.effect.as_str().into(),
            speed: a.speed,
            duration_ms: a.duration_ms,
            text: a.text.as_str().into(),
            font: a.font.as_str().into(),
            image_path: a.image_path.as_str().into(),
            qr_text: a.qr_text.as_str().into(),
            qr_ecc: a.qr_ecc.map(String::from),
            filter: a.filter.as_str().into(),
            center: a.center,
            looped: a.looped,
            scroll: a.scroll.as_str().into(),
            align: a.align.as_str().into(),
            x: a.x,
            y: a.y,
        }
    }
}

impl TryFrom<TemplateDoc> for ActionTemplate {
    type Error = Error;

    fn try_from(d: TemplateDoc) -> Result<Self> {
        let ty = ActionType::from_key(&d.kind).ok_or(Error::InvalidArgument("unknown action type"))?;
        // A missing payload object leaves the payload empty.
        let kind = match ty {
            ActionType::Cli => {
                let c = d.cli.unwrap_or_default();
                ActionKind::Cli(CliAction {
                    command: bounded(&c.command),
                    var_name: bounded(&c.var_name),
                    timeout_ms: c.timeout_ms,
                })
            }
            ActionType::Ssh => {
                let s = d.ssh.unwrap_or_default();
                ActionKind::Ssh(SshAction {
                    host_ref: bounded(&s.host_ref),
                    command: bounded(&s.command),
                    timeout_ms: s.timeout_ms,
                })
            }
            ActionType::SshRef => ActionKind::SshRef(SshRefAction {
                cmd_id: bounded(&d.ssh_ref.unwrap_or_default().cmd_id),
            }),
            ActionType::Led => ActionKind::Led(LedAction::from(&d.led.unwrap_or_default())),
            ActionType::Gpio => {
                let g = d.gpio.unwrap_or_default();
                ActionKind::Gpio(GpioAction {
                    pin: g.pin,
                    level: g.level,
                    pulse_ms: g.pulse_ms,
                })
            }
            ActionType::Log => {
                let l = d.log.unwrap_or_default();
                ActionKind::Log(LogAction {
                    level: LogLevel::from_esp(l.level),
                    message: bounded(&l.message),
                })
            }
            ActionType::SetVar => {
                let s = d.set_var.unwrap_or_default();
                ActionKind::SetVar(SetVarAction {
                    variable: bounded(&s.variable),
                    value: json_to_value(&s.value),
                })
            }
            ActionType::Webhook => {
                let w = d.webhook.unwrap_or_default();
                ActionKind::Webhook(WebhookAction {
                    url: bounded(&w.url),
                    method: bounded(&w.method),
                    body_template: bounded(&w.body_template),
                })
            }
            ActionType::Device => {
                let v = d.device_ctrl.unwrap_or_default();
                ActionKind::Device(DeviceAction {
                    device: bounded(&v.device),
                    action: bounded(&v.action),
                })
            }
        };
        Ok(Self {
            id: d.id,
            name: d.name,
            description: d.description,
            enabled: d.enabled,
            run_async: d.run_async,
            action: Action::new(kind).with_delay(d.delay_ms),
            created_at: d.created_at,
            use_count: d.use_count,
            last_used_at: d.last_used_at,
        })
    }
}

impl From<ActionTemplate> for TemplateDoc {
    fn from(t: ActionTemplate) -> Self {
        let mut d = TemplateDoc {
            kind: t.action.action_type().key().into(),
            delay_ms: t.action.delay_ms,
            id: t.id,
            name: t.name,
            description: t.description,
            enabled: t.enabled,
            run_async: t.run_async,
            created_at: t.created_at,
            use_count: t.use_count,
            last_used_at: t.last_used_at,
            ..TemplateDoc::default()
        };
        match &t.action.kind {
            ActionKind::Cli(c) => {
                d.cli = Some(CliDoc {
                    command: c.command.as_str().into(),
                    var_name: c.var_name.as_str().into(),
                    timeout_ms: c.timeout_ms,
                })
            }
            ActionKind::Ssh(s) => {
                d.ssh = Some(SshDoc {
                    host_ref: s.host_ref.as_str().into(),
                    command: s.command.as_str().into(),
                    timeout_ms: s.timeout_ms,
                })
            }
            ActionKind::SshRef(s) => {
                d.ssh_ref = Some(SshRefDoc {
                    cmd_id: s.cmd_id.as_str().into(),
                })
            }
            ActionKind::Led(l) => d.led = Some(LedDoc::from(l)),
            ActionKind::Gpio(g) => {
                d.gpio = Some(GpioDoc {
                    pin: g.pin,
                    level: g.level,
                    pulse_ms: g.pulse_ms,
                })
            }
            ActionKind::Log(l) => {
                d.log = Some(LogDoc {
                    level: l.level.to_esp(),
                    message: l.message.as_str().into(),
                })
            }
            ActionKind::SetVar(s) => {
                d.set_var = Some(SetVarDoc {
                    variable: s.variable.as_str().into(),
                    value: value_to_json(&s.value),
                })
            }
            ActionKind::Webhook(w) => {
                d.webhook = Some(WebhookDoc {
                    url: w.url.as_str().into(),
                    method: w.method.as_str().into(),
                    body_template: w.body_template.as_str().into(),
                })
            }
            ActionKind::Device(v) => {
                d.device_ctrl = Some(DeviceDoc {
                    device: v.device.as_str().into(),
                    action: v.action.as_str().into(),
                })
            }
        }
        d
    }
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    nvs: Option<Box<dyn StoragePort>>,
    templates: Vec<ActionTemplate>,
}

impl Inner {
    fn nvs(&mut self) -> Result<&mut dyn StoragePort> {
        match self.nvs.as_mut() {
            Some(nvs) => Ok(nvs.as_mut()),
            None => Err(Error::Uninitialized),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.id == id)
    }

    /// Rewrite the NVS image from `next`, then adopt it. On a failed write
    /// the in-memory table keeps its previous contents.
    fn commit(&mut self, next: Vec<ActionTemplate>) -> Result<()> {
        write_image(self.nvs()?, &next)?;
        self.templates = next;
        Ok(())
    }
}

/// `count`, then `tpl_0..count`, then drop any slots left over from a
/// longer list.
fn write_image(nvs: &mut dyn StoragePort, templates: &[ActionTemplate]) -> Result<()> {
    let docs = templates
        .iter()
        .map(|t| serde_json::to_vec(t).map_err(|_| Error::InvalidArgument("template encode")))
        .collect::<Result<Vec<_>>>()?;
    let previous = read_count(nvs);
    nvs.write(NVS_NAMESPACE, COUNT_KEY, &[docs.len() as u8])?;
    for (i, doc) in docs.iter().enumerate() {
        nvs.write(NVS_NAMESPACE, &slot_key(i), doc)?;
    }
    for i in docs.len()..previous {
        nvs.delete(NVS_NAMESPACE, &slot_key(i))?;
    }
    Ok(())
}

fn slot_key(i: usize) -> String {
    format!("{}{}", KEY_PREFIX, i)
}

fn read_count(nvs: &dyn StoragePort) -> usize {
    let mut buf = [0u8; 1];
    match nvs.read(NVS_NAMESPACE, COUNT_KEY, &mut buf) {
        Ok(1) => usize::from(buf[0]),
        _ => 0,
    }
}

fn load_nvs(nvs: &dyn StoragePort) -> Vec<ActionTemplate> {
    let count = read_count(nvs).min(MAX_TEMPLATES);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let key = slot_key(i);
        let Ok(blob) = nvs.read_blob(NVS_NAMESPACE, &key) else {
            continue;
        };
        match serde_json::from_slice::<ActionTemplate>(&blob) {
            Ok(t) => out.push(t),
            Err(e) => warn!("ActionTemplates: {} unparsable: {}", key, e),
        }
    }
    out
}

fn validate(tpl: &ActionTemplate) -> Result<()> {
    if tpl.id.is_empty() {
        return Err(Error::InvalidArgument("template id is empty"));
    }
    if tpl.id.len() > ID_MAX {
        return Err(Error::InvalidArgument("template id too long"));
    }
    check_record_id(&tpl.id)?;
    Ok(())
}

pub struct ActionTemplateStore {
    inner: Mutex<Inner>,
    files: Arc<dyn FileStore>,
    exporter: ExportScheduler,
    load_delay_ms: u32,
    background: bool,
    me: Weak<ActionTemplateStore>,
}

impl ActionTemplateStore {
    pub fn new(files: Arc<dyn FileStore>, config: &CoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            inner: Mutex::new(Inner::default()),
            files,
            exporter: ExportScheduler::new("action_tpl_sync\0", config.file_sync_delay_ms, config.background_tasks),
            load_delay_ms: config.templates_load_delay_ms,
            background: config.background_tasks,
            me: me.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the NVS handle, load stored templates and start the deferred
    /// file loader. A second call is a no-op.
    pub fn init(&self, nvs: Box<dyn StoragePort>) -> Result<()> {
        let count = {
            let mut inner = self.lock();
            if inner.nvs.is_some() {
                return Ok(());
            }
            inner.templates = load_nvs(nvs.as_ref());
            inner.nvs = Some(nvs);
            inner.templates.len()
        };
        info!("ActionTemplates: initialized, {} templates in NVS", count);

        if self.background {
            if let Some(me) = self.me.upgrade() {
                spawn_loader(&me, self.load_delay_ms, "action_tpl_load\0")?;
            }
        }
        Ok(())
    }

    pub fn deinit(&self) {
        let mut inner = self.lock();
        if inner.nvs.take().is_some() {
            inner.templates.clear();
            info!("ActionTemplates: deinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().nvs.is_some()
    }

    fn schedule_export(&self) {
        self.exporter.schedule(self.me.clone());
    }

    /// Insert a new template. Stamps `created_at` and zeroes `use_count`.
    pub fn add(&self, tpl: &ActionTemplate) -> Result<()> {
        validate(tpl)?;
        {
            let mut inner = self.lock();
            inner.nvs()?;
            if inner.position(&tpl.id).is_some() {
                return Err(Error::AlreadyExists);
            }
            if inner.templates.len() >= MAX_TEMPLATES {
                return Err(Error::NoSpace);
            }
            let mut tpl = tpl.clone();
            tpl.created_at = unix_secs();
            tpl.use_count = 0;
            tpl.last_used_at = 0;
            let mut next = inner.templates.clone();
            next.push(tpl);
            inner.commit(next)?;
        }
        info!("ActionTemplates: added '{}' ({})", tpl.id, tpl.name);
        self.schedule_export();
        Ok(())
    }

    /// Replace the template `id`, keeping its creation time and usage.
    pub fn update(&self, id: &str, tpl: &ActionTemplate) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.nvs()?;
            let i = inner.position(id).ok_or(Error::NotFound)?;
            let old = &inner.templates[i];
            let mut tpl = tpl.clone();
            tpl.id = id.into();
            tpl.created_at = old.created_at;
            tpl.use_count = old.use_count;
            tpl.last_used_at = old.last_used_at;
            let mut next = inner.templates.clone();
            next[i] = tpl;
            inner.commit(next)?;
        }
        info!("ActionTemplates: updated '{}'", id);
        self.schedule_export();
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.nvs()?;
            let i = inner.position(id).ok_or(Error::NotFound)?;
            let mut next = inner.templates.clone();
            next.remove(i);
            inner.commit(next)?;
        }
        info!("ActionTemplates: removed '{}'", id);
        self.schedule_export();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<ActionTemplate> {
        let mut inner = self.lock();
        inner.nvs()?;
        let i = inner.position(id).ok_or(Error::NotFound)?;
        Ok(inner.templates[i].clone())
    }

    pub fn list(&self) -> Result<Vec<ActionTemplate>> {
        let mut inner = self.lock();
        inner.nvs()?;
        Ok(inner.templates.clone())
    }

    pub fn count(&self) -> usize {
        self.lock().templates.len()
    }

    pub fn clear(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.nvs()?;
            inner.commit(Vec::new())?;
        }
        info!("ActionTemplates: cleared");
        self.schedule_export();
        Ok(())
    }

    /// Run the template's action through `manager`.
    ///
    /// Async templates (or actions) are queued and report `Queued`; others
    /// wait for the result. Usage counters are bumped either way.
    pub fn execute<const N: usize>(&self, id: &str, manager: &ActionManager<N>, result: &mut ActionResult) -> Result<()> {
        let tpl = match self.get(id) {
            Ok(t) => t,
            Err(e) => {
                *result = ActionResult::failed(&format!("Template not found: {}", id));
                return Err(e);
            }
        };
        if !tpl.enabled {
            *result = ActionResult::failed(&format!("Template disabled: {}", id));
            return Err(Error::InvalidArgument("template is disabled"));
        }

        let outcome = if tpl.run_async || tpl.action.run_async {
            match manager.queue(tpl.action.clone(), None, 0) {
                Ok(()) => {
                    *result = ActionResult {
                        status: ActionStatus::Queued,
                        ..ActionResult::default()
                    };
                    result.set_output("Action queued for async execution");
                    Ok(())
                }
                Err(e) => {
                    *result = ActionResult::failed(&format!("Failed to queue action: {}", e));
                    Err(e)
                }
            }
        } else {
            manager.execute(&tpl.action, result)
        };

        let mut inner = self.lock();
        if let Some(i) = inner.position(id) {
            let t = &mut inner.templates[i];
            t.use_count += 1;
            t.last_used_at = unix_secs();
        }
        outcome
    }

    /// Write the per-template files now.
    pub fn sync_now(&self) -> Result<usize> {
        self.export_files()
    }

    /// Parse the legacy aggregate: `{"templates": [...]}` or a bare array.
    fn read_legacy(&self) -> Result<Vec<Json>> {
        let data = match self.files.read(FILES.aggregate) {
            Ok(d) => d,
            Err(FileError::NotFound) => return Err(Error::NotFound),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<Json>(&data) {
            Ok(Json::Object(mut root)) => match root.remove("templates") {
                Some(Json::Array(items)) => Ok(items),
                _ => Err(Error::NotFound),
            },
            Ok(Json::Array(items)) => Ok(items),
            _ => {
                warn!("ActionTemplates: {} unparsable", FILES.aggregate);
                Err(Error::NotFound)
            }
        }
    }
}

impl MirroredCatalog for ActionTemplateStore {
    fn label(&self) -> &'static str {
        "ActionTemplates"
    }

    fn count(&self) -> usize {
        ActionTemplateStore::count(self)
    }

    fn import_files(&self, merge: bool) -> Result<usize> {
        if !self.is_initialized() {
            return Err(Error::Uninitialized);
        }
        if !self.files.is_mounted() {
            return Err(FileError::NotMounted.into());
        }
        let (docs, legacy) = match read_dir_documents(self.files.as_ref(), FILES.dir) {
            Ok(docs) if !docs.is_empty() => (docs, false),
            _ => (self.read_legacy()?, true),
        };
        if docs.is_empty() {
            return Err(Error::NotFound);
        }

        let imported = {
            let mut inner = self.lock();
            let mut next = if merge { inner.templates.clone() } else { Vec::new() };
            let mut imported = 0usize;
            for doc in docs {
                let tpl = match serde_json::from_value::<ActionTemplate>(doc) {
                    Ok(t) if validate(&t).is_ok() => t,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("ActionTemplates: skipping document: {}", e);
                        continue;
                    }
                };
                if next.iter().any(|t| t.id == tpl.id) {
                    continue;
                }
                if next.len() >= MAX_TEMPLATES {
                    warn!("ActionTemplates: capacity reached, rest skipped");
                    break;
                }
                next.push(tpl);
                imported += 1;
            }
            inner.commit(next)?;
            imported
        };
        info!(
            "ActionTemplates: imported {} templates from {}",
            imported,
            if legacy { FILES.aggregate } else { FILES.dir }
        );

        if legacy {
            if let Err(e) = self.export_files() {
                warn!("ActionTemplates: migration to {} failed: {}", FILES.dir, e);
            }
        }
        Ok(imported)
    }

    fn export_files(&self) -> Result<usize> {
        let records: Vec<(String, ActionTemplate)> =
            self.lock().templates.iter().map(|t| (t.id.clone(), t.clone())).collect();
        let n = FILES.write_dir(self.files.as_ref(), &records)?;
        debug!("ActionTemplates: exported {} templates", n);
        Ok(n)
    }
}

impl core::fmt::Debug for ActionTemplateStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActionTemplateStore")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}
