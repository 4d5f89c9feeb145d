//! Dispatcher pipeline: queue bounds, FIFO order, delays, deadlines,
//! cancellation and the per-kind executors behind the worker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tscore::Error;
use tscore::app::events::AppEvent;
use tscore::app::ports::Rgb;
use tscore::automation::action::{DeviceAction, LedAction, LedControl, LogLevel, WebhookAction};
use tscore::automation::variables::Variable;
use tscore::automation::{Action, ActionKind, ActionResult, ActionStatus, ActionType, RuntimeHost, Value};
use tscore::bounded::bounded;
use zeroize::Zeroizing;

use crate::eventually;
use crate::mocks::{LedCall, Rig, test_config};

fn block_worker(rig: &Rig) {
    rig.manager.queue(Action::cli("block", ""), None, 0).unwrap();
    assert!(rig.console.wait_entered(Duration::from_secs(2)), "worker never picked up the blocker");
}

fn led(device: &str, ctrl_type: LedControl) -> LedAction {
    LedAction {
        device: bounded(device),
        ctrl_type,
        ..LedAction::default()
    }
}

// ── Queue bounds ──────────────────────────────────────────────

#[test]
fn burst_beyond_capacity_reports_queue_full() {
    let rig = Rig::new();
    block_worker(&rig);

    let mut accepted = 0;
    let mut full = 0;
    for i in 0..100 {
        match rig.manager.queue(Action::log(LogLevel::Debug, &format!("burst {}", i)), None, 0) {
            Ok(()) => accepted += 1,
            Err(Error::QueueFull) => full += 1,
            Err(e) => panic!("unexpected error {:?}", e),
        }
    }

    assert_eq!(accepted, 32);
    assert_eq!(full, 68);
    assert_eq!(rig.manager.pending_count(), 32);
    assert_eq!(rig.manager.stats().queue_high_water, 32);

    rig.console.release();
    assert!(eventually(3_000, || rig.manager.pending_count() == 0));
}

#[test]
fn cancel_all_drops_pending_but_not_running() {
    let rig = Rig::new();
    block_worker(&rig);
    for _ in 0..5 {
        rig.manager.queue(Action::set_var("x", Value::Int(1)), None, 0).unwrap();
    }

    assert_eq!(rig.manager.cancel_all(), 5);
    assert_eq!(rig.manager.pending_count(), 0);

    rig.console.release();
    assert!(eventually(2_000, || rig.manager.stats().total_executed == 1));
    assert_eq!(rig.manager.stats().total_success, 1);
}

#[test]
fn queue_after_deinit_is_uninitialized() {
    let rig = Rig::new();
    rig.manager.deinit();
    assert!(!rig.manager.is_initialized());
    assert_eq!(
        rig.manager.queue(Action::log(LogLevel::Info, "late"), None, 0),
        Err(Error::Uninitialized)
    );
}

// ── Ordering and timing ───────────────────────────────────────

#[test]
fn actions_run_in_fifo_order() {
    let rig = Rig::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..10 {
        let order = order.clone();
        rig.manager
            .queue(
                Action::log(LogLevel::Info, &format!("step {}", i)),
                Some(Box::new(move |_: &Action, r: &ActionResult| {
                    order.lock().unwrap().push(r.output.to_string())
                })),
                0,
            )
            .unwrap();
    }
    assert!(eventually(2_000, || order.lock().unwrap().len() == 10));
    let expected: Vec<String> = (0..10).map(|i| format!("step {}", i)).collect();
    assert_eq!(*order.lock().unwrap(), expected);
}

#[test]
fn delay_counts_toward_duration() {
    let rig = Rig::new();
    let mut result = ActionResult::default();
    rig.manager
        .execute(&Action::log(LogLevel::Info, "later").with_delay(120), &mut result)
        .unwrap();
    assert_eq!(result.status, ActionStatus::Success);
    assert!(result.duration_ms >= 120, "duration {} ms", result.duration_ms);
    assert!(result.timestamp_ms > 0);
}

#[test]
fn sync_execute_times_out_with_timeout_status() {
    let rig = Rig::with_config(tscore::config::CoreConfig {
        sync_deadline_ms: 100,
        ..test_config()
    });
    let mut result = ActionResult::default();
    let err = rig.manager.execute(&Action::cli("block", ""), &mut result);

    assert_eq!(err, Err(Error::Timeout));
    assert_eq!(result.status, ActionStatus::Timeout);
    assert_eq!(result.output.as_str(), "Execution timeout");
    rig.console.release();
}

#[test]
fn sequence_rules() {
    let rig = Rig::new();
    assert_eq!(
        rig.manager.execute_sequence(&[], false),
        Err(Error::InvalidArgument("empty action sequence"))
    );

    let actions = [
        Action::cli("fail now", ""),
        Action::log(LogLevel::Info, "after"),
    ];
    assert_eq!(rig.manager.execute_sequence(&actions, false), Ok(()));
    assert_eq!(rig.manager.execute_sequence(&actions, true), Err(Error::ActionFailed));
    // First run executed both, second stopped after the failure.
    assert_eq!(rig.manager.stats().total_executed, 3);
}

// ── Statistics and events ─────────────────────────────────────

#[test]
fn stats_and_completion_events() {
    let rig = Rig::new();
    let mut r = ActionResult::default();
    rig.manager.execute(&Action::gpio(4, true, 0), &mut r).unwrap();
    let _ = rig.manager.execute(&Action::cli("fail", ""), &mut r);

    let stats = rig.manager.stats();
    assert_eq!(stats.total_executed, 2);
    assert_eq!(stats.total_success, 1);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.gpio_actions, 1);

    let completed: Vec<(ActionType, ActionStatus)> = rig
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            AppEvent::ActionCompleted { kind, status, .. } => Some((kind, status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        completed,
        vec![(ActionType::Gpio, ActionStatus::Success), (ActionType::Cli, ActionStatus::Failed)]
    );

    rig.manager.reset_stats();
    assert_eq!(rig.manager.stats().total_executed, 0);
}

// ── Executors ─────────────────────────────────────────────────

#[test]
fn cli_action_publishes_result_variables() {
    let rig = Rig::new();
    let mut r = ActionResult::default();
    rig.manager.execute(&Action::cli("wifi status", "net"), &mut r).unwrap();

    assert_eq!(r.output.as_str(), "CLI command completed (code=0)");
    assert_eq!(rig.vars.get_int("net.exit_code"), Ok(0));
    assert_eq!(rig.vars.get_string("net.status").unwrap().as_str(), "success");
    assert_eq!(rig.console.lines(), vec!["wifi status".to_string()]);
}

#[test]
fn unknown_console_command_fails() {
    let rig = Rig::new();
    let mut r = ActionResult::default();
    assert_eq!(rig.manager.execute(&Action::cli("missing", ""), &mut r), Err(Error::ActionFailed));
    assert!(r.output.starts_with("CLI exec failed"));
}

#[test]
fn set_var_expands_templates() {
    let rig = Rig::new();
    rig.vars.register(Variable::new("host", "t", Value::text("agx"))).unwrap();
    rig.vars.register(Variable::new("greeting", "t", Value::text(""))).unwrap();

    let mut r = ActionResult::default();
    rig.manager
        .execute(&Action::set_var("greeting", Value::text("hello ${host}")), &mut r)
        .unwrap();
    assert_eq!(rig.vars.get_string("greeting").unwrap().as_str(), "hello agx");

    let missing = rig.manager.execute(&Action::set_var("nope", Value::Int(1)), &mut r);
    assert_eq!(missing, Err(Error::ActionFailed));
}

#[test]
fn gpio_pulse_restores_level() {
    let rig = Rig::new();
    let mut r = ActionResult::default();
    rig.manager.execute(&Action::gpio(12, true, 30), &mut r).unwrap();
    assert_eq!(r.output.as_str(), "GPIO 12 pulse 30 ms");
    assert_eq!(rig.gpio.level(12), Some(false));

    rig.manager.execute(&Action::gpio(13, true, 0), &mut r).unwrap();
    assert_eq!(rig.gpio.level(13), Some(true));

    assert_eq!(rig.manager.execute(&Action::gpio(200, true, 0), &mut r), Err(Error::ActionFailed));
}

#[test]
fn led_fill_effect_and_matrix_rules() {
    let rig = Rig::new();
    let mut r = ActionResult::default();

    let mut fill = led("board", LedControl::Fill);
    fill.color = Rgb::new(0, 255, 0);
    fill.effect = bounded("sparkle");
    rig.manager.execute(&Action::new(ActionKind::Led(fill)), &mut r).unwrap();

    let mut effect = led("touch", LedControl::Effect);
    effect.effect = bounded("rainbow");
    effect.speed = 3;
    rig.manager.execute(&Action::new(ActionKind::Led(effect)), &mut r).unwrap();

    assert_eq!(
        rig.leds.calls(),
        vec![
            LedCall::Fill("led_board".into(), Rgb::new(0, 255, 0)),
            LedCall::Effect("led_touch".into(), "rainbow".into(), 3),
        ]
    );

    let mut bogus = led("touch", LedControl::Effect);
    bogus.effect = bounded("sparkle");
    let _ = rig.manager.execute(&Action::new(ActionKind::Led(bogus)), &mut r);
    assert_eq!(r.output.as_str(), "Effect 'sparkle' not found");

    let mut text = led("board", LedControl::Text);
    text.text = bounded("hi");
    let _ = rig.manager.execute(&Action::new(ActionKind::Led(text.clone())), &mut r);
    assert_eq!(r.status, ActionStatus::Failed);
    assert_eq!(r.output.as_str(), "Text display only supported on matrix");

    text.device = bounded("matrix");
    rig.manager.execute(&Action::new(ActionKind::Led(text)), &mut r).unwrap();
    assert_eq!(
        rig.console.lines().last().map(String::as_str),
        Some("led --draw-text --device matrix --text \"hi\" --font pixel9x9")
    );
}

#[test]
fn runtime_hosts_shadow_stored_hosts() {
    let rig = Rig::new();
    rig.add_host("agx", 5);
    let runtime = RuntimeHost {
        id: "agx".into(),
        host: "192.168.55.1".into(),
        port: 2222,
        username: "nvidia".into(),
        password: Zeroizing::new("pw".into()),
        use_key_auth: false,
        key_id: String::new(),
    };
    rig.manager.register_host(runtime).unwrap();

    let mut r = ActionResult::default();
    rig.ssh.reply_ok("up 3 days\n", 0);
    rig.manager.execute(&Action::ssh("agx", "uptime"), &mut r).unwrap();
    let session = rig.ssh.sessions().pop().unwrap();
    assert_eq!((session.host.as_str(), session.port), ("192.168.55.1", 2222));
    assert_eq!(r.output.as_str(), "up 3 days\n");

    rig.manager.unregister_host("agx").unwrap();
    assert_eq!(rig.manager.unregister_host("agx"), Err(Error::NotFound));
    rig.manager.execute(&Action::ssh("agx", "uptime"), &mut r).unwrap();
    assert_eq!(rig.ssh.sessions().pop().unwrap().host, "10.0.0.5");
}

#[test]
fn runtime_host_registry_is_bounded() {
    let rig = Rig::new();
    for i in 0..8 {
        rig.manager
            .register_host(RuntimeHost {
                id: format!("h{}", i),
                host: format!("10.1.0.{}", i),
                port: 22,
                username: "root".into(),
                password: Zeroizing::new(String::new()),
                use_key_auth: false,
                key_id: String::new(),
            })
            .unwrap();
    }
    let extra = RuntimeHost {
        id: "h8".into(),
        host: "10.1.0.8".into(),
        port: 22,
        username: "root".into(),
        password: Zeroizing::new(String::new()),
        use_key_auth: false,
        key_id: String::new(),
    };
    assert_eq!(rig.manager.register_host(extra), Err(Error::NoSpace));
    assert_eq!(rig.manager.executor().host_count(), 8);
    assert_eq!(rig.manager.get_host("h3").map(|h| h.host), Some("10.1.0.3".to_string()));
}

#[test]
fn unknown_ssh_host_fails_fast() {
    let rig = Rig::new();
    let mut r = ActionResult::default();
    assert_eq!(rig.manager.execute(&Action::ssh("ghost", "ls"), &mut r), Err(Error::ActionFailed));
    assert_eq!(r.output.as_str(), "SSH host 'ghost' not found");
    assert!(rig.ssh.sessions().is_empty());
}

#[test]
fn webhook_and_device_are_not_implemented() {
    let rig = Rig::new();
    let mut r = ActionResult::default();
    let device = Action::new(ActionKind::Device(DeviceAction {
        device: bounded("agx"),
        action: bounded("reboot"),
    }));
    assert_eq!(rig.manager.execute(&device, &mut r), Err(Error::NotImplemented));
    assert_eq!(r.status, ActionStatus::Failed);
    assert_eq!(r.error, Some(Error::NotImplemented));
    assert_eq!(r.output.as_str(), "Device control: agx.reboot (not implemented)");

    let webhook = Action::new(ActionKind::Webhook(WebhookAction::default()));
    assert_eq!(rig.manager.execute(&webhook, &mut r), Err(Error::NotImplemented));
    assert_eq!(r.error, Some(Error::NotImplemented));
    assert_eq!(r.output.as_str(), "Webhook not implemented");

    // Ordinary failures carry no classification.
    assert_eq!(rig.manager.execute(&Action::cli("fail now", ""), &mut r), Err(Error::ActionFailed));
    assert_eq!(r.error, None);
}
