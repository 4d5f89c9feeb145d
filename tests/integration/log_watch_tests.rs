//! Service log-watch lifecycle against a simulated remote log.

use tscore::Error;
use tscore::app::events::AppEvent;
use tscore::automation::{Action, ActionResult, RuntimeHost};
use tscore::ssh::{CommandRecord, LogWatchConfig, WatchState};
use zeroize::Zeroizing;

use crate::eventually;
use crate::mocks::Rig;

fn config(host: &str, var: &str) -> LogWatchConfig {
    let mut c = LogWatchConfig::new(host, "/tmp/ts_nohup_server.log", "READY", var).with_fail_pattern("ERROR");
    c.check_interval_ms = 50;
    c
}

fn status(rig: &Rig, var: &str) -> String {
    rig.vars
        .get_string(&format!("{}.status", var))
        .map(|s| s.as_str().to_owned())
        .unwrap_or_default()
}

fn finished(rig: &Rig) -> Vec<(String, WatchState)> {
    rig.events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            AppEvent::WatchFinished { var_name, state } => Some((var_name, state)),
            _ => None,
        })
        .collect()
}

#[test]
fn fail_pattern_appearing_later_ends_failed() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    rig.ssh.set_remote_log(Some("boot\n"));

    let handle = rig.log_watch.start(config("h1", "svc")).unwrap();
    assert!(eventually(2_000, || rig.ssh.probe_count() >= 1));
    assert_eq!(status(&rig, "svc"), "checking");

    rig.ssh.set_remote_log(Some("boot\nERROR: x\n"));
    assert!(handle.wait(3_000));

    assert_eq!(status(&rig, "svc"), "failed");
    assert!(!rig.vars.exists("svc.ready_time"));
    assert_eq!(finished(&rig), vec![("svc".to_string(), WatchState::Failed)]);
    assert_eq!(rig.log_watch.active_count(), 0);
}

#[test]
fn ready_pattern_sets_ready_time() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    rig.ssh.set_remote_log(Some("starting\nREADY\n"));

    let handle = rig.log_watch.start(config("h1", "svc")).unwrap();
    assert_eq!(handle.var_name(), "svc");
    assert!(handle.wait(3_000));

    assert_eq!(status(&rig, "svc"), "ready");
    assert!(rig.vars.get_int("svc.ready_time").unwrap() > 0);
    assert_eq!(finished(&rig), vec![("svc".to_string(), WatchState::Ready)]);
}

#[test]
fn fail_wins_when_both_patterns_present() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    rig.ssh.set_remote_log(Some("READY\nERROR: port in use\n"));

    let handle = rig.log_watch.start(config("h1", "svc")).unwrap();
    assert!(handle.wait(3_000));
    assert_eq!(status(&rig, "svc"), "failed");
}

#[test]
fn missing_log_times_out() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    let mut c = config("h1", "svc");
    c.timeout_sec = 1;

    let handle = rig.log_watch.start(c).unwrap();
    assert!(handle.wait(4_000));

    assert_eq!(status(&rig, "svc"), "timeout");
    assert!(rig.ssh.probe_count() >= 2);
    assert_eq!(finished(&rig), vec![("svc".to_string(), WatchState::Timeout)]);
}

#[test]
fn unknown_host_keeps_retrying_until_timeout() {
    let rig = Rig::new();
    let mut c = config("ghost", "svc");
    c.timeout_sec = 1;

    let handle = rig.log_watch.start(c).unwrap();
    assert!(handle.wait(4_000));
    assert_eq!(status(&rig, "svc"), "timeout");
    assert!(rig.ssh.sessions().is_empty());
}

#[test]
fn stop_leaves_status_checking() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    rig.ssh.set_remote_log(Some("boot\n"));

    let handle = rig.log_watch.start(config("h1", "svc")).unwrap();
    assert!(eventually(2_000, || rig.ssh.probe_count() >= 1));
    assert!(rig.log_watch.is_running("svc"));

    rig.log_watch.stop(&handle);

    assert!(!handle.is_running());
    assert!(!rig.log_watch.is_running("svc"));
    assert_eq!(status(&rig, "svc"), "checking");
    assert!(finished(&rig).is_empty());
}

#[test]
fn restarting_on_same_variable_replaces_the_watch() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    rig.ssh.set_remote_log(Some("boot\n"));

    let first = rig.log_watch.start(config("h1", "svc")).unwrap();
    let second = rig.log_watch.start(config("h1", "svc")).unwrap();
    rig.log_watch.start(config("h1", "other")).unwrap();

    assert!(!first.is_running());
    assert!(second.is_running());
    assert_eq!(rig.log_watch.active_count(), 2);

    rig.log_watch.stop_all();
    assert_eq!(rig.log_watch.active_count(), 0);
}

#[test]
fn incomplete_config_is_rejected() {
    let rig = Rig::new();
    let bad = LogWatchConfig::new("h1", "", "READY", "svc");
    assert!(matches!(rig.log_watch.start(bad), Err(Error::InvalidArgument(_))));
    let bad = LogWatchConfig::new("h1", "/tmp/x.log", "READY", "");
    assert!(matches!(rig.log_watch.start(bad), Err(Error::InvalidArgument(_))));
    assert_eq!(rig.log_watch.active_count(), 0);
}

fn runtime_host(id: &str, addr: &str) -> RuntimeHost {
    RuntimeHost {
        id: id.into(),
        host: addr.into(),
        port: 2222,
        username: "nvidia".into(),
        password: Zeroizing::new("pw".into()),
        use_key_auth: false,
        key_id: String::new(),
    }
}

fn service_command(host: &str) -> CommandRecord {
    let mut rec = CommandRecord::new("svc", host, "server", "./server");
    rec.var_name = "svc".into();
    rec.nohup = true;
    rec.service_mode = true;
    rec.ready_pattern = "Listening".into();
    rec.ready_check_interval_ms = 50;
    rec
}

fn wait_ready(rig: &Rig) -> bool {
    eventually(3_000, || status(rig, "svc") == "ready")
}

#[test]
fn service_on_runtime_host_is_watched_there() {
    let rig = Rig::new();
    rig.add_host("agx", 5);
    rig.manager.register_host(runtime_host("agx", "192.168.55.1")).unwrap();
    rig.commands.add(&service_command("agx")).unwrap();
    rig.ssh.set_remote_log(Some("Listening on :80\n"));

    let mut r = ActionResult::default();
    rig.manager.execute(&Action::ssh_ref("svc"), &mut r).unwrap();

    assert!(wait_ready(&rig));
    let sessions = rig.ssh.sessions();
    assert!(sessions.len() >= 2);
    assert!(sessions.iter().all(|s| (s.host.as_str(), s.port) == ("192.168.55.1", 2222)));
}

#[test]
fn service_on_runtime_only_host_reaches_ready() {
    let rig = Rig::new();
    rig.manager.register_host(runtime_host("lab", "192.168.55.9")).unwrap();
    rig.commands.add(&service_command("lab")).unwrap();
    rig.ssh.set_remote_log(Some("Listening on :80\n"));

    let mut r = ActionResult::default();
    rig.manager.execute(&Action::ssh_ref("svc"), &mut r).unwrap();

    assert!(wait_ready(&rig));
    assert!(rig.ssh.probe_count() >= 1);
    assert_eq!(finished(&rig), vec![("svc".to_string(), WatchState::Ready)]);
}
