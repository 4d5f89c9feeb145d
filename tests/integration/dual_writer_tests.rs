//! NVS and the removable-medium mirror: inline exports after mutations and
//! boot-time reconciliation in each direction.

use tscore::Error;
use tscore::ssh::{CommandRecord, HostRecord};
use tscore::storage::{Reconciled, reconcile};

use crate::mocks::Rig;

const HOSTS: &str = "config/ssh_hosts.json";

/// A rig whose NVS holds `ids` while the medium stays untouched.
fn rig_with_nvs_hosts(ids: &[&str]) -> Rig {
    let rig = Rig::new();
    rig.files.set_mounted(false);
    for (n, id) in ids.iter().enumerate() {
        rig.add_host(id, n as u8 + 1);
    }
    rig.files.set_mounted(true);
    assert!(rig.files.paths().is_empty());
    rig
}

fn host_doc(id: &str, n: u8) -> String {
    format!(
        r#"{{"id":"{}","host":"10.9.0.{}","port":22,"username":"root","auth_type":"password"}}"#,
        id, n
    )
}

#[test]
fn mutations_export_aggregate_and_record_files() {
    let rig = Rig::new();
    rig.add_host("h1", 1);

    let all = rig.files.json(HOSTS).unwrap();
    let items = all.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "h1");
    assert_eq!(items[0]["host"], "10.0.0.1");
    assert_eq!(items[0]["auth_type"], "password");

    let one = rig.files.json("config/ssh_hosts/h1.json").unwrap();
    assert_eq!(one["username"], "jetson");

    // The runtime password never reaches the medium.
    for path in rig.files.paths() {
        assert!(!rig.files.text(&path).unwrap().contains("secret"), "{}", path);
    }
}

#[test]
fn remove_prunes_the_record_file() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    rig.add_host("h2", 2);
    assert!(rig.files.text("config/ssh_hosts/h1.json").is_some());

    rig.hosts.remove("h1").unwrap();

    assert!(rig.files.text("config/ssh_hosts/h1.json").is_none());
    assert!(rig.files.text("config/ssh_hosts/h2.json").is_some());
    assert_eq!(rig.files.json(HOSTS).unwrap().as_array().unwrap().len(), 1);
    assert!(rig.hosts.password("h1").is_none());
}

#[test]
fn files_with_more_records_reload_nvs() {
    let rig = rig_with_nvs_hosts(&["h1"]);
    rig.files.put(
        HOSTS,
        &format!("[{},{},{}]", host_doc("h1", 1), host_doc("h2", 2), host_doc("h3", 3)),
    );

    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Reloaded(3));
    assert_eq!(rig.hosts.count(), 3);
    assert_eq!(rig.hosts.get("h2").unwrap().host, "10.9.0.2");
    // The file version replaced the NVS one.
    assert_eq!(rig.hosts.get("h1").unwrap().username, "root");
}

#[test]
fn equal_sets_merge() {
    let rig = rig_with_nvs_hosts(&["h1"]);
    rig.files.put(HOSTS, &format!("[{}]", host_doc("h1", 1)));
    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Merged(1));
    assert_eq!(rig.hosts.count(), 1);
}

#[test]
fn missing_files_are_exported_from_nvs() {
    let rig = rig_with_nvs_hosts(&["h1", "h2"]);

    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Exported(2));
    assert_eq!(rig.files.json(HOSTS).unwrap().as_array().unwrap().len(), 2);
    assert!(rig.files.text("config/ssh_hosts/h2.json").is_some());
}

#[test]
fn corrupt_aggregate_is_replaced() {
    let rig = rig_with_nvs_hosts(&["h1"]);
    rig.files.put(HOSTS, "[{\"id\":\"h1\",");

    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Exported(1));
    assert_eq!(rig.files.json(HOSTS).unwrap()[0]["id"], "h1");

    rig.files.put(HOSTS, "[");
    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Exported(1));
}

#[test]
fn unmounted_medium_is_skipped() {
    let rig = rig_with_nvs_hosts(&["h1"]);
    rig.files.set_mounted(false);
    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Skipped);
    assert_eq!(rig.hosts.count(), 1);
}

#[test]
fn nothing_anywhere_is_empty() {
    let rig = Rig::new();
    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Empty);
}

#[test]
fn unusable_file_records_are_skipped() {
    let rig = Rig::new();
    rig.files.put(
        HOSTS,
        &format!(r#"[{{"id":"","host":"10.9.0.7"}},{{"id":"nohost"}},{}]"#, host_doc("h9", 9)),
    );

    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Reloaded(1));
    assert_eq!(rig.hosts.list().unwrap().iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["h9"]);
}

#[test]
fn commands_mirror_like_hosts() {
    let rig = Rig::new();
    rig.add_host("h1", 1);
    let mut rec = CommandRecord::new("", "h1", "uptime", "uptime -p");
    rec.var_name = "up".into();
    let id = rig.commands.add(&rec).unwrap();
    assert!(!id.is_empty());

    let all = rig.files.json("config/ssh_commands.json").unwrap();
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["id"], id.as_str());
    assert_eq!(all[0]["var_name"], "up");
    let one = rig.files.json(&format!("config/ssh_commands/{}.json", id)).unwrap();
    assert_eq!(one["command"], "uptime -p");

    rig.commands.remove(&id).unwrap();
    assert_eq!(rig.files.json("config/ssh_commands.json").unwrap().as_array().unwrap().len(), 0);
    assert!(rig.files.text(&format!("config/ssh_commands/{}.json", id)).is_none());
}

#[test]
fn key_hosts_export_their_key_id() {
    let rig = Rig::new();
    rig.hosts
        .add(&HostRecord::new("k1", "10.0.0.9", "root").with_key("agx_key"))
        .unwrap();
    let one = rig.files.json("config/ssh_hosts/k1.json").unwrap();
    assert_eq!(one["auth_type"], "key");
    assert_eq!(one["keyid"], "agx_key");
}

#[test]
fn path_like_ids_never_reach_the_medium() {
    let rig = Rig::new();
    for id in ["../boot", "a/b", ".."] {
        let host = HostRecord::new(id, "10.0.0.1", "root");
        assert!(matches!(rig.hosts.add(&host), Err(Error::InvalidArgument(_))), "{}", id);
        let cmd = CommandRecord::new(id, "h1", "x", "true");
        assert!(matches!(rig.commands.add(&cmd), Err(Error::InvalidArgument(_))), "{}", id);
    }
    assert_eq!(rig.hosts.count(), 0);
    assert_eq!(rig.commands.count(), 0);
    assert!(rig.files.paths().iter().all(|p| !p.contains("..")));

    // A crafted aggregate cannot smuggle one in either.
    rig.files.put(HOSTS, &format!(r#"[{{"id":"../x","host":"10.9.0.1"}},{}]"#, host_doc("h1", 1)));
    assert_eq!(reconcile(rig.hosts.as_ref()), Reconciled::Reloaded(1));
    assert!(rig.files.text("config/ssh_hosts/../x.json").is_none());
}
