//! Variable store behaviour as seen by collaborators: typed access,
//! change events, read-only enforcement and NVS persistence.

use tscore::Error;
use tscore::adapters::nvs::NvsAdapter;
use tscore::automation::template::expand;
use tscore::automation::variables::{VAR_NAME_MAX, VarFlags, Variable};
use tscore::automation::{Value, VariableStore};

use crate::mocks::Rig;

#[test]
fn int_variable_reads_through_every_getter() {
    let rig = Rig::new();
    rig.vars
        .register(Variable::new("cpu.temp", "sensors", Value::Int(0)))
        .unwrap();

    rig.vars.set_int("cpu.temp", 42).unwrap();

    assert_eq!(rig.vars.get_int("cpu.temp"), Ok(42));
    assert_eq!(rig.vars.get_string("cpu.temp").unwrap().as_str(), "42");
    assert_eq!(rig.vars.get_bool("cpu.temp"), Ok(true));
    assert_eq!(rig.vars.get_float("cpu.temp"), Ok(42.0));
}

#[test]
fn string_variable_does_not_coerce_to_number() {
    let rig = Rig::new();
    rig.vars
        .register(Variable::new("agx.name", "ssh", Value::text("jetson")))
        .unwrap();
    assert_eq!(rig.vars.get_int("agx.name"), Err(Error::IncompatibleType));
    assert_eq!(rig.vars.get_bool("agx.name"), Err(Error::IncompatibleType));
}

#[test]
fn change_events_fire_only_on_real_changes() {
    let rig = Rig::new();
    rig.vars
        .register(Variable::new("fan.duty", "fan", Value::Float(0.5)))
        .unwrap();

    rig.vars.set_float("fan.duty", 0.5).unwrap();
    // Inside the float tolerance counts as equal.
    rig.vars.set_float("fan.duty", 0.50001).unwrap();
    assert!(rig.events.changed_names().is_empty());

    rig.vars.set_float("fan.duty", 0.75).unwrap();
    assert_eq!(rig.events.changed_names(), vec!["fan.duty".to_string()]);
}

#[test]
fn read_only_rejects_external_writes_only() {
    let rig = Rig::new();
    rig.vars
        .register(Variable::new("system.uptime_s", "system", Value::Int(0)).with_flags(VarFlags::READ_ONLY))
        .unwrap();

    assert_eq!(rig.vars.set_int("system.uptime_s", 5), Err(Error::ReadOnly));
    rig.vars.set_internal("system.uptime_s", Value::Int(5)).unwrap();
    assert_eq!(rig.vars.get_int("system.uptime_s"), Ok(5));
}

#[test]
fn unregister_by_source_removes_a_family() {
    let rig = Rig::new();
    for suffix in ["status", "exit_code", "timestamp"] {
        rig.vars
            .register(Variable::new(&format!("m1.{}", suffix), "m1", Value::Int(0)))
            .unwrap();
    }
    rig.vars.register(Variable::new("other", "x", Value::Int(0))).unwrap();

    assert_eq!(rig.vars.unregister_by_source("m1"), Ok(3));
    assert!(!rig.vars.exists("m1.status"));
    assert!(rig.vars.exists("other"));
}

#[test]
fn enumerate_filters_by_prefix_in_registration_order() {
    let rig = Rig::new();
    for name in ["agx.cpu", "agx.gpu", "lpmu.cpu"] {
        rig.vars.register(Variable::new(name, "t", Value::Int(1))).unwrap();
    }
    let mut seen = Vec::new();
    let visited = rig.vars.enumerate("agx.", |v| {
        seen.push(v.name.to_string());
        true
    });
    assert_eq!(visited, 2);
    assert_eq!(seen, vec!["agx.cpu".to_string(), "agx.gpu".to_string()]);
}

#[test]
fn capacity_is_enforced() {
    let vars = VariableStore::new(2, None);
    vars.init();
    vars.register(Variable::new("a", "t", Value::Int(1))).unwrap();
    vars.register(Variable::new("b", "t", Value::Int(1))).unwrap();
    assert_eq!(vars.register(Variable::new("c", "t", Value::Int(1))), Err(Error::NoSpace));
    // Re-registering an existing name updates in place.
    vars.register(Variable::new("a", "t", Value::Int(9))).unwrap();
    assert_eq!(vars.get_int("a"), Ok(9));
}

#[test]
fn persistent_variables_survive_a_restart() {
    let nvs = NvsAdapter::new().unwrap();
    let persistent = VarFlags {
        read_only: false,
        persistent: true,
    };

    let before = VariableStore::new(8, None);
    before.init();
    before
        .register(Variable::new("boot.count", "system", Value::Int(0)).with_flags(persistent))
        .unwrap();
    before.register(Variable::new("scratch", "system", Value::Int(0))).unwrap();
    before.set_int("boot.count", 7).unwrap();
    before.set_int("scratch", 3).unwrap();
    let mut handle = nvs.handle();
    assert_eq!(before.save_all(handle.as_mut()), Ok(1));

    let after = VariableStore::new(8, None);
    after.init();
    after
        .register(Variable::new("boot.count", "system", Value::Int(0)).with_flags(persistent))
        .unwrap();
    after.register(Variable::new("scratch", "system", Value::Int(0))).unwrap();
    assert_eq!(after.load_all(nvs.handle().as_ref()), Ok(1));
    assert_eq!(after.get_int("boot.count"), Ok(7));
    assert_eq!(after.get_int("scratch"), Ok(0));
}

#[test]
fn uninitialised_store_refuses_work() {
    let vars = VariableStore::new(4, None);
    assert_eq!(
        vars.register(Variable::new("a", "t", Value::Int(1))),
        Err(Error::Uninitialized)
    );
    assert_eq!(vars.get_int("a"), Err(Error::Uninitialized));
    assert_eq!(vars.count(), 0);
}

#[test]
fn longest_name_round_trips_through_store_and_expansion() {
    let rig = Rig::new();
    let name = "n".repeat(VAR_NAME_MAX);
    rig.vars.register(Variable::new(&name, "t", Value::Int(0))).unwrap();
    rig.vars.set_int(&name, 7).unwrap();

    assert_eq!(rig.vars.get_int(&name), Ok(7));
    assert_eq!(expand(&rig.vars, &format!("v=${{{}}}", name), 256), "v=7");

    let over = "n".repeat(VAR_NAME_MAX + 1);
    assert!(matches!(
        rig.vars.upsert_internal(&over, Value::Int(1), "t"),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(rig.vars.get_int(&over), Err(Error::NotFound));
    let literal = format!("${{{}}}", over);
    assert_eq!(expand(&rig.vars, &literal, 256), literal);
}
