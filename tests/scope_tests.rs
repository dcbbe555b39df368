//! Integration tests for scopes, named modules and class tables.

mod common;

use common::{Counter, call_one, construct, install, lookup};
use lualite::core::{State, Value};
use lualite::names::CLASS_NAME_KEY;
use lualite::{Module, RegistrationError};

// =============================================================================
// Scope tree
// =============================================================================

#[test]
fn test_nested_scopes_materialize_tables() {
    let mut module = Module::new();
    {
        let mut game = module.scope("game");
        game.function("version", || 3i64);
        let mut physics = game.scope("physics");
        physics.enum_value("GRAVITY", 10);
        physics.function("scale", |v: f64, by: f64| v * by);
    }
    let mut state = install(module);

    let version = lookup(&mut state, "game.version");
    assert_eq!(state.call(&version, Vec::new()).unwrap(), vec![Value::Int(3)]);
    assert_eq!(lookup(&mut state, "game.physics.GRAVITY"), Value::Int(10));
    let scale = lookup(&mut state, "game.physics.scale");
    assert_eq!(
        state.call(&scale, vec![Value::Float(1.5), Value::Int(2)]).unwrap(),
        vec![Value::Float(3.0)]
    );
}

#[test]
fn test_reopened_scope_is_one_table() {
    let mut module = Module::new();
    module.scope("util").function("one", || 1i64);
    module.scope("util").function("two", || 2i64);
    let mut state = install(module);

    let util = lookup(&mut state, "util");
    let table = util.as_table().unwrap();
    assert!(table.get_str("one").as_function().is_some());
    assert!(table.get_str("two").as_function().is_some());
}

#[test]
fn test_named_module_installs_under_its_name() {
    let mut module = Module::named("engine");
    module.function("tick", || 1i64);
    module.scope("audio").enum_value("CHANNELS", 8);
    let mut state = install(module);

    assert_eq!(state.get_global("tick"), Value::Nil);
    assert_eq!(lookup(&mut state, "engine.audio.CHANNELS"), Value::Int(8));
    let tick = lookup(&mut state, "engine.tick");
    assert_eq!(state.call(&tick, Vec::new()).unwrap(), vec![Value::Int(1)]);
}

#[test]
fn test_existing_table_is_extended() {
    let mut state = State::new();
    let existing = state.create_table();
    existing.set_str("kept", 5i64);
    state.set_global("tools", existing);

    let mut module = Module::new();
    module.scope("tools").enum_value("ADDED", 6);
    module.install(&mut state).unwrap();

    assert_eq!(lookup(&mut state, "tools.kept"), Value::Int(5));
    assert_eq!(lookup(&mut state, "tools.ADDED"), Value::Int(6));
}

#[test]
fn test_conflicting_global_is_reported() {
    let mut state = State::new();
    state.set_global("tools", "not a table");

    let mut module = Module::new();
    module.scope("tools").scope("inner").enum_value("X", 1);
    let err = module.install(&mut state).unwrap_err();
    assert_eq!(
        err,
        RegistrationError::NamespaceConflict {
            name: "tools".to_string(),
            type_name: "string",
        }
    );
}

#[test]
fn test_failed_install_binds_nothing() {
    let mut state = State::new();
    state.set_global("tools", "not a table");

    let mut module = Module::new();
    module.function("early", || 1i64);
    module.scope("alpha").enum_value("A", 1);
    module.class::<Counter>("Counter").constructor(Counter::new);
    module.scope("tools").scope("inner").enum_value("X", 1);
    let err = module.install(&mut state).unwrap_err();
    assert!(matches!(err, RegistrationError::NamespaceConflict { .. }));

    assert_eq!(state.get_global("early"), Value::Nil);
    assert_eq!(state.get_global("alpha"), Value::Nil);
    assert_eq!(state.get_global("Counter"), Value::Nil);
    assert_eq!(state.get_global("tools"), Value::from("not a table"));
}

#[test]
fn test_conflict_reports_qualified_name() {
    let mut state = State::new();
    let outer = state.create_table();
    outer.set_str("inner", 1i64);
    state.set_global("outer", outer);

    let mut module = Module::new();
    module.scope("outer").scope("inner").enum_value("X", 1);
    let err = module.install(&mut state).unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::NamespaceConflict { ref name, type_name: "number" } if name == "outer.inner"
    ));
}

// =============================================================================
// Class tables
// =============================================================================

#[test]
fn test_class_table_carries_classname() {
    let mut module = Module::new();
    module
        .scope("ui")
        .class::<Counter>("Clicks")
        .constructor(Counter::new)
        .enum_value("MAX", 99);
    let mut state = install(module);

    assert_eq!(lookup(&mut state, "ui.Clicks.__classname"), Value::from("Clicks"));
    assert_eq!(lookup(&mut state, "ui.Clicks.MAX"), Value::Int(99));
    assert_eq!(lookup(&mut state, &format!("ui.Clicks.{}", CLASS_NAME_KEY)), Value::from("Clicks"));
}

#[test]
fn test_class_in_scope_constructs_instances() {
    let mut module = Module::new();
    module
        .scope("stats")
        .class::<Counter>("Counter")
        .constructor(Counter::new)
        .method("increment", Counter::increment)
        .method("get", Counter::value);
    let mut state = install(module);

    let counter = construct(&mut state, "stats.Counter", "new", vec![Value::Int(1)]).unwrap();
    state.call_method(&counter, "increment", Vec::new()).unwrap();
    assert_eq!(call_one(&mut state, &counter, "get", Vec::new()), Value::Int(2));
}

#[test]
fn test_class_exposed_twice_shares_members() {
    let mut module = Module::new();
    module.class::<Counter>("Counter").constructor(Counter::new);
    module
        .scope("legacy")
        .class::<Counter>("Tally")
        .method("get", Counter::value);
    let mut state = install(module);

    // Both class tables bind every constructor, and instances from either
    // see every method.
    let counter = construct(&mut state, "Counter", "new", vec![Value::Int(4)]).unwrap();
    assert_eq!(call_one(&mut state, &counter, "get", Vec::new()), Value::Int(4));
    let tally = construct(&mut state, "legacy.Tally", "new", vec![Value::Int(9)]).unwrap();
    assert_eq!(call_one(&mut state, &tally, "get", Vec::new()), Value::Int(9));
    assert_eq!(lookup(&mut state, "legacy.Tally.__classname"), Value::from("Tally"));
}

#[test]
fn test_nested_scope_inside_class() {
    let mut module = Module::new();
    module.class::<Counter>("Counter").constructor(Counter::new);
    module.scope("Counter").enum_value("STEP", 1);
    let mut state = install(module);

    // The scope and the class share the name and so share one table.
    assert_eq!(lookup(&mut state, "Counter.STEP"), Value::Int(1));
    assert!(lookup(&mut state, "Counter.new").as_function().is_some());
}
