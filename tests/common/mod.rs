//! Shared fixtures for the integration tests.
//!
//! Script-level operations are driven through the `State` API: `call` for
//! `f(...)`, `call_method` for `obj:m(...)`, `get_field`/`set_field` for
//! `obj.k` and `obj.k = v`.

#![allow(dead_code)]

use lualite::core::{NativeError, State, Value};
use lualite::{Module, NativeClass};

/// The counter from the end-to-end scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub value: i64,
}

impl NativeClass for Counter {
    const NAME: &'static str = "Counter";
}

impl Counter {
    pub fn new(start: i64) -> Self {
        Counter { value: start }
    }

    pub fn increment(&mut self) {
        self.value += 1;
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn set_value(&mut self, value: i64) {
        self.value = value;
    }
}

/// Register `Counter` with a constructor, `increment`, and a read-write
/// `value` property.
pub fn counter_module() -> Module {
    let mut module = Module::new();
    module
        .class::<Counter>("Counter")
        .constructor(Counter::new)
        .method("increment", Counter::increment)
        .method("get", Counter::value)
        .property("value", Counter::value, Counter::set_value);
    module
}

/// Install a module into a fresh runtime.
pub fn install(module: Module) -> State {
    let mut state = State::new();
    module.install(&mut state).expect("module should install");
    state
}

/// Resolve a dotted path starting at the globals.
pub fn lookup(state: &mut State, path: &str) -> Value {
    let mut current = Value::Table(state.globals());
    for segment in path.split('.') {
        current = state
            .get_field(&current, segment)
            .unwrap_or_else(|e| panic!("failed to read {}: {}", path, e));
    }
    current
}

/// Call `<class>.<constructor>(args...)` and return the instance.
pub fn construct(state: &mut State, class: &str, constructor: &str, args: Vec<Value>) -> Result<Value, NativeError> {
    let class = lookup(state, class);
    let constructor = state.get_field(&class, constructor)?;
    let mut results = state.call(&constructor, args)?;
    assert_eq!(results.len(), 1, "a constructor returns exactly one instance");
    Ok(results.remove(0))
}

/// Call `obj:name(args...)` and return its single result.
pub fn call_one(state: &mut State, object: &Value, name: &str, args: Vec<Value>) -> Value {
    let mut results = state
        .call_method(object, name, args)
        .unwrap_or_else(|e| panic!("{} failed: {}", name, e));
    assert_eq!(results.len(), 1, "{} should return one value", name);
    results.remove(0)
}
