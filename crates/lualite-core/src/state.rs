//! One runtime instance.

use std::fmt;

use log::{debug, trace, warn};
use rustc_hash::FxHashMap;

use crate::config::StateConfig;
use crate::error::NativeError;
use crate::function::CallFrame;
use crate::heap::ObjectHeap;
use crate::meta;
use crate::table::{TableRef, WeakTableRef};
use crate::value::Value;

/// Upper bound on `__index`/`__newindex` table chains.
const MAX_META_CHAIN: usize = 100;

/// A table marked for finalization.
struct PendingFinalizer {
    object: WeakTableRef,
    metatable: Option<TableRef>,
    /// Marking sequence number; finalizers run newest first.
    order: u64,
}

/// Marked tables keyed by allocation address. The weak reference held in
/// each entry keeps the allocation alive, so an address is never reused
/// while it is a key.
type FinalizerMap = FxHashMap<*const (), PendingFinalizer>;

fn finalizer_key(table: &TableRef) -> *const () {
    table.as_ptr().cast()
}

/// Sort by marking order, newest first.
fn newest_first(mut pending: Vec<PendingFinalizer>) -> Vec<PendingFinalizer> {
    pending.sort_unstable_by(|a, b| b.order.cmp(&a.order));
    pending
}

/// A runtime instance: globals, native object heap and finalization queue.
///
/// Tables are reference counted. A table whose metatable carries `__gc` when
/// the metatable is attached is marked for finalization; once the table is
/// unreachable, [`State::collect_garbage`] calls that `__gc` with a single
/// `nil` argument. Dropping the state runs every remaining finalizer unless
/// [`StateConfig::finalize_on_close`] is off.
pub struct State {
    globals: TableRef,
    heap: ObjectHeap,
    finalizers: FinalizerMap,
    next_mark: u64,
    depth: usize,
    config: StateConfig,
}

impl State {
    /// Create a runtime with default configuration.
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: StateConfig) -> Self {
        debug!("creating state: {:?}", config);
        Self {
            globals: TableRef::new(),
            heap: ObjectHeap::new(),
            finalizers: FinalizerMap::default(),
            next_mark: 0,
            depth: 0,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// The globals table.
    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    /// Read a global by name.
    pub fn get_global(&self, name: &str) -> Value {
        self.globals.get_str(name)
    }

    /// Bind a global by name.
    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) {
        self.globals.set_str(name, value);
    }

    /// Create a new, empty table.
    pub fn create_table(&self) -> TableRef {
        TableRef::new()
    }

    /// The native object heap.
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// The native object heap, mutably.
    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut self.heap
    }

    // ========================================================================
    // Metatables and collection
    // ========================================================================

    /// Attach (or detach) a metatable.
    ///
    /// The table is marked for finalization when the new metatable has a
    /// `__gc` field at this point. A marked table stays marked; at collection
    /// time its current metatable supplies the finalizer.
    pub fn set_metatable(&mut self, table: &TableRef, metatable: Option<TableRef>) {
        let key = finalizer_key(table);
        if let Some(pending) = self.finalizers.get_mut(&key) {
            pending.metatable = metatable.clone();
        } else if let Some(meta) = &metatable
            && !meta.get_str(meta::GC).is_nil()
        {
            trace!("table {:p} marked for finalization", table.as_ptr());
            let order = self.next_mark;
            self.next_mark += 1;
            self.finalizers.insert(
                key,
                PendingFinalizer {
                    object: table.downgrade(),
                    metatable: Some(meta.clone()),
                    order,
                },
            );
        }
        table.borrow_mut().set_metatable(metatable);
    }

    /// Run the finalizers of every marked table that is no longer reachable.
    ///
    /// Returns the number of finalizers run. Finalizers may release further
    /// tables, so collection repeats until nothing else becomes unreachable.
    pub fn collect_garbage(&mut self) -> usize {
        let mut total = 0;
        loop {
            let dead_keys: Vec<_> = self
                .finalizers
                .iter()
                .filter(|(_, p)| p.object.is_dead())
                .map(|(key, _)| *key)
                .collect();
            if dead_keys.is_empty() {
                break;
            }
            total += dead_keys.len();
            let dead = dead_keys
                .iter()
                .filter_map(|key| self.finalizers.remove(key))
                .collect();
            for pending in newest_first(dead) {
                self.run_finalizer(pending, Value::Nil);
            }
        }
        if total > 0 {
            trace!("collected {} finalizable tables", total);
        }
        total
    }

    /// Number of tables marked for finalization and not yet finalized.
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.len()
    }

    fn run_finalizer(&mut self, pending: PendingFinalizer, arg: Value) {
        let handler = pending
            .metatable
            .map(|meta| meta.get_str(meta::GC))
            .unwrap_or_default();
        if handler.is_nil() {
            return;
        }
        if let Err(err) = self.call(&handler, vec![arg]) {
            warn!("error in {} metamethod: {}", meta::GC, err);
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call a value with arguments and return all of its results.
    ///
    /// Tables are callable through `__call`, which receives the table as its
    /// first argument.
    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> Result<Vec<Value>, NativeError> {
        match function {
            Value::Function(f) => {
                if self.depth >= self.config.max_call_depth {
                    return Err(NativeError::CallDepthExceeded {
                        limit: self.config.max_call_depth,
                    });
                }
                let f = f.clone();
                self.depth += 1;
                let mut frame = CallFrame::new(self, args);
                let results = f.call(&mut frame).map(|count| frame.into_results(count));
                self.depth -= 1;
                results
            }
            Value::Table(table) => {
                let handler = table.metafield(meta::CALL);
                if handler.is_nil() {
                    return Err(NativeError::NotCallable { type_name: "table" });
                }
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(function.clone());
                full.extend(args);
                self.call(&handler, full)
            }
            other => Err(NativeError::NotCallable {
                type_name: other.type_name(),
            }),
        }
    }

    /// Call a global function by name.
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, NativeError> {
        let function = self.get_global(name);
        self.call(&function, args)
    }

    /// Method call: looks up `name` on `object` and calls it with `object`
    /// prepended to the arguments.
    pub fn call_method(
        &mut self,
        object: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, NativeError> {
        let method = self.get_field(object, name)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(object.clone());
        full.extend(args);
        self.call(&method, full)
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// Read `object[key]`, honouring `__index`.
    pub fn index(&mut self, object: &Value, key: &Value) -> Result<Value, NativeError> {
        let mut current = object.clone();
        for _ in 0..MAX_META_CHAIN {
            let Value::Table(table) = &current else {
                return Err(NativeError::NotIndexable {
                    type_name: current.type_name(),
                });
            };
            let raw = table.raw_get(key);
            if !raw.is_nil() {
                return Ok(raw);
            }
            let handler = table.metafield(meta::INDEX);
            match handler {
                Value::Nil => return Ok(Value::Nil),
                Value::Function(_) => {
                    let results = self.call(&handler, vec![current.clone(), key.clone()])?;
                    return Ok(first(results));
                }
                next => current = next,
            }
        }
        Err(NativeError::other("'__index' chain too long; possible loop"))
    }

    /// Read `object.name`.
    pub fn get_field(&mut self, object: &Value, name: &str) -> Result<Value, NativeError> {
        self.index(object, &Value::from(name))
    }

    /// Write `object[key] = value`, honouring `__newindex`.
    pub fn set_index(&mut self, object: &Value, key: &Value, value: Value) -> Result<(), NativeError> {
        let mut current = object.clone();
        for _ in 0..MAX_META_CHAIN {
            let Value::Table(table) = &current else {
                return Err(NativeError::NotIndexable {
                    type_name: current.type_name(),
                });
            };
            if !table.raw_get(key).is_nil() {
                return table.raw_set(key, value);
            }
            let handler = table.metafield(meta::NEWINDEX);
            match handler {
                Value::Nil => return table.raw_set(key, value),
                Value::Function(_) => {
                    self.call(&handler, vec![current.clone(), key.clone(), value])?;
                    return Ok(());
                }
                next => current = next,
            }
        }
        Err(NativeError::other("'__newindex' chain too long; possible loop"))
    }

    /// Write `object.name = value`.
    pub fn set_field(&mut self, object: &Value, name: &str, value: impl Into<Value>) -> Result<(), NativeError> {
        self.set_index(object, &Value::from(name), value.into())
    }

    // ========================================================================
    // Operators
    // ========================================================================

    /// Length operator, honouring `__len`.
    pub fn len(&mut self, value: &Value) -> Result<Value, NativeError> {
        match value {
            Value::String(s) => Ok(Value::Int(s.len() as i64)),
            Value::Table(table) => {
                let handler = table.metafield(meta::LEN);
                if handler.is_nil() {
                    Ok(Value::Int(table.len() as i64))
                } else {
                    Ok(first(self.call(&handler, vec![value.clone()])?))
                }
            }
            other => Err(NativeError::other(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        }
    }

    /// Equality, honouring `__eq` for distinct tables.
    pub fn equals(&mut self, a: &Value, b: &Value) -> Result<bool, NativeError> {
        if a == b {
            return Ok(true);
        }
        if let (Value::Table(x), Value::Table(y)) = (a, b) {
            let mut handler = x.metafield(meta::EQ);
            if handler.is_nil() {
                handler = y.metafield(meta::EQ);
            }
            if !handler.is_nil() {
                let result = first(self.call(&handler, vec![a.clone(), b.clone()])?);
                return Ok(result.is_truthy());
            }
        }
        Ok(false)
    }

    /// String conversion, honouring `__tostring`.
    pub fn to_display(&mut self, value: &Value) -> Result<String, NativeError> {
        if let Value::Table(table) = value {
            let handler = table.metafield(meta::TOSTRING);
            if !handler.is_nil() {
                return match first(self.call(&handler, vec![value.clone()])?) {
                    Value::String(s) => Ok(s.to_string()),
                    _ => Err(NativeError::other("'__tostring' must return a string")),
                };
            }
        }
        Ok(display_raw(value))
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if !self.config.finalize_on_close {
            return;
        }
        // Reverse marking order, like closing the runtime.
        while !self.finalizers.is_empty() {
            let remaining = std::mem::take(&mut self.finalizers).into_values().collect();
            for pending in newest_first(remaining) {
                let arg = pending
                    .object
                    .upgrade()
                    .map(Value::Table)
                    .unwrap_or_default();
                self.run_finalizer(pending, arg);
            }
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("heap", &self.heap)
            .field("finalizers", &self.finalizers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn first(results: Vec<Value>) -> Value {
    results.into_iter().next().unwrap_or_default()
}

/// Format a value without metamethods.
pub fn display_raw(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) if v.is_finite() && v.fract() == 0.0 => format!("{:.1}", v),
        Value::Float(v) => v.to_string(),
        Value::String(s) => s.to_string(),
        Value::Handle(h) => format!("userdata: {}", h),
        Value::Table(t) => format!("table: {:p}", t.as_ptr()),
        Value::Function(f) => format!("function: {:p}", f.as_ptr()),
    }
}
