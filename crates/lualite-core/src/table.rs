//! Tables: the runtime's only structured type.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::error::NativeError;
use crate::value::{TableKey, Value};

/// An insertion-ordered key/value map with an optional metatable.
///
/// Assigning `nil` removes a key. Iteration follows insertion order, so
/// enumerating a table is deterministic.
#[derive(Default)]
pub struct Table {
    entries: IndexMap<TableKey, Value, FxBuildHasher>,
    metatable: Option<TableRef>,
}

impl Table {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a key without consulting the metatable.
    pub fn get(&self, key: &TableKey) -> Value {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Read a string key without consulting the metatable.
    pub fn get_str(&self, key: &str) -> Value {
        self.get(&TableKey::from(key))
    }

    /// Write a key without consulting the metatable.
    pub fn set(&mut self, key: TableKey, value: Value) {
        if value.is_nil() {
            self.entries.shift_remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Write a string key without consulting the metatable.
    pub fn set_str(&mut self, key: &str, value: impl Into<Value>) {
        self.set(TableKey::from(key), value.into());
    }

    /// Number of entries of any key.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// The sequence border: the count of consecutive integer keys from 1.
    pub fn len(&self) -> usize {
        let mut n = 0i64;
        while self.entries.contains_key(&TableKey::Int(n + 1)) {
            n += 1;
        }
        n as usize
    }

    /// Check whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append at position `len() + 1`.
    pub fn push(&mut self, value: Value) {
        let next = self.len() as i64 + 1;
        self.set(TableKey::Int(next), value);
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableKey, &Value)> {
        self.entries.iter()
    }

    /// The attached metatable.
    pub fn metatable(&self) -> Option<&TableRef> {
        self.metatable.as_ref()
    }

    pub(crate) fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }
}

/// Shared reference to a table.
///
/// Equality and hashing are by identity, as in the runtime.
#[derive(Clone, Default)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    /// Create a new, empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence table from values, assigned to keys `1..=n`.
    pub fn from_sequence(values: impl IntoIterator<Item = Value>) -> Self {
        let table = TableRef::new();
        {
            let mut inner = table.borrow_mut();
            for (i, value) in values.into_iter().enumerate() {
                inner.set(TableKey::Int(i as i64 + 1), value);
            }
        }
        table
    }

    /// Borrow the table.
    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    /// Borrow the table mutably.
    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    /// Raw read of any key.
    pub fn raw_get(&self, key: &Value) -> Value {
        match TableKey::from_value(key) {
            Ok(key) => self.borrow().get(&key),
            Err(_) => Value::Nil,
        }
    }

    /// Raw write of any key.
    pub fn raw_set(&self, key: &Value, value: Value) -> Result<(), NativeError> {
        let key = TableKey::from_value(key)?;
        self.borrow_mut().set(key, value);
        Ok(())
    }

    /// Raw read of a string key.
    pub fn get_str(&self, key: &str) -> Value {
        self.borrow().get_str(key)
    }

    /// Raw write of a string key.
    pub fn set_str(&self, key: &str, value: impl Into<Value>) {
        self.borrow_mut().set_str(key, value);
    }

    /// Raw read of an integer key.
    pub fn get_index(&self, index: i64) -> Value {
        self.borrow().get(&TableKey::Int(index))
    }

    /// Sequence border, ignoring `__len`.
    pub fn len(&self) -> usize {
        self.borrow().len()
    }

    /// Check whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.borrow().is_empty()
    }

    /// Append to the sequence part.
    pub fn push(&self, value: impl Into<Value>) {
        self.borrow_mut().push(value.into());
    }

    /// Snapshot of all entries in insertion order.
    ///
    /// The snapshot holds no borrow, so callers may run arbitrary runtime
    /// code while walking it.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.borrow()
            .iter()
            .map(|(k, v)| (k.to_value(), v.clone()))
            .collect()
    }

    /// The attached metatable.
    pub fn metatable(&self) -> Option<TableRef> {
        self.borrow().metatable().cloned()
    }

    /// Read a field of the metatable, if one is attached.
    pub fn metafield(&self, name: &str) -> Value {
        match self.metatable() {
            Some(meta) => meta.get_str(name),
            None => Value::Nil,
        }
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Raw pointer, for identity display.
    pub fn as_ptr(&self) -> *const RefCell<Table> {
        Rc::as_ptr(&self.0)
    }

    /// Non-owning reference, used to observe collection.
    pub fn downgrade(&self) -> WeakTableRef {
        WeakTableRef(Rc::downgrade(&self.0))
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TableRef {}

impl Hash for TableRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.as_ptr(), state);
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef({:p})", self.as_ptr())
    }
}

/// Weak counterpart of [`TableRef`].
#[derive(Clone)]
pub struct WeakTableRef(Weak<RefCell<Table>>);

impl WeakTableRef {
    /// Get the table back if it is still alive.
    pub fn upgrade(&self) -> Option<TableRef> {
        self.0.upgrade().map(TableRef)
    }

    /// Check whether the table has been dropped.
    pub fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl fmt::Debug for WeakTableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakTableRef({:p})", self.0.as_ptr())
    }
}
