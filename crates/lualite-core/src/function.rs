//! Native function storage and the call frame passed to it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::NativeError;
use crate::state::State;
use crate::value::Value;

/// Trait for callable native functions.
///
/// A callable reads its arguments from the [`CallFrame`], pushes its results
/// onto it, and returns how many results it pushed.
pub trait NativeCallable {
    /// Call this function with the given frame.
    fn call(&self, frame: &mut CallFrame<'_>) -> Result<usize, NativeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallFrame<'_>) -> Result<usize, NativeError>,
{
    fn call(&self, frame: &mut CallFrame<'_>) -> Result<usize, NativeError> {
        (self)(frame)
    }
}

/// Type-erased native function value.
///
/// Cloning shares the underlying callable; equality is identity.
#[derive(Clone)]
pub struct NativeFunction {
    inner: Rc<dyn NativeCallable>,
}

impl NativeFunction {
    /// Wrap a closure as a runtime function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<usize, NativeError> + 'static,
    {
        Self { inner: Rc::new(f) }
    }

    /// Call this function with the given frame.
    pub fn call(&self, frame: &mut CallFrame<'_>) -> Result<usize, NativeError> {
        self.inner.call(frame)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &NativeFunction) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Raw pointer, for identity display and hashing.
    pub fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

impl Eq for NativeFunction {}

impl Hash for NativeFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.as_ptr(), state);
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").finish_non_exhaustive()
    }
}

/// Frame for one native call.
///
/// Arguments are addressed by 1-based position, the way the runtime's stack
/// is. A position past the last argument reads as `nil`.
pub struct CallFrame<'s> {
    state: &'s mut State,
    args: Vec<Value>,
    results: Vec<Value>,
}

impl<'s> CallFrame<'s> {
    /// Create a new call frame.
    pub fn new(state: &'s mut State, args: Vec<Value>) -> Self {
        Self {
            state,
            args,
            results: Vec::new(),
        }
    }

    /// Number of arguments in the frame.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Get the argument at a 1-based position.
    pub fn arg(&self, position: usize) -> Value {
        position
            .checked_sub(1)
            .and_then(|i| self.args.get(i))
            .cloned()
            .unwrap_or_default()
    }

    /// All arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The runtime that owns this call.
    pub fn state(&mut self) -> &mut State {
        &mut *self.state
    }

    /// Borrow the arguments and the runtime at the same time.
    pub fn split(&mut self) -> (&[Value], &mut State) {
        (&self.args, &mut *self.state)
    }

    /// Push one result.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.results.push(value.into());
    }

    /// Number of results pushed so far.
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Consume the frame and return the top `count` results.
    pub fn into_results(mut self, count: usize) -> Vec<Value> {
        let start = self.results.len().saturating_sub(count);
        let mut results = self.results.split_off(start);
        results.resize(count, Value::Nil);
        results
    }
}

impl fmt::Debug for CallFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("args", &self.args)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}
