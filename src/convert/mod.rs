//! Conversion between native Rust values and runtime values.
//!
//! This module provides the two halves of the marshalling protocol:
//! - [`FromValue`]: pull a Rust value out of a runtime [`Value`] (arguments)
//! - [`IntoValue`]: push a Rust value into the runtime (results)
//!
//! The set of shapes is closed. A registered signature that mentions any
//! other type does not compile.
//!
//! ## Supported Shapes
//!
//! - Integers: `i8`..`i64`, `u8`..`u64`, `isize`, `usize` (pulls truncate floats)
//! - Floats: `f32`, `f64`
//! - Boolean: `bool`
//! - Strings: `String`, `Rc<str>`, `&str` (push only)
//! - Handles: [`Opaque`], [`ByHandle`] (pull only)
//! - Class instances: [`ObjectRef`], `Box<T>` (push only)
//! - Containers: tuples up to 8, fixed arrays, `Vec`, and with the
//!   `std-containers` feature `VecDeque`, `LinkedList`, `BTreeMap`,
//!   `HashMap`, `IndexMap`
//! - `Option<T>`, `()` and raw [`Value`]
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use lualite::convert::{FromValue, IntoValue, Marshal};
//! use lualite::ClassRegistry;
//! use lualite::core::State;
//!
//! let mut state = State::new();
//! let classes = Rc::new(ClassRegistry::new());
//! let mut cx = Marshal::new(&mut state, &classes);
//!
//! let value = vec![1, 2, 3].into_value(&mut cx).unwrap();
//! let back: Vec<i32> = FromValue::from_value(&value, &mut cx).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

mod container;
mod object;
mod tuple;

use std::rc::Rc;

use lualite_core::{ConversionError, NativeError, State, Value};

use crate::registry::ClassRegistry;

pub use object::{ByHandle, ObjectRef, Opaque};

/// Marshalling context.
///
/// Pulls need the runtime to resolve object handles; pushes of class values
/// need the frozen class registry to build wrapper instances.
pub struct Marshal<'a> {
    state: &'a mut State,
    classes: &'a Rc<ClassRegistry>,
}

impl<'a> Marshal<'a> {
    /// Create a marshalling context.
    pub fn new(state: &'a mut State, classes: &'a Rc<ClassRegistry>) -> Self {
        Self { state, classes }
    }

    /// The runtime.
    pub fn state(&mut self) -> &mut State {
        &mut *self.state
    }

    /// The class registry.
    pub fn classes(&self) -> &Rc<ClassRegistry> {
        self.classes
    }
}

/// Pull a Rust value out of a runtime value.
pub trait FromValue: Sized {
    /// Convert the given value.
    ///
    /// Returns a `ConversionError` if the value has an incompatible shape.
    fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError>;
}

/// Push a Rust value into the runtime.
pub trait IntoValue {
    /// Convert into a single runtime value.
    fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError>;

    /// Push as call results and append them to `results`.
    ///
    /// Most shapes produce exactly one result. `()` produces none and
    /// tuples produce one result per element.
    fn push_results(self, cx: &mut Marshal<'_>, results: &mut Vec<Value>) -> Result<(), NativeError>
    where
        Self: Sized,
    {
        results.push(self.into_value(cx)?);
        Ok(())
    }
}

pub(crate) fn mismatch(expected: &'static str, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected,
        actual: value.type_name(),
    }
}

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value, _cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
                    value
                        .to_integer()
                        .map(|v| v as $ty)
                        .ok_or_else(|| mismatch("number", value))
                }
            }

            impl IntoValue for $ty {
                fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
                    Ok(Value::Int(self as i64))
                }
            }
        )*
    };
}

// Pulls accept numbers and numeric strings, truncating toward zero.
//
// Pushes store an i64. u64 and usize reinterpret the bits, so values above
// i64::MAX are seen by the runtime as negative integers, the same as any
// runtime integer with the top bit set. Pulling them back as u64/usize
// restores the original value.
impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

// ============================================================================
// Float implementations
// ============================================================================

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value, _cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
                    value
                        .to_number()
                        .map(|v| v as $ty)
                        .ok_or_else(|| mismatch("number", value))
                }
            }

            impl IntoValue for $ty {
                fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
                    Ok(Value::Float(self as f64))
                }
            }
        )*
    };
}

impl_float!(f32, f64);

// ============================================================================
// Boolean
// ============================================================================

impl FromValue for bool {
    fn from_value(value: &Value, _cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(v) => Ok(*v),
            _ => Err(mismatch("boolean", value)),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(self))
    }
}

// ============================================================================
// Strings
// ============================================================================

/// Numbers are accepted where a string is expected and formatted, the way
/// the runtime coerces them.
fn string_of(value: &Value) -> Result<Rc<str>, ConversionError> {
    match value {
        Value::String(s) => Ok(Rc::clone(s)),
        Value::Int(v) => Ok(Rc::from(v.to_string())),
        Value::Float(_) => Ok(Rc::from(lualite_core::state::display_raw(value))),
        _ => Err(mismatch("string", value)),
    }
}

impl FromValue for String {
    fn from_value(value: &Value, _cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        string_of(value).map(|s| s.to_string())
    }
}

impl FromValue for Rc<str> {
    fn from_value(value: &Value, _cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        string_of(value)
    }
}

impl IntoValue for String {
    fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        Ok(Value::from(self))
    }
}

impl IntoValue for Rc<str> {
    fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        Ok(Value::String(self))
    }
}

impl IntoValue for &str {
    fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        Ok(Value::from(self))
    }
}

// ============================================================================
// Unit, Option and raw values
// ============================================================================

impl IntoValue for () {
    fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        Ok(Value::Nil)
    }

    fn push_results(self, _cx: &mut Marshal<'_>, _results: &mut Vec<Value>) -> Result<(), NativeError> {
        Ok(())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other, cx).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        match self {
            Some(v) => v.into_value(cx),
            None => Ok(Value::Nil),
        }
    }
}

/// A fallible native function reports its error to the caller instead of
/// producing results.
impl<T: IntoValue> IntoValue for Result<T, NativeError> {
    fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        self?.into_value(cx)
    }

    fn push_results(self, cx: &mut Marshal<'_>, results: &mut Vec<Value>) -> Result<(), NativeError> {
        self?.push_results(cx, results)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value, _cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        Ok(self)
    }
}
