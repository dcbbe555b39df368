//! Runtime values.

use std::fmt;
use std::rc::Rc;

use ordered_float::OrderedFloat;

use crate::error::NativeError;
use crate::function::NativeFunction;
use crate::heap::ObjectHandle;
use crate::table::TableRef;

/// A dynamically typed runtime value.
///
/// Scalars are stored inline; strings, tables and functions are reference
/// counted so cloning a `Value` never copies their contents.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Integer number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Immutable string
    String(Rc<str>),
    /// Opaque handle to a native object
    Handle(ObjectHandle),
    /// Table (identity semantics)
    Table(TableRef),
    /// Native function (identity semantics)
    Function(NativeFunction),
}

impl Value {
    /// The runtime type name, as reported in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Handle(_) => "userdata",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    /// Check if this is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `nil` and `false` is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Read as a number, widening integers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Read as an integer, truncating floats toward zero.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) => Some(v.trunc() as i64),
            _ => None,
        }
    }

    /// Coerce to a number: numbers as-is, strings holding a decimal numeral
    /// once surrounding whitespace is trimmed.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::String(s) => parse_numeral(s),
            _ => self.as_number(),
        }
    }

    /// Coerce to an integer like [`Value::to_number`], truncating toward zero.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| parse_numeral(s).map(|v| v.trunc() as i64))
            }
            _ => self.as_integer(),
        }
    }

    /// Borrow the string contents.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the table, if this is one.
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Get the function, if this is one.
    pub fn as_function(&self) -> Option<&NativeFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Get the object handle, if this is one.
    pub fn as_handle(&self) -> Option<ObjectHandle> {
        match self {
            Value::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Create a string value.
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }
}

/// Raw equality: numbers compare by value, tables and functions by identity.
/// Decimal numerals only; spellings such as `inf` or `nan` are not numbers.
fn parse_numeral(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b)) {
        return None;
    }
    s.parse().ok()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::Int(v) => write!(f, "Int({})", v),
            Value::Float(v) => write!(f, "Float({})", v),
            Value::String(v) => write!(f, "String({:?})", v),
            Value::Handle(h) => write!(f, "Handle({})", h),
            Value::Table(t) => write!(f, "Table({:p})", t.as_ptr()),
            Value::Function(func) => write!(f, "Function({:p})", func.as_ptr()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Rc::from(v))
    }
}

impl From<TableRef> for Value {
    fn from(v: TableRef) -> Self {
        Value::Table(v)
    }
}

impl From<NativeFunction> for Value {
    fn from(v: NativeFunction) -> Self {
        Value::Function(v)
    }
}

impl From<ObjectHandle> for Value {
    fn from(v: ObjectHandle) -> Self {
        Value::Handle(v)
    }
}

// ============================================================================
// Table keys
// ============================================================================

/// A normalized, hashable table key.
///
/// Floats with an integral value are stored as `Int` so that `t[1]` and
/// `t[1.0]` address the same slot. `nil` and NaN cannot be keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TableKey {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(Rc<str>),
    Handle(ObjectHandle),
    Table(TableRef),
    Function(NativeFunction),
}

impl TableKey {
    /// Normalize a value into a key.
    pub fn from_value(value: &Value) -> Result<Self, NativeError> {
        Ok(match value {
            Value::Nil => return Err(NativeError::InvalidKey { type_name: "nil" }),
            Value::Bool(v) => TableKey::Bool(*v),
            Value::Int(v) => TableKey::Int(*v),
            Value::Float(v) if v.is_nan() => {
                return Err(NativeError::InvalidKey { type_name: "NaN" });
            }
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 9.2e18 => TableKey::Int(*v as i64),
            Value::Float(v) => TableKey::Float(OrderedFloat(*v)),
            Value::String(s) => TableKey::String(Rc::clone(s)),
            Value::Handle(h) => TableKey::Handle(*h),
            Value::Table(t) => TableKey::Table(t.clone()),
            Value::Function(f) => TableKey::Function(f.clone()),
        })
    }

    /// Convert back into a value.
    pub fn to_value(&self) -> Value {
        match self {
            TableKey::Bool(v) => Value::Bool(*v),
            TableKey::Int(v) => Value::Int(*v),
            TableKey::Float(v) => Value::Float(v.0),
            TableKey::String(s) => Value::String(Rc::clone(s)),
            TableKey::Handle(h) => Value::Handle(*h),
            TableKey::Table(t) => Value::Table(t.clone()),
            TableKey::Function(f) => Value::Function(f.clone()),
        }
    }
}

impl From<&str> for TableKey {
    fn from(v: &str) -> Self {
        TableKey::String(Rc::from(v))
    }
}

impl From<i64> for TableKey {
    fn from(v: i64) -> Self {
        TableKey::Int(v)
    }
}
