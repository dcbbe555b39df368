//! Handles and class instances.

use std::any::{Any, type_name};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use lualite_core::{ConversionError, NativeError, ObjectHandle, State, Value};

use super::{FromValue, IntoValue, Marshal, mismatch};
use crate::names::INSTANCE_KEY;
use crate::traits::NativeClass;
use crate::wrapper::{Ownership, build_wrapper};

fn lookup<T: Any>(state: &State, handle: ObjectHandle) -> Result<Rc<RefCell<T>>, ConversionError> {
    if !handle.is::<T>() {
        return Err(ConversionError::HandleTypeMismatch {
            expected: type_name::<T>(),
        });
    }
    state
        .heap()
        .get::<T>(handle)
        .ok_or(ConversionError::StaleHandle {
            index: handle.index,
        })
}

// ============================================================================
// Opaque handles
// ============================================================================

/// A typed opaque handle to a native object that is not a registered class.
///
/// Crosses the boundary as a bare handle value. The runtime cannot index it;
/// it can only hand it back to native code.
pub struct Opaque<T> {
    handle: ObjectHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> Opaque<T> {
    /// Move a value into the runtime's heap and return its handle.
    ///
    /// The runtime does not release opaque objects; call [`Opaque::release`]
    /// when native code is done with it.
    pub fn allocate(state: &mut State, value: T) -> Self {
        Self {
            handle: state.heap_mut().allocate(value),
            _marker: PhantomData,
        }
    }

    /// Wrap an existing handle, checking its type.
    pub fn from_handle(handle: ObjectHandle) -> Result<Self, ConversionError> {
        if handle.is::<T>() {
            Ok(Self {
                handle,
                _marker: PhantomData,
            })
        } else {
            Err(ConversionError::HandleTypeMismatch {
                expected: type_name::<T>(),
            })
        }
    }

    /// The underlying handle.
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Read the object through the handle.
    pub fn get(&self, state: &State) -> Result<Rc<RefCell<T>>, ConversionError> {
        lookup::<T>(state, self.handle)
    }

    /// Free the object. Returns false if it was already released.
    pub fn release(self, state: &mut State) -> bool {
        state.heap_mut().free(self.handle)
    }
}

impl<T> Clone for Opaque<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Opaque<T> {}

impl<T> fmt::Debug for Opaque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.handle).finish()
    }
}

impl<T: Any> FromValue for Opaque<T> {
    fn from_value(value: &Value, _cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        match value {
            Value::Handle(handle) => Opaque::from_handle(*handle),
            _ => Err(mismatch("userdata", value)),
        }
    }
}

impl<T: Any> IntoValue for Opaque<T> {
    fn into_value(self, _cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        Ok(Value::Handle(self.handle))
    }
}

/// A value read through an opaque handle.
///
/// Pulling a `ByHandle<T>` dereferences the handle and clones the object, so
/// the native callee receives the referenced value itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ByHandle<T>(pub T);

impl<T> ByHandle<T> {
    /// Unwrap the value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for ByHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Any + Clone> FromValue for ByHandle<T> {
    fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        let Value::Handle(handle) = value else {
            return Err(mismatch("userdata", value));
        };
        let object = lookup::<T>(cx.state(), *handle)?;
        let inner = object.try_borrow().map_err(|_| ConversionError::Failed {
            message: format!("{} is mutably borrowed", type_name::<T>()),
        })?;
        Ok(ByHandle(inner.clone()))
    }
}

// ============================================================================
// Class instances
// ============================================================================

/// A reference to an instance of a registered class.
///
/// As an argument it resolves the `__instance` handle of a wrapper table.
/// As a result it builds a new, non-owning wrapper around the same object:
/// the wrapper never releases it.
pub struct ObjectRef<T> {
    handle: ObjectHandle,
    object: Rc<RefCell<T>>,
}

impl<T: NativeClass> ObjectRef<T> {
    pub(crate) fn resolve(state: &State, handle: ObjectHandle) -> Result<Self, ConversionError> {
        let object = lookup::<T>(state, handle)?;
        Ok(Self { handle, object })
    }

    /// The object's handle.
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Borrow the object.
    ///
    /// Fails with `InvalidThis` while the object is mutably borrowed, as it
    /// is when it is also the receiver of the running `&mut` method.
    pub fn try_borrow(&self) -> Result<Ref<'_, T>, NativeError> {
        self.object
            .try_borrow()
            .map_err(|_| NativeError::invalid_this(format!("{} is mutably borrowed", T::NAME)))
    }

    /// Borrow the object mutably. Fails with `InvalidThis` while the object
    /// is borrowed elsewhere.
    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, NativeError> {
        self.object
            .try_borrow_mut()
            .map_err(|_| NativeError::invalid_this(format!("{} is already borrowed", T::NAME)))
    }

    /// Check whether two references point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef<T>) -> bool {
        self.handle == other.handle
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            object: Rc::clone(&self.object),
        }
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.handle).finish()
    }
}

impl<T: NativeClass> FromValue for ObjectRef<T> {
    fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
        let Value::Table(table) = value else {
            return Err(mismatch(T::NAME, value));
        };
        match table.get_str(INSTANCE_KEY) {
            Value::Handle(handle) => ObjectRef::resolve(cx.state(), handle),
            Value::Nil => Err(ConversionError::MissingField { field: INSTANCE_KEY }),
            other => Err(mismatch("userdata", &other)),
        }
    }
}

impl<T: NativeClass> IntoValue for ObjectRef<T> {
    fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        let classes = Rc::clone(cx.classes());
        let table = build_wrapper::<T>(cx.state(), &classes, self.handle, Ownership::Borrowed)?;
        Ok(Value::Table(table))
    }
}

/// An owned instance: moved into the heap and wrapped by an owning wrapper.
impl<T: NativeClass> IntoValue for Box<T> {
    fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
        let classes = Rc::clone(cx.classes());
        let handle = cx.state().heap_mut().allocate(*self);
        match build_wrapper::<T>(cx.state(), &classes, handle, Ownership::Owned) {
            Ok(table) => Ok(Value::Table(table)),
            Err(err) => {
                cx.state().heap_mut().free(handle);
                Err(err)
            }
        }
    }
}
