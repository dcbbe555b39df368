//! Wrapper instances: the runtime-side face of one native object.
//!
//! A wrapper is a table holding the object's handle under `__instance` and
//! one bound closure per visible method, plus a metatable with the class's
//! metamethods and the default property accessors.
//!
//! Population order fixes the override rules:
//!
//! 1. `__instance`
//! 2. inherited methods in declaration order, then own methods (later wins)
//! 3. inherited metamethods except `__gc`, then own metamethods
//! 4. default `__index`/`__newindex` unless the class declared its own
//! 5. default `__gc` that releases the object, only for owning wrappers of
//!    classes without their own finalizer
//!
//! Borrowed wrappers never finalize: they skip the class's own `__gc` and
//! get no default.

use std::rc::Rc;

use log::trace;
use lualite_core::{NativeError, NativeFunction, ObjectHandle, State, TableRef, TypeHash, Value};

use crate::names::{GC, INDEX, INSTANCE_KEY, METHOD_FIRST_ARG, NEWINDEX, PROPERTY_FIRST_ARG};
use crate::registry::{ClassDescriptor, ClassFlags, ClassRegistry, MemberEntry};
use crate::stub::{MethodStub, check_arg_count};
use crate::traits::NativeClass;

/// Whether a wrapper owns the native object it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Created by a constructor or a `Box<T>` result; released on collection
    Owned,
    /// Created for an `ObjectRef<T>` result; never released by the wrapper
    Borrowed,
}

/// Build a wrapper instance for an object of class `T`.
pub fn build_wrapper<T: NativeClass>(
    state: &mut State,
    classes: &Rc<ClassRegistry>,
    handle: ObjectHandle,
    ownership: Ownership,
) -> Result<TableRef, NativeError> {
    let class = TypeHash::of::<T>();
    let descriptor = classes
        .get(class)
        .ok_or(NativeError::UnregisteredClass { name: T::NAME })?;
    Ok(populate(state, classes, descriptor, class, handle, ownership))
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn populate(
    state: &mut State,
    classes: &Rc<ClassRegistry>,
    descriptor: &ClassDescriptor,
    class: TypeHash,
    handle: ObjectHandle,
    ownership: Ownership,
) -> TableRef {
    let instance = state.create_table();
    instance.set_str(INSTANCE_KEY, handle);

    for list in &descriptor.inherited_methods {
        bind_members(&instance, classes, handle, &list.borrow(), |_| true);
    }
    bind_members(&instance, classes, handle, &descriptor.methods.borrow(), |_| true);

    let meta = state.create_table();
    for list in &descriptor.inherited_metamethods {
        bind_members(&meta, classes, handle, &list.borrow(), |name| name != GC);
    }
    bind_members(&meta, classes, handle, &descriptor.metamethods.borrow(), |name| {
        name != GC || ownership == Ownership::Owned
    });

    if !descriptor.flags.contains(ClassFlags::HAS_INDEX) {
        meta.set_str(INDEX, default_getter(classes, class, handle));
    }
    if !descriptor.flags.contains(ClassFlags::HAS_NEWINDEX) {
        meta.set_str(NEWINDEX, default_setter(classes, class, handle));
    }
    if ownership == Ownership::Owned && !descriptor.flags.contains(ClassFlags::HAS_GC) {
        meta.set_str(GC, default_finalizer(descriptor.name, handle));
    }

    state.set_metatable(&instance, Some(meta));
    trace!("built {:?} wrapper for {} ({})", ownership, descriptor.name, handle);
    instance
}

fn bind_members(
    table: &TableRef,
    classes: &Rc<ClassRegistry>,
    handle: ObjectHandle,
    members: &[MemberEntry],
    include: impl Fn(&str) -> bool,
) {
    for member in members.iter().filter(|m| include(&m.name)) {
        let function = bind(Rc::clone(&member.stub), Rc::clone(classes), handle, METHOD_FIRST_ARG);
        table.set_str(&member.name, function);
    }
}

/// Bind a method stub to one instance.
fn bind(stub: MethodStub, classes: Rc<ClassRegistry>, handle: ObjectHandle, first: usize) -> NativeFunction {
    NativeFunction::new(move |frame| stub(frame, &classes, handle, first))
}

/// Property names: strings as-is, numbers formatted, anything else has no
/// accessor.
fn property_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.to_string()),
        Value::Int(_) | Value::Float(_) => Some(lualite_core::state::display_raw(key)),
        _ => None,
    }
}

fn default_getter(classes: &Rc<ClassRegistry>, class: TypeHash, handle: ObjectHandle) -> NativeFunction {
    let classes = Rc::clone(classes);
    NativeFunction::new(move |frame| {
        check_arg_count(frame, 2)?;
        let getter = property_name(&frame.arg(2))
            .and_then(|name| classes.get(class)?.getters.get(&name).cloned());
        match getter {
            Some(stub) => stub(frame, &classes, handle, PROPERTY_FIRST_ARG),
            None => Ok(0),
        }
    })
}

fn default_setter(classes: &Rc<ClassRegistry>, class: TypeHash, handle: ObjectHandle) -> NativeFunction {
    let classes = Rc::clone(classes);
    NativeFunction::new(move |frame| {
        check_arg_count(frame, 3)?;
        let setter = property_name(&frame.arg(2))
            .and_then(|name| classes.get(class)?.setters.get(&name).cloned());
        match setter {
            Some(stub) => stub(frame, &classes, handle, PROPERTY_FIRST_ARG),
            None => Ok(0),
        }
    })
}

fn default_finalizer(name: &'static str, handle: ObjectHandle) -> NativeFunction {
    NativeFunction::new(move |frame| {
        if frame.state().heap_mut().free(handle) {
            trace!("released {} ({})", name, handle);
        }
        Ok(0)
    })
}
