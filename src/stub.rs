//! Dispatch stubs.
//!
//! A stub is the runtime-callable entry point generated for one native
//! callable. It checks the argument count, pulls each argument through
//! [`FromValue`], calls the native code and pushes the result through
//! [`IntoValue`].
//!
//! Three shapes are generated, for arities 0 through 8:
//!
//! - [`IntoFunction`]: free functions and class statics, `Fn(A...) -> R`.
//!   Arguments start at position 1.
//! - [`IntoConstructor`]: `Fn(A...) -> T`. The new object is moved into the
//!   heap and returned as an owning wrapper instance.
//! - [`IntoMethod`]: `Fn(&mut T, A...) -> R`, `Fn(&T, A...) -> R` or
//!   `Fn(ObjectRef<T>, A...) -> R`. The receiver is bound when the wrapper
//!   instance is built; arguments start at the position the caller passes
//!   (2 for `obj:name(...)`, 3 for property accessors).
//!
//! `&mut T` and `&T` receivers also accept instances of classes derived
//! from `T`, reached through the registry's upcasts. `ObjectRef<T>`
//! receivers require the exact type.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use lualite_core::{CallFrame, NativeError, ObjectHandle, State, TypeHash, Value};

use crate::convert::{FromValue, IntoValue, Marshal, ObjectRef};
use crate::registry::{ClassRegistry, Upcast};
use crate::traits::NativeClass;
use crate::wrapper::{Ownership, build_wrapper};

/// Entry point for free functions and constructors.
pub type FunctionStub = Rc<dyn Fn(&mut CallFrame<'_>, &Rc<ClassRegistry>) -> Result<usize, NativeError>>;

/// Entry point for methods, metamethods and property accessors.
///
/// Receives the bound instance handle and the position of the first
/// argument after the implicit ones.
pub type MethodStub =
    Rc<dyn Fn(&mut CallFrame<'_>, &Rc<ClassRegistry>, ObjectHandle, usize) -> Result<usize, NativeError>>;

/// Build a [`FunctionStub`] from a closure.
pub fn function_stub<F>(f: F) -> FunctionStub
where
    F: Fn(&mut CallFrame<'_>, &Rc<ClassRegistry>) -> Result<usize, NativeError> + 'static,
{
    Rc::new(f)
}

/// Build a [`MethodStub`] from a closure.
pub fn method_stub<F>(f: F) -> MethodStub
where
    F: Fn(&mut CallFrame<'_>, &Rc<ClassRegistry>, ObjectHandle, usize) -> Result<usize, NativeError> + 'static,
{
    Rc::new(f)
}

/// Fail unless the frame holds exactly `expected` arguments.
pub fn check_arg_count(frame: &CallFrame<'_>, expected: usize) -> Result<(), NativeError> {
    let actual = frame.arg_count();
    if actual == expected {
        Ok(())
    } else {
        Err(NativeError::ArgumentCount { expected, actual })
    }
}

fn pull<A: FromValue>(args: &[Value], position: usize, cx: &mut Marshal<'_>) -> Result<A, NativeError> {
    let result = match args.get(position - 1) {
        Some(value) => A::from_value(value, cx),
        None => A::from_value(&Value::Nil, cx),
    };
    result.map_err(|source| NativeError::argument(position, source))
}

/// Push a native result onto the frame and return how many values it became.
pub(crate) fn push_results<R: IntoValue>(
    frame: &mut CallFrame<'_>,
    classes: &Rc<ClassRegistry>,
    result: R,
) -> Result<usize, NativeError> {
    let mut results = Vec::new();
    {
        let mut cx = Marshal::new(frame.state(), classes);
        result.push_results(&mut cx, &mut results)?;
    }
    let count = results.len();
    for value in results {
        frame.push(value);
    }
    Ok(count)
}

fn resolve_receiver<T: NativeClass>(state: &State, handle: ObjectHandle) -> Result<ObjectRef<T>, NativeError> {
    ObjectRef::resolve(state, handle)
        .map_err(|err| NativeError::invalid_this(format!("{}: {}", T::NAME, err)))
}

/// A borrowed-by-reference receiver, either the exact class or a derived
/// one seen through an upcast.
enum Receiver<T> {
    Exact(ObjectRef<T>),
    Derived { object: Rc<RefCell<dyn Any>>, upcast: Upcast },
}

impl<T: NativeClass> Receiver<T> {
    fn resolve(state: &State, classes: &ClassRegistry, handle: ObjectHandle) -> Result<Self, NativeError> {
        if handle.is::<T>() {
            return resolve_receiver::<T>(state, handle).map(Receiver::Exact);
        }
        let upcast = classes
            .upcast_for(handle, TypeHash::of::<T>())
            .ok_or_else(|| NativeError::invalid_this(format!("object is not a {}", T::NAME)))?;
        let object = state
            .heap()
            .get_erased(handle)
            .ok_or_else(|| NativeError::invalid_this(format!("{}: stale handle {}", T::NAME, handle)))?;
        Ok(Receiver::Derived {
            object,
            upcast: upcast.clone(),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, NativeError> {
        match self {
            Receiver::Exact(this) => {
                let object = this.try_borrow()?;
                Ok(f(&*object))
            }
            Receiver::Derived { object, upcast } => {
                let object = object
                    .try_borrow()
                    .map_err(|_| NativeError::invalid_this(format!("{} is mutably borrowed", T::NAME)))?;
                let base = upcast
                    .apply(&*object)
                    .and_then(|base| base.downcast_ref::<T>())
                    .ok_or_else(|| NativeError::invalid_this(format!("object is not a {}", T::NAME)))?;
                Ok(f(base))
            }
        }
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, NativeError> {
        match self {
            Receiver::Exact(this) => {
                let mut object = this.try_borrow_mut()?;
                Ok(f(&mut *object))
            }
            Receiver::Derived { object, upcast } => {
                let mut object = object
                    .try_borrow_mut()
                    .map_err(|_| NativeError::invalid_this(format!("{} is already borrowed", T::NAME)))?;
                let base = upcast
                    .apply_mut(&mut *object)
                    .and_then(|base| base.downcast_mut::<T>())
                    .ok_or_else(|| NativeError::invalid_this(format!("object is not a {}", T::NAME)))?;
                Ok(f(base))
            }
        }
    }
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

// ============================================================================
// Free functions
// ============================================================================

/// Conversion of a native callable into a [`FunctionStub`].
///
/// The marker type parameter is the callable's signature; it lets one trait
/// cover every arity without overlapping impls.
pub trait IntoFunction<Marker>: 'static {
    /// Generate the stub.
    fn into_function_stub(self) -> FunctionStub;
}

/// Raw functions receive the frame directly and bypass marshalling.
pub fn raw_function<F>(f: F) -> FunctionStub
where
    F: Fn(&mut CallFrame<'_>) -> Result<usize, NativeError> + 'static,
{
    function_stub(move |frame, _classes| f(frame))
}

macro_rules! impl_into_function {
    ($($A:ident $index:tt),*) => {
        impl<F, R, $($A,)*> IntoFunction<fn($($A,)*) -> R> for F
        where
            F: Fn($($A),*) -> R + 'static,
            R: IntoValue + 'static,
            $($A: FromValue + 'static,)*
        {
            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn into_function_stub(self) -> FunctionStub {
                let f = self;
                function_stub(move |frame, classes| {
                    check_arg_count(frame, count!($($A)*))?;
                    let result = {
                        let (args, state) = frame.split();
                        let mut cx = Marshal::new(state, classes);
                        $(let $A: $A = pull(args, $index + 1, &mut cx)?;)*
                        f($($A),*)
                    };
                    push_results(frame, classes, result)
                })
            }
        }
    };
}

impl_into_function!();
impl_into_function!(A1 0);
impl_into_function!(A1 0, A2 1);
impl_into_function!(A1 0, A2 1, A3 2);
impl_into_function!(A1 0, A2 1, A3 2, A4 3);
impl_into_function!(A1 0, A2 1, A3 2, A4 3, A5 4);
impl_into_function!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5);
impl_into_function!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6);
impl_into_function!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6, A8 7);

// ============================================================================
// Constructors
// ============================================================================

/// Conversion of a native constructor into a [`FunctionStub`].
pub trait IntoConstructor<T, Marker>: 'static {
    /// Generate the stub.
    fn into_constructor_stub(self) -> FunctionStub;
}

macro_rules! impl_into_constructor {
    ($($A:ident $index:tt),*) => {
        impl<F, T, $($A,)*> IntoConstructor<T, fn($($A,)*)> for F
        where
            F: Fn($($A),*) -> T + 'static,
            T: NativeClass,
            $($A: FromValue + 'static,)*
        {
            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn into_constructor_stub(self) -> FunctionStub {
                let f = self;
                function_stub(move |frame, classes| {
                    check_arg_count(frame, count!($($A)*))?;
                    let instance = {
                        let (args, state) = frame.split();
                        let mut cx = Marshal::new(state, classes);
                        $(let $A: $A = pull(args, $index + 1, &mut cx)?;)*
                        let handle = cx.state().heap_mut().allocate(f($($A),*));
                        build_wrapper::<T>(cx.state(), classes, handle, Ownership::Owned)?
                    };
                    frame.push(instance);
                    Ok(1)
                })
            }
        }
    };
}

impl_into_constructor!();
impl_into_constructor!(A1 0);
impl_into_constructor!(A1 0, A2 1);
impl_into_constructor!(A1 0, A2 1, A3 2);
impl_into_constructor!(A1 0, A2 1, A3 2, A4 3);
impl_into_constructor!(A1 0, A2 1, A3 2, A4 3, A5 4);
impl_into_constructor!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5);
impl_into_constructor!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6);
impl_into_constructor!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6, A8 7);

// ============================================================================
// Methods
// ============================================================================

/// Receiver markers for [`IntoMethod`].
pub mod receiver {
    /// `Fn(&mut T, ...)`
    pub struct Exclusive;
    /// `Fn(&T, ...)`
    pub struct Shared;
    /// `Fn(ObjectRef<T>, ...)`
    pub struct Handle;
}

/// Conversion of a native method into a [`MethodStub`].
pub trait IntoMethod<T, Marker>: 'static {
    /// Generate the stub.
    fn into_method_stub(self) -> MethodStub;
}

/// Raw methods receive the frame and the bound instance handle.
pub fn raw_method<F>(f: F) -> MethodStub
where
    F: Fn(&mut CallFrame<'_>, ObjectHandle) -> Result<usize, NativeError> + 'static,
{
    method_stub(move |frame, _classes, handle, _first| f(frame, handle))
}

macro_rules! impl_into_method {
    ($($A:ident $index:tt),*) => {
        impl<F, T, R, $($A,)*> IntoMethod<T, (receiver::Exclusive, fn($($A,)*) -> R)> for F
        where
            F: Fn(&mut T, $($A),*) -> R + 'static,
            T: NativeClass,
            R: IntoValue + 'static,
            $($A: FromValue + 'static,)*
        {
            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn into_method_stub(self) -> MethodStub {
                let f = self;
                method_stub(move |frame, classes, handle, first| {
                    check_arg_count(frame, count!($($A)*) + first - 1)?;
                    let result = {
                        let (args, state) = frame.split();
                        let this = Receiver::<T>::resolve(state, classes, handle)?;
                        let mut cx = Marshal::new(state, classes);
                        $(let $A: $A = pull(args, first + $index, &mut cx)?;)*
                        this.with_mut(|object| f(object, $($A),*))?
                    };
                    push_results(frame, classes, result)
                })
            }
        }

        impl<F, T, R, $($A,)*> IntoMethod<T, (receiver::Shared, fn($($A,)*) -> R)> for F
        where
            F: Fn(&T, $($A),*) -> R + 'static,
            T: NativeClass,
            R: IntoValue + 'static,
            $($A: FromValue + 'static,)*
        {
            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn into_method_stub(self) -> MethodStub {
                let f = self;
                method_stub(move |frame, classes, handle, first| {
                    check_arg_count(frame, count!($($A)*) + first - 1)?;
                    let result = {
                        let (args, state) = frame.split();
                        let this = Receiver::<T>::resolve(state, classes, handle)?;
                        let mut cx = Marshal::new(state, classes);
                        $(let $A: $A = pull(args, first + $index, &mut cx)?;)*
                        this.with(|object| f(object, $($A),*))?
                    };
                    push_results(frame, classes, result)
                })
            }
        }

        impl<F, T, R, $($A,)*> IntoMethod<T, (receiver::Handle, fn($($A,)*) -> R)> for F
        where
            F: Fn(ObjectRef<T>, $($A),*) -> R + 'static,
            T: NativeClass,
            R: IntoValue + 'static,
            $($A: FromValue + 'static,)*
        {
            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn into_method_stub(self) -> MethodStub {
                let f = self;
                method_stub(move |frame, classes, handle, first| {
                    check_arg_count(frame, count!($($A)*) + first - 1)?;
                    let result = {
                        let (args, state) = frame.split();
                        let this = resolve_receiver::<T>(state, handle)?;
                        let mut cx = Marshal::new(state, classes);
                        $(let $A: $A = pull(args, first + $index, &mut cx)?;)*
                        f(this, $($A),*)
                    };
                    push_results(frame, classes, result)
                })
            }
        }
    };
}

impl_into_method!();
impl_into_method!(A1 0);
impl_into_method!(A1 0, A2 1);
impl_into_method!(A1 0, A2 1, A3 2);
impl_into_method!(A1 0, A2 1, A3 2, A4 3);
impl_into_method!(A1 0, A2 1, A3 2, A4 3, A5 4);
impl_into_method!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5);
impl_into_method!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6);
impl_into_method!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5, A7 6, A8 7);

#[cfg(test)]
mod tests {
    use super::*;
    use lualite_core::ConversionError;

    struct Counter {
        value: i64,
    }

    impl NativeClass for Counter {
        const NAME: &'static str = "Counter";
    }

    impl Counter {
        fn increment(&mut self) {
            self.value += 1;
        }

        fn value(&self) -> i64 {
            self.value
        }

        fn add(&mut self, amount: i64) -> i64 {
            self.value += amount;
            self.value
        }
    }

    fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    fn call_function(stub: &FunctionStub, args: Vec<Value>) -> Result<Vec<Value>, NativeError> {
        let mut state = State::new();
        let classes = Rc::new(ClassRegistry::new());
        let mut frame = CallFrame::new(&mut state, args);
        let count = stub(&mut frame, &classes)?;
        Ok(frame.into_results(count))
    }

    #[test]
    fn function_stub_adds() {
        let stub = add.into_function_stub();
        let results = call_function(&stub, vec![Value::Int(3), Value::Int(4)]).unwrap();
        assert_eq!(results, vec![Value::Int(7)]);
    }

    #[test]
    fn void_function_pushes_nothing() {
        let stub = (|_: i32| {}).into_function_stub();
        let results = call_function(&stub, vec![Value::Int(1)]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn zero_arity_function() {
        let stub = (|| "hello").into_function_stub();
        let results = call_function(&stub, Vec::new()).unwrap();
        assert_eq!(results, vec![Value::from("hello")]);
    }

    #[test]
    fn argument_count_is_exact() {
        let stub = add.into_function_stub();
        let err = call_function(&stub, vec![Value::Int(3)]).unwrap_err();
        assert_eq!(
            err,
            NativeError::ArgumentCount {
                expected: 2,
                actual: 1
            }
        );
        let err = call_function(&stub, vec![Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap_err();
        assert!(matches!(err, NativeError::ArgumentCount { expected: 2, actual: 3 }));
    }

    #[test]
    fn argument_shape_reports_position() {
        let stub = add.into_function_stub();
        let err = call_function(&stub, vec![Value::Int(3), Value::from("x")]).unwrap_err();
        assert!(matches!(
            err,
            NativeError::Argument {
                position: 2,
                source: ConversionError::TypeMismatch { .. }
            }
        ));
    }

    #[test]
    fn raw_function_sees_frame() {
        let stub = raw_function(|frame| {
            let n = frame.arg_count() as i64;
            frame.push(n);
            Ok(1)
        });
        let results = call_function(&stub, vec![Value::Nil, Value::Nil]).unwrap();
        assert_eq!(results, vec![Value::Int(2)]);
    }

    fn call_method(
        stub: &MethodStub,
        state: &mut State,
        handle: ObjectHandle,
        first: usize,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, NativeError> {
        let classes = Rc::new(ClassRegistry::new());
        let mut frame = CallFrame::new(state, args);
        let count = stub(&mut frame, &classes, handle, first)?;
        Ok(frame.into_results(count))
    }

    #[test]
    fn exclusive_method_mutates_receiver() {
        let mut state = State::new();
        let handle = state.heap_mut().allocate(Counter { value: 5 });
        let stub = IntoMethod::<Counter, _>::into_method_stub(Counter::increment);
        call_method(&stub, &mut state, handle, 2, vec![Value::Nil]).unwrap();
        let object = state.heap().get::<Counter>(handle).unwrap();
        assert_eq!(object.borrow().value, 6);
    }

    #[test]
    fn method_expected_count_includes_self_slot() {
        let mut state = State::new();
        let handle = state.heap_mut().allocate(Counter { value: 1 });
        let stub = IntoMethod::<Counter, _>::into_method_stub(Counter::add);
        let results = call_method(&stub, &mut state, handle, 2, vec![Value::Nil, Value::Int(4)]).unwrap();
        assert_eq!(results, vec![Value::Int(5)]);
        let err = call_method(&stub, &mut state, handle, 2, vec![Value::Int(4)]).unwrap_err();
        assert!(matches!(err, NativeError::ArgumentCount { expected: 2, actual: 1 }));
    }

    #[test]
    fn accessor_positions_start_at_three() {
        let mut state = State::new();
        let handle = state.heap_mut().allocate(Counter { value: 9 });
        let getter = IntoMethod::<Counter, _>::into_method_stub(Counter::value);
        let results = call_method(
            &getter,
            &mut state,
            handle,
            3,
            vec![Value::Nil, Value::from("value")],
        )
        .unwrap();
        assert_eq!(results, vec![Value::Int(9)]);

        let setter = IntoMethod::<Counter, _>::into_method_stub(|c: &mut Counter, v: i64| c.value = v);
        call_method(
            &setter,
            &mut state,
            handle,
            3,
            vec![Value::Nil, Value::from("value"), Value::Int(42)],
        )
        .unwrap();
        assert_eq!(state.heap().get::<Counter>(handle).unwrap().borrow().value, 42);
    }

    #[test]
    fn released_receiver_is_invalid_this() {
        let mut state = State::new();
        let handle = state.heap_mut().allocate(Counter { value: 0 });
        state.heap_mut().free(handle);
        let stub = IntoMethod::<Counter, _>::into_method_stub(Counter::value);
        let err = call_method(&stub, &mut state, handle, 2, vec![Value::Nil]).unwrap_err();
        assert!(matches!(err, NativeError::InvalidThis { .. }));
    }
}
