//! ClassBuilder for registering native classes.
//!
//! ClassBuilder provides a fluent API for declaring a native Rust type's
//! constructors, methods, metamethods, properties and bases. Every call is
//! applied to the module right away; there is no final `build` step.
//!
//! # Example
//!
//! ```
//! use lualite::{Module, NativeClass};
//!
//! struct Counter {
//!     value: i64,
//! }
//!
//! impl NativeClass for Counter {
//!     const NAME: &'static str = "Counter";
//! }
//!
//! impl Counter {
//!     fn new(start: i64) -> Self {
//!         Counter { value: start }
//!     }
//!
//!     fn increment(&mut self) {
//!         self.value += 1;
//!     }
//! }
//!
//! let mut module = Module::new();
//! module
//!     .class::<Counter>("Counter")
//!     .constructor(Counter::new)
//!     .method("increment", Counter::increment)
//!     .getter("value", |c: &Counter| c.value);
//! ```

use std::marker::PhantomData;

use log::debug;
use lualite_core::{CallFrame, NativeError, ObjectHandle, TypeHash};
use petgraph::graph::NodeIndex;

use crate::module::Module;
use crate::names::DEFAULT_CONSTRUCTOR;
use crate::registry::{ClassDescriptor, Upcast};
use crate::stub::{IntoConstructor, IntoFunction, IntoMethod, raw_function, raw_method};
use crate::traits::NativeClass;

/// Builder for one native class.
///
/// Created by calling `Module::class::<T>(name)` or
/// `ScopeBuilder::class::<T>(name)`.
///
/// # Type Parameters
///
/// - `'m`: Lifetime of the mutable borrow of the Module
/// - `T`: The Rust type being registered (must implement `NativeClass`)
pub struct ClassBuilder<'m, T: NativeClass> {
    module: &'m mut Module,
    /// The class table's node in the scope tree
    node: NodeIndex,
    /// Exposed class name
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<'m, T: NativeClass> ClassBuilder<'m, T> {
    pub(crate) fn new(module: &'m mut Module, parent: NodeIndex, name: &str) -> Self {
        module.classes.get_or_create::<T>();
        let node = module.tree.add_class(parent, name, TypeHash::of::<T>());
        debug!("class {} exposed as {}", T::NAME, module.tree.qualified_name(node));
        Self {
            module,
            node,
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    /// The exposed class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class descriptor as declared so far.
    pub fn descriptor(&self) -> Option<&ClassDescriptor> {
        self.module.classes.descriptor::<T>()
    }

    fn class(&mut self) -> &mut ClassDescriptor {
        self.module.classes.get_or_create::<T>()
    }

    // === Constructors ===

    /// Register a constructor under the default name, `new`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// module.class::<Vec2>("Vec2")
    ///     .constructor(|| Vec2::default())
    ///     .named_constructor("from_xy", |x: f64, y: f64| Vec2 { x, y });
    /// ```
    pub fn constructor<M>(self, f: impl IntoConstructor<T, M>) -> Self {
        self.named_constructor(DEFAULT_CONSTRUCTOR, f)
    }

    /// Register a constructor under a chosen name.
    pub fn named_constructor<M>(mut self, name: &str, f: impl IntoConstructor<T, M>) -> Self {
        self.class().add_constructor(name, f.into_constructor_stub());
        self
    }

    // === Class table members ===

    /// Bind a static function on the class table.
    pub fn function<M>(self, name: &str, f: impl IntoFunction<M>) -> Self {
        self.module.add_function(self.node, name, f.into_function_stub());
        self
    }

    /// Bind a static function that works on the call frame directly.
    pub fn function_raw<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<usize, NativeError> + 'static,
    {
        self.module.add_function(self.node, name, raw_function(f));
        self
    }

    /// Bind an integer constant on the class table.
    pub fn enum_value(self, name: &str, value: i64) -> Self {
        self.module.add_enum(self.node, name, value);
        self
    }

    // === Instance members ===

    /// Register an instance method.
    ///
    /// The receiver may be `&mut T`, `&T` or `ObjectRef<T>`. Script code
    /// calls it as `obj:name(...)`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// module.class::<Vec2>("Vec2")
    ///     .method("length", |v: &Vec2| v.length())
    ///     .method("scale", |v: &mut Vec2, by: f64| v.scale(by));
    /// ```
    pub fn method<M>(mut self, name: &str, f: impl IntoMethod<T, M>) -> Self {
        self.class().add_method(name, f.into_method_stub());
        self
    }

    /// Register a method that works on the call frame and the bound handle.
    pub fn method_raw<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>, ObjectHandle) -> Result<usize, NativeError> + 'static,
    {
        self.class().add_method(name, raw_method(f));
        self
    }

    /// Register a metamethod.
    ///
    /// `__gc`, `__index` and `__newindex` replace the defaults. A custom
    /// `__gc` takes over releasing the object entirely.
    pub fn metamethod<M>(mut self, name: &str, f: impl IntoMethod<T, M>) -> Self {
        self.class().add_metamethod(name, f.into_method_stub());
        self
    }

    /// Register a metamethod that works on the call frame and the bound
    /// handle.
    pub fn metamethod_raw<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>, ObjectHandle) -> Result<usize, NativeError> + 'static,
    {
        self.class().add_metamethod(name, raw_method(f));
        self
    }

    // === Properties ===

    /// Register a property getter, read as `obj.name`.
    pub fn getter<M>(mut self, name: &str, f: impl IntoMethod<T, M>) -> Self {
        self.class().add_getter(name, f.into_method_stub());
        self
    }

    /// Register a property setter, written as `obj.name = value`.
    pub fn setter<M>(mut self, name: &str, f: impl IntoMethod<T, M>) -> Self {
        self.class().add_setter(name, f.into_method_stub());
        self
    }

    /// Register a getter that works on the call frame and the bound handle.
    pub fn getter_raw<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>, ObjectHandle) -> Result<usize, NativeError> + 'static,
    {
        self.class().add_getter(name, raw_method(f));
        self
    }

    /// Register a setter that works on the call frame and the bound handle.
    /// The assigned value is argument 3.
    pub fn setter_raw<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>, ObjectHandle) -> Result<usize, NativeError> + 'static,
    {
        self.class().add_setter(name, raw_method(f));
        self
    }

    /// Register a read-write property.
    ///
    /// # Example
    ///
    /// ```ignore
    /// module.class::<Vec2>("Vec2")
    ///     .property("x", |v: &Vec2| v.x, |v: &mut Vec2, x: f64| v.x = x);
    /// ```
    pub fn property<G, S>(self, name: &str, get: impl IntoMethod<T, G>, set: impl IntoMethod<T, S>) -> Self {
        self.getter(name, get).setter(name, set)
    }

    // === Inheritance ===

    /// Inherit from another class.
    ///
    /// Methods and metamethods of `B` are shared by reference, so methods
    /// declared on `B` later still reach `T`'s instances. Properties are
    /// copied now; later ones do not.
    ///
    /// `B`'s typed methods run on the `B` part of a `T`, reached through
    /// `AsRef<B>` and `AsMut<B>`.
    pub fn inherits<B>(self) -> Self
    where
        B: NativeClass,
        T: AsRef<B> + AsMut<B>,
    {
        let (derived, base) = (TypeHash::of::<T>(), TypeHash::of::<B>());
        let classes = &mut self.module.classes;
        classes.get_or_create::<B>();
        classes.inherit(derived, base);
        classes.add_upcast(derived, base, Upcast::new::<T, B>());
        self
    }
}
