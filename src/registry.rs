//! Class registry.
//!
//! One [`ClassDescriptor`] per native type, keyed by [`TypeHash`] and
//! created on first reference. Descriptors accumulate constructors, methods,
//! metamethods and property accessors while a [`Module`](crate::Module) is
//! being declared; installing the module freezes the registry behind an
//! `Rc` shared by every bound stub.
//!
//! Inheritance composes two ways:
//!
//! - method and metamethod lists are shared by reference, so members added to
//!   a base after the derived class declared inheritance still show up on
//!   derived instances built later;
//! - getter and setter maps are copied at declaration time, so properties
//!   added to a base afterwards do not.
//!
//! A derived instance still holds its own Rust type, so methods bound
//! against a base type reach the base part of the object through an
//! [`Upcast`] recorded when inheritance is declared.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use log::debug;
use lualite_core::{ObjectHandle, TypeHash};
use rustc_hash::FxHashMap;

use crate::names::{GC, INDEX, NEWINDEX};
use crate::stub::{FunctionStub, MethodStub};
use crate::traits::NativeClass;

/// A named method or metamethod.
#[derive(Clone)]
pub struct MemberEntry {
    pub name: String,
    pub stub: MethodStub,
}

impl std::fmt::Debug for MemberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberEntry").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A member list that derived classes hold by reference.
pub type MemberList = Rc<RefCell<Vec<MemberEntry>>>;

bitflags! {
    /// Reserved metamethods a class supplied itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassFlags: u8 {
        /// Own `__gc`: no default release is installed.
        const HAS_GC = 1 << 0;
        /// Own `__index`: no default getter dispatch is installed.
        const HAS_INDEX = 1 << 1;
        /// Own `__newindex`: no default setter dispatch is installed.
        const HAS_NEWINDEX = 1 << 2;
    }
}

impl ClassFlags {
    /// The flag a reserved metamethod name sets, if any.
    pub fn for_metamethod(name: &str) -> ClassFlags {
        match name {
            GC => ClassFlags::HAS_GC,
            INDEX => ClassFlags::HAS_INDEX,
            NEWINDEX => ClassFlags::HAS_NEWINDEX,
            _ => ClassFlags::empty(),
        }
    }
}

// ============================================================================
// Upcasts
// ============================================================================

type Project = Rc<dyn Fn(&dyn Any) -> Option<&dyn Any>>;
type ProjectMut = Rc<dyn Fn(&mut dyn Any) -> Option<&mut dyn Any>>;

/// Projection from a derived object onto one of its bases.
///
/// Works on type-erased objects: the input must be the derived type the
/// upcast was built for, the output is the base part of it.
#[derive(Clone)]
pub struct Upcast {
    get: Project,
    get_mut: ProjectMut,
}

fn project<D: AsRef<B> + 'static, B: 'static>(object: &dyn Any) -> Option<&dyn Any> {
    object.downcast_ref::<D>().map(|derived| derived.as_ref() as &dyn Any)
}

fn project_mut<D: AsMut<B> + 'static, B: 'static>(object: &mut dyn Any) -> Option<&mut dyn Any> {
    object
        .downcast_mut::<D>()
        .map(|derived| derived.as_mut() as &mut dyn Any)
}

fn projection<F>(f: F) -> Project
where
    F: Fn(&dyn Any) -> Option<&dyn Any> + 'static,
{
    Rc::new(f)
}

fn projection_mut<F>(f: F) -> ProjectMut
where
    F: Fn(&mut dyn Any) -> Option<&mut dyn Any> + 'static,
{
    Rc::new(f)
}

impl Upcast {
    /// Upcast from `D` to its base `B`.
    pub fn new<D, B>() -> Self
    where
        D: AsRef<B> + AsMut<B> + 'static,
        B: 'static,
    {
        Self {
            get: projection(project::<D, B>),
            get_mut: projection_mut(project_mut::<D, B>),
        }
    }

    /// This upcast followed by `next`.
    pub fn then(&self, next: &Upcast) -> Upcast {
        let (first, second) = (Rc::clone(&self.get), Rc::clone(&next.get));
        let (first_mut, second_mut) = (Rc::clone(&self.get_mut), Rc::clone(&next.get_mut));
        Upcast {
            get: projection(move |object| first(object).and_then(|base| second(base))),
            get_mut: projection_mut(move |object| first_mut(object).and_then(|base| second_mut(base))),
        }
    }

    pub fn apply<'a>(&self, object: &'a dyn Any) -> Option<&'a dyn Any> {
        (self.get)(object)
    }

    pub fn apply_mut<'a>(&self, object: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        (self.get_mut)(object)
    }
}

impl std::fmt::Debug for Upcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Upcast")
    }
}

// ============================================================================
// ClassDescriptor
// ============================================================================

/// Everything declared for one native class.
pub struct ClassDescriptor {
    /// Identity of the native type.
    pub type_hash: TypeHash,
    /// `NativeClass::NAME`, used in diagnostics.
    pub name: &'static str,
    /// Constructors in declaration order, by exposed name.
    pub constructors: Vec<(String, FunctionStub)>,
    /// Own instance methods.
    pub methods: MemberList,
    /// Own metamethods, reserved names included.
    pub metamethods: MemberList,
    /// Property getters; the first declaration of a name wins.
    pub getters: FxHashMap<String, MethodStub>,
    /// Property setters; the first declaration of a name wins.
    pub setters: FxHashMap<String, MethodStub>,
    /// Method lists of base classes, in the order inheritance was declared.
    pub inherited_methods: Vec<MemberList>,
    /// Metamethod lists of base classes, in the order inheritance was declared.
    pub inherited_metamethods: Vec<MemberList>,
    /// Projections onto every base, direct or transitive.
    pub upcasts: FxHashMap<TypeHash, Upcast>,
    pub flags: ClassFlags,
}

impl ClassDescriptor {
    /// Create an empty descriptor.
    pub fn new(type_hash: TypeHash, name: &'static str) -> Self {
        Self {
            type_hash,
            name,
            constructors: Vec::new(),
            methods: MemberList::default(),
            metamethods: MemberList::default(),
            getters: FxHashMap::default(),
            setters: FxHashMap::default(),
            inherited_methods: Vec::new(),
            inherited_metamethods: Vec::new(),
            upcasts: FxHashMap::default(),
            flags: ClassFlags::empty(),
        }
    }

    pub fn add_constructor(&mut self, name: impl Into<String>, stub: FunctionStub) {
        let name = name.into();
        if self.constructors.iter().any(|(existing, _)| *existing == name) {
            debug!("{}: constructor '{}' declared more than once", self.name, name);
        }
        self.constructors.push((name, stub));
    }

    pub fn add_method(&mut self, name: impl Into<String>, stub: MethodStub) {
        let name = name.into();
        push_member(self.name, &self.methods, name, stub);
    }

    /// Add a metamethod. Reserved names also set the matching [`ClassFlags`].
    pub fn add_metamethod(&mut self, name: impl Into<String>, stub: MethodStub) {
        let name = name.into();
        self.flags |= ClassFlags::for_metamethod(&name);
        push_member(self.name, &self.metamethods, name, stub);
    }

    /// Add a getter. A name that already has one keeps it.
    pub fn add_getter(&mut self, name: impl Into<String>, stub: MethodStub) {
        insert_first(self.name, "getter", &mut self.getters, name.into(), stub);
    }

    /// Add a setter. A name that already has one keeps it.
    pub fn add_setter(&mut self, name: impl Into<String>, stub: MethodStub) {
        insert_first(self.name, "setter", &mut self.setters, name.into(), stub);
    }

    /// Names of every method visible on instances, inherited first.
    pub fn method_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for list in self.inherited_methods.iter().chain(std::iter::once(&self.methods)) {
            for entry in list.borrow().iter() {
                if !names.contains(&entry.name) {
                    names.push(entry.name.clone());
                }
            }
        }
        names
    }

    pub fn has_getter(&self, name: &str) -> bool {
        self.getters.contains_key(name)
    }

    pub fn has_setter(&self, name: &str) -> bool {
        self.setters.contains_key(name)
    }
}

impl std::fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("type_hash", &self.type_hash)
            .field("name", &self.name)
            .field("constructors", &self.constructors.len())
            .field("methods", &self.methods.borrow().len())
            .field("metamethods", &self.metamethods.borrow().len())
            .field("getters", &self.getters.len())
            .field("setters", &self.setters.len())
            .field("bases", &self.inherited_methods.len())
            .field("upcasts", &self.upcasts.len())
            .field("flags", &self.flags)
            .finish()
    }
}

fn push_member(class: &str, list: &MemberList, name: String, stub: MethodStub) {
    let mut list = list.borrow_mut();
    if list.iter().any(|entry| entry.name == name) {
        debug!("{}: member '{}' declared more than once", class, name);
    }
    list.push(MemberEntry { name, stub });
}

fn insert_first(
    class: &str,
    kind: &str,
    map: &mut FxHashMap<String, MethodStub>,
    name: String,
    stub: MethodStub,
) {
    if map.contains_key(&name) {
        debug!("{}: {} '{}' already declared, keeping the first", class, kind, name);
        return;
    }
    map.insert(name, stub);
}

/// What a derived class takes from a base when it declares inheritance.
struct Inheritance {
    methods: Vec<MemberList>,
    metamethods: Vec<MemberList>,
    getters: Vec<(String, MethodStub)>,
    setters: Vec<(String, MethodStub)>,
}

impl Inheritance {
    fn of(base: &ClassDescriptor) -> Self {
        let mut methods = base.inherited_methods.clone();
        methods.push(Rc::clone(&base.methods));
        let mut metamethods = base.inherited_metamethods.clone();
        metamethods.push(Rc::clone(&base.metamethods));
        let copy = |map: &FxHashMap<String, MethodStub>| -> Vec<(String, MethodStub)> {
            map.iter()
                .map(|(name, stub)| (name.clone(), Rc::clone(stub)))
                .collect()
        };
        Self {
            methods,
            metamethods,
            getters: copy(&base.getters),
            setters: copy(&base.setters),
        }
    }

    fn apply(self, derived: &mut ClassDescriptor) {
        derived.inherited_methods.extend(self.methods);
        derived.inherited_metamethods.extend(self.metamethods);
        for (name, stub) in self.getters {
            derived.getters.entry(name).or_insert(stub);
        }
        for (name, stub) in self.setters {
            derived.setters.entry(name).or_insert(stub);
        }
    }
}

// ============================================================================
// ClassRegistry
// ============================================================================

/// All class descriptors of one module.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: FxHashMap<TypeHash, ClassDescriptor>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_hash: TypeHash) -> Option<&ClassDescriptor> {
        self.classes.get(&type_hash)
    }

    pub fn get_mut(&mut self, type_hash: TypeHash) -> Option<&mut ClassDescriptor> {
        self.classes.get_mut(&type_hash)
    }

    /// Look up the descriptor of `T`.
    pub fn descriptor<T: NativeClass>(&self) -> Option<&ClassDescriptor> {
        self.get(TypeHash::of::<T>())
    }

    /// The descriptor of `T`, created empty on first reference.
    pub fn get_or_create<T: NativeClass>(&mut self) -> &mut ClassDescriptor {
        let type_hash = TypeHash::of::<T>();
        self.classes.entry(type_hash).or_insert_with(|| {
            debug!("declared class {} ({})", T::NAME, type_hash);
            ClassDescriptor::new(type_hash, T::NAME)
        })
    }

    pub fn contains(&self, type_hash: TypeHash) -> bool {
        self.classes.contains_key(&type_hash)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Make `derived` inherit from `base`.
    ///
    /// Takes references to the base's method and metamethod lists, including
    /// the lists the base itself inherited, and copies its current getters
    /// and setters without replacing the derived class's own. Returns false
    /// if either class is unknown or they are the same class.
    pub fn inherit(&mut self, derived: TypeHash, base: TypeHash) -> bool {
        if derived == base {
            return false;
        }
        let Some(base) = self.classes.get(&base) else {
            return false;
        };
        let base_name = base.name;
        let inheritance = Inheritance::of(base);
        let Some(derived) = self.classes.get_mut(&derived) else {
            return false;
        };
        debug!("{} inherits {}", derived.name, base_name);
        inheritance.apply(derived);
        true
    }

    /// Record how `derived` objects reach their `base` part.
    ///
    /// Upcasts the base already has are chained on, so a derived object can
    /// reach every base above it. The first upcast recorded for a pair is
    /// kept. Returns false if either class is unknown.
    pub fn add_upcast(&mut self, derived: TypeHash, base: TypeHash, upcast: Upcast) -> bool {
        let Some(base_class) = self.classes.get(&base) else {
            return false;
        };
        let chained: Vec<(TypeHash, Upcast)> = base_class
            .upcasts
            .iter()
            .map(|(target, next)| (*target, upcast.then(next)))
            .collect();
        let Some(derived) = self.classes.get_mut(&derived) else {
            return false;
        };
        derived.upcasts.entry(base).or_insert(upcast);
        for (target, upcast) in chained {
            derived.upcasts.entry(target).or_insert(upcast);
        }
        true
    }

    /// The upcast from the object behind `handle` to `target`, if its class
    /// inherits from it.
    pub fn upcast_for(&self, handle: ObjectHandle, target: TypeHash) -> Option<&Upcast> {
        self.classes
            .get(&TypeHash::of_type_id(handle.type_id))?
            .upcasts
            .get(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::raw_method;

    struct Base;
    struct Derived;

    impl NativeClass for Base {
        const NAME: &'static str = "Base";
    }

    impl NativeClass for Derived {
        const NAME: &'static str = "Derived";
    }

    fn noop() -> MethodStub {
        raw_method(|_, _| Ok(0))
    }

    #[test]
    fn get_or_create_shares_descriptor() {
        let mut registry = ClassRegistry::new();
        registry.get_or_create::<Base>().add_method("a", noop());
        registry.get_or_create::<Base>().add_method("b", noop());
        assert_eq!(registry.len(), 1);
        let base = registry.descriptor::<Base>().unwrap();
        assert_eq!(base.method_names(), vec!["a", "b"]);
        assert_eq!(base.name, "Base");
    }

    #[test]
    fn reserved_metamethods_set_flags() {
        let mut registry = ClassRegistry::new();
        let base = registry.get_or_create::<Base>();
        base.add_metamethod("__tostring", noop());
        assert_eq!(base.flags, ClassFlags::empty());
        base.add_metamethod(GC, noop());
        base.add_metamethod(INDEX, noop());
        assert!(base.flags.contains(ClassFlags::HAS_GC | ClassFlags::HAS_INDEX));
        assert!(!base.flags.contains(ClassFlags::HAS_NEWINDEX));
    }

    #[test]
    fn first_property_declaration_wins() {
        let first = noop();
        let mut registry = ClassRegistry::new();
        let base = registry.get_or_create::<Base>();
        base.add_getter("x", Rc::clone(&first));
        base.add_getter("x", noop());
        assert!(Rc::ptr_eq(&base.getters["x"], &first));
        assert!(!base.has_setter("x"));
    }

    #[test]
    fn methods_by_reference_properties_by_copy() {
        let mut registry = ClassRegistry::new();
        registry.get_or_create::<Base>().add_method("early", noop());
        registry.get_or_create::<Base>().add_getter("early_prop", noop());
        registry.get_or_create::<Derived>();
        assert!(registry.inherit(TypeHash::of::<Derived>(), TypeHash::of::<Base>()));

        registry.get_or_create::<Base>().add_method("late", noop());
        registry.get_or_create::<Base>().add_getter("late_prop", noop());

        let derived = registry.descriptor::<Derived>().unwrap();
        assert_eq!(derived.method_names(), vec!["early", "late"]);
        assert!(derived.has_getter("early_prop"));
        assert!(!derived.has_getter("late_prop"));
    }

    #[test]
    fn derived_property_is_not_replaced() {
        let own = noop();
        let mut registry = ClassRegistry::new();
        registry.get_or_create::<Base>().add_setter("x", noop());
        registry.get_or_create::<Derived>().add_setter("x", Rc::clone(&own));
        registry.inherit(TypeHash::of::<Derived>(), TypeHash::of::<Base>());
        let derived = registry.descriptor::<Derived>().unwrap();
        assert!(Rc::ptr_eq(&derived.setters["x"], &own));
    }

    struct Inner(i64);
    struct Middle(Inner);
    struct Outer(Middle);

    impl NativeClass for Inner {
        const NAME: &'static str = "Inner";
    }

    impl NativeClass for Middle {
        const NAME: &'static str = "Middle";
    }

    impl NativeClass for Outer {
        const NAME: &'static str = "Outer";
    }

    impl AsRef<Inner> for Middle {
        fn as_ref(&self) -> &Inner {
            &self.0
        }
    }

    impl AsMut<Inner> for Middle {
        fn as_mut(&mut self) -> &mut Inner {
            &mut self.0
        }
    }

    impl AsRef<Middle> for Outer {
        fn as_ref(&self) -> &Middle {
            &self.0
        }
    }

    impl AsMut<Middle> for Outer {
        fn as_mut(&mut self) -> &mut Middle {
            &mut self.0
        }
    }

    #[test]
    fn upcasts_chain_through_bases() {
        let mut registry = ClassRegistry::new();
        registry.get_or_create::<Inner>();
        registry.get_or_create::<Middle>();
        registry.get_or_create::<Outer>();
        let (inner, middle, outer) = (
            TypeHash::of::<Inner>(),
            TypeHash::of::<Middle>(),
            TypeHash::of::<Outer>(),
        );
        assert!(registry.add_upcast(middle, inner, Upcast::new::<Middle, Inner>()));
        assert!(registry.add_upcast(outer, middle, Upcast::new::<Outer, Middle>()));

        let mut heap = lualite_core::ObjectHeap::new();
        let handle = heap.allocate(Outer(Middle(Inner(3))));
        let upcast = registry.upcast_for(handle, inner).unwrap();

        let cell = heap.get_erased(handle).unwrap();
        {
            let mut object = cell.borrow_mut();
            let base = upcast.apply_mut(&mut *object).unwrap();
            base.downcast_mut::<Inner>().unwrap().0 = 8;
        }
        let object = cell.borrow();
        let base = upcast.apply(&*object).unwrap();
        assert_eq!(base.downcast_ref::<Inner>().unwrap().0, 8);

        assert!(registry.upcast_for(handle, outer).is_none());
    }

    #[test]
    fn upcast_ignores_other_types() {
        let upcast = Upcast::new::<Middle, Inner>();
        let value = Inner(1);
        assert!(upcast.apply(&value).is_none());
    }

    #[test]
    fn inherit_rejects_unknown_and_self() {
        let mut registry = ClassRegistry::new();
        registry.get_or_create::<Base>();
        let base = TypeHash::of::<Base>();
        assert!(!registry.inherit(base, base));
        assert!(!registry.inherit(base, TypeHash::of::<Derived>()));
        assert!(!registry.inherit(TypeHash::of::<Derived>(), base));
    }
}
