//! Modules: declaration-time bindings and their installation.
//!
//! A [`Module`] collects free functions, enum constants, scopes and classes
//! without touching any runtime. [`Module::install`] then walks the scope
//! tree once, top-down and in declaration order, and binds everything into
//! a [`State`]:
//!
//! ```text
//! Module (declaration) -> install(&mut State) -> globals / namespace tables
//! ```
//!
//! # Example
//!
//! ```
//! use lualite::Module;
//! use lualite::core::{State, Value};
//!
//! fn add(a: i32, b: i32) -> i32 {
//!     a + b
//! }
//!
//! let mut module = Module::new();
//! module.scope("math").function("add", add).enum_value("ANSWER", 42);
//!
//! let mut state = State::new();
//! module.install(&mut state).unwrap();
//!
//! let math = state.get_global("math");
//! let add = state.get_field(&math, "add").unwrap();
//! let results = state.call(&add, vec![Value::Int(3), Value::Int(4)]).unwrap();
//! assert_eq!(results, vec![Value::Int(7)]);
//! ```

use std::rc::Rc;

use log::debug;
use lualite_core::{CallFrame, NativeError, NativeFunction, State, TableRef, Value};
use petgraph::graph::NodeIndex;
use rustc_hash::FxHashMap;

use crate::class_builder::ClassBuilder;
use crate::error::RegistrationError;
use crate::names::CLASS_NAME_KEY;
use crate::registry::ClassRegistry;
use crate::scope::{ScopeKind, ScopeTree};
use crate::stub::{FunctionStub, IntoFunction, raw_function};
use crate::traits::NativeClass;

/// A tree of bindings waiting to be installed.
pub struct Module {
    pub(crate) tree: ScopeTree,
    pub(crate) classes: ClassRegistry,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// Create a module that installs straight into the globals.
    pub fn new() -> Self {
        Self {
            tree: ScopeTree::new(None),
            classes: ClassRegistry::new(),
        }
    }

    /// Create a module that installs into the global table `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            tree: ScopeTree::new(Some(name.into())),
            classes: ClassRegistry::new(),
        }
    }

    /// The module's scope tree.
    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    /// The module's class registry.
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Open (or reopen) a child scope of the root.
    pub fn scope(&mut self, name: &str) -> ScopeBuilder<'_> {
        let root = self.tree.root();
        let node = self.tree.get_or_create_scope(root, name);
        ScopeBuilder { module: self, node }
    }

    /// Bind a free function at the root.
    pub fn function<M>(&mut self, name: &str, f: impl IntoFunction<M>) -> &mut Self {
        let root = self.tree.root();
        self.add_function(root, name, f.into_function_stub());
        self
    }

    /// Bind a function that works on the call frame directly.
    pub fn function_raw<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<usize, NativeError> + 'static,
    {
        let root = self.tree.root();
        self.add_function(root, name, raw_function(f));
        self
    }

    /// Bind an integer constant at the root.
    pub fn enum_value(&mut self, name: &str, value: i64) -> &mut Self {
        let root = self.tree.root();
        self.add_enum(root, name, value);
        self
    }

    /// Declare a class at the root.
    pub fn class<T: NativeClass>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        let root = self.tree.root();
        ClassBuilder::new(self, root, name)
    }

    pub(crate) fn add_function(&mut self, node: NodeIndex, name: &str, stub: FunctionStub) {
        if let Some(scope) = self.tree.node_mut(node) {
            scope.functions.push((name.to_string(), stub));
        }
    }

    pub(crate) fn add_enum(&mut self, node: NodeIndex, name: &str, value: i64) {
        if let Some(scope) = self.tree.node_mut(node) {
            scope.enums.push((name.to_string(), value));
        }
    }

    /// Install every binding into `state`.
    ///
    /// Consumes the module: the class registry is frozen and shared by every
    /// bound stub from here on. Existing tables are reused; a scope or class
    /// whose name is already bound to anything else is a
    /// [`RegistrationError::NamespaceConflict`]. Conflicts are found before
    /// anything is bound, so a failed install leaves `state` untouched.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn install(self, state: &mut State) -> Result<(), RegistrationError> {
        let Module { tree, classes } = self;
        let classes = Rc::new(classes);
        let root = tree.root();
        let globals = state.globals();
        ConflictCheck::new(&tree, &classes).run(&globals)?;
        let container = match tree.node(root).and_then(|n| n.name.as_deref()) {
            Some(name) => materialize(state, &globals, name, &tree, root)?,
            None => globals,
        };
        let installer = Installer {
            tree: &tree,
            classes: &classes,
        };
        installer.install_node(state, root, &container)?;
        debug!(
            "installed module: {} scopes, {} classes",
            tree.node_count(),
            classes.len()
        );
        Ok(())
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("tree", &self.tree)
            .field("classes", &self.classes.len())
            .finish()
    }
}

struct Installer<'a> {
    tree: &'a ScopeTree,
    classes: &'a Rc<ClassRegistry>,
}

impl Installer<'_> {
    fn install_node(&self, state: &mut State, node: NodeIndex, container: &TableRef) -> Result<(), RegistrationError> {
        let Some(scope) = self.tree.node(node) else {
            return Ok(());
        };

        for (name, stub) in &scope.functions {
            container.set_str(name, bind_function(stub, self.classes));
        }
        for (name, value) in &scope.enums {
            container.set_str(name, *value);
        }

        if let ScopeKind::Class(class) = scope.kind {
            if let Some(descriptor) = self.classes.get(class) {
                for (name, stub) in &descriptor.constructors {
                    container.set_str(name, bind_function(stub, self.classes));
                }
            }
            if let Some(name) = &scope.name {
                container.set_str(CLASS_NAME_KEY, name.as_str());
            }
        }

        for &child in self.tree.children(node) {
            let Some(name) = self.tree.node(child).and_then(|n| n.name.as_deref()) else {
                continue;
            };
            let table = materialize(state, container, name, self.tree, child)?;
            self.install_node(state, child, &table)?;
        }
        Ok(())
    }
}

/// What installing leaves under one key of a namespace table.
#[derive(Clone)]
enum Slot {
    /// A namespace table, already bound or still to be created
    Table(Option<TableRef>),
    /// Any other value, by runtime type name
    Value(&'static str),
}

/// Dry run of [`Installer`]: visits the tree in the same order and records
/// what each namespace table would hold, failing on the first conflict.
struct ConflictCheck<'a> {
    tree: &'a ScopeTree,
    classes: &'a ClassRegistry,
    /// Keyed by dotted path; same-named scopes share one table.
    tables: FxHashMap<String, FxHashMap<String, Slot>>,
}

impl<'a> ConflictCheck<'a> {
    fn new(tree: &'a ScopeTree, classes: &'a ClassRegistry) -> Self {
        Self {
            tree,
            classes,
            tables: FxHashMap::default(),
        }
    }

    fn run(mut self, globals: &TableRef) -> Result<(), RegistrationError> {
        let root = self.tree.root();
        match self.tree.node(root).and_then(|n| n.name.clone()) {
            Some(name) => {
                let table = self.enter("", Some(globals), &name, root)?;
                self.check_node(root, &name, table.as_ref())
            }
            None => self.check_node(root, "", Some(globals)),
        }
    }

    fn check_node(&mut self, node: NodeIndex, path: &str, existing: Option<&TableRef>) -> Result<(), RegistrationError> {
        let Some(scope) = self.tree.node(node) else {
            return Ok(());
        };

        let written = self.tables.entry(path.to_string()).or_default();
        for (name, _) in &scope.functions {
            written.insert(name.clone(), Slot::Value("function"));
        }
        for (name, _) in &scope.enums {
            written.insert(name.clone(), Slot::Value("number"));
        }
        if let ScopeKind::Class(class) = scope.kind {
            if let Some(descriptor) = self.classes.get(class) {
                for (name, _) in &descriptor.constructors {
                    written.insert(name.clone(), Slot::Value("function"));
                }
            }
            if scope.name.is_some() {
                written.insert(CLASS_NAME_KEY.to_string(), Slot::Value("string"));
            }
        }

        for &child in self.tree.children(node) {
            let Some(name) = self.tree.node(child).and_then(|n| n.name.as_deref()) else {
                continue;
            };
            let table = self.enter(path, existing, name, child)?;
            let child_path = format!("{}.{}", path, name);
            self.check_node(child, &child_path, table.as_ref())?;
        }
        Ok(())
    }

    /// The table `name` resolves to inside the table at `path`, mirroring
    /// [`materialize`].
    fn enter(
        &mut self,
        path: &str,
        existing: Option<&TableRef>,
        name: &str,
        node: NodeIndex,
    ) -> Result<Option<TableRef>, RegistrationError> {
        let written = self.tables.entry(path.to_string()).or_default();
        let slot = match written.get(name) {
            Some(slot) => slot.clone(),
            None => {
                let slot = match existing.map(|t| t.get_str(name)).unwrap_or_default() {
                    Value::Table(table) => Slot::Table(Some(table)),
                    Value::Nil => Slot::Table(None),
                    other => Slot::Value(other.type_name()),
                };
                written.insert(name.to_string(), slot.clone());
                slot
            }
        };
        match slot {
            Slot::Table(table) => Ok(table),
            Slot::Value(type_name) => Err(RegistrationError::NamespaceConflict {
                name: self.tree.qualified_name(node),
                type_name,
            }),
        }
    }
}

/// Reuse the table bound under `name`, or create and bind a new one.
fn materialize(
    state: &State,
    parent: &TableRef,
    name: &str,
    tree: &ScopeTree,
    node: NodeIndex,
) -> Result<TableRef, RegistrationError> {
    match parent.get_str(name) {
        Value::Table(table) => Ok(table),
        Value::Nil => {
            let table = state.create_table();
            parent.set_str(name, table.clone());
            debug!("created namespace {}", tree.qualified_name(node));
            Ok(table)
        }
        other => Err(RegistrationError::NamespaceConflict {
            name: tree.qualified_name(node),
            type_name: other.type_name(),
        }),
    }
}

fn bind_function(stub: &FunctionStub, classes: &Rc<ClassRegistry>) -> NativeFunction {
    let stub = Rc::clone(stub);
    let classes = Rc::clone(classes);
    NativeFunction::new(move |frame| stub(frame, &classes))
}

// ============================================================================
// ScopeBuilder
// ============================================================================

/// Builder for one named scope of a [`Module`].
///
/// Created by [`Module::scope`] or [`ScopeBuilder::scope`].
pub struct ScopeBuilder<'m> {
    module: &'m mut Module,
    node: NodeIndex,
}

impl ScopeBuilder<'_> {
    /// Open (or reopen) a nested scope.
    pub fn scope(&mut self, name: &str) -> ScopeBuilder<'_> {
        let node = self.module.tree.get_or_create_scope(self.node, name);
        ScopeBuilder {
            module: &mut *self.module,
            node,
        }
    }

    /// Bind a free function in this scope.
    pub fn function<M>(&mut self, name: &str, f: impl IntoFunction<M>) -> &mut Self {
        self.module.add_function(self.node, name, f.into_function_stub());
        self
    }

    /// Bind a function that works on the call frame directly.
    pub fn function_raw<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<usize, NativeError> + 'static,
    {
        self.module.add_function(self.node, name, raw_function(f));
        self
    }

    /// Bind an integer constant in this scope.
    pub fn enum_value(&mut self, name: &str, value: i64) -> &mut Self {
        self.module.add_enum(self.node, name, value);
        self
    }

    /// Declare a class in this scope.
    pub fn class<T: NativeClass>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        ClassBuilder::new(&mut *self.module, self.node, name)
    }

    /// Dotted name of this scope.
    pub fn qualified_name(&self) -> String {
        self.module.tree.qualified_name(self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    #[test]
    fn anonymous_module_installs_into_globals() {
        let mut module = Module::new();
        module.function("add", add).enum_value("LIMIT", 10);
        let mut state = State::new();
        module.install(&mut state).unwrap();

        assert_eq!(state.get_global("LIMIT"), Value::Int(10));
        let results = state
            .call_global("add", vec![Value::Int(3), Value::Int(4)])
            .unwrap();
        assert_eq!(results, vec![Value::Int(7)]);
    }

    #[test]
    fn named_module_gets_its_own_table() {
        let mut module = Module::named("game");
        module.enum_value("VERSION", 2);
        let mut state = State::new();
        module.install(&mut state).unwrap();

        assert!(state.get_global("VERSION").is_nil());
        let game = state.get_global("game");
        assert_eq!(state.get_field(&game, "VERSION").unwrap(), Value::Int(2));
    }

    #[test]
    fn existing_tables_are_reused() {
        let mut state = State::new();
        let existing = state.create_table();
        existing.set_str("keep", 1i64);
        state.set_global("util", existing.clone());

        let mut module = Module::new();
        module.scope("util").enum_value("added", 2);
        module.install(&mut state).unwrap();

        assert_eq!(existing.get_str("keep"), Value::Int(1));
        assert_eq!(existing.get_str("added"), Value::Int(2));
    }

    #[test]
    fn non_table_binding_is_a_conflict() {
        let mut state = State::new();
        state.set_global("util", 5i64);
        let mut module = Module::new();
        module.scope("util").scope("inner");
        let err = module.install(&mut state).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::NamespaceConflict {
                name: "util".to_string(),
                type_name: "number",
            }
        );
    }

    #[test]
    fn conflict_with_own_binding_is_found_first() {
        let mut state = State::new();
        let mut module = Module::new();
        module.function("util", || 1i64);
        module.scope("util").enum_value("inner", 2);
        let err = module.install(&mut state).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::NamespaceConflict {
                name: "util".to_string(),
                type_name: "function",
            }
        );
        assert_eq!(state.get_global("util"), Value::Nil);
    }

    #[test]
    fn raw_function_binds() {
        let mut module = Module::new();
        module.function_raw("count", |frame| {
            let n = frame.arg_count() as i64;
            frame.push(n);
            Ok(1)
        });
        let mut state = State::new();
        module.install(&mut state).unwrap();
        let results = state
            .call_global("count", vec![Value::Nil, Value::Nil, Value::Nil])
            .unwrap();
        assert_eq!(results, vec![Value::Int(3)]);
    }
}
