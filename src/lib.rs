//! Native bindings for the lualite runtime.
//!
//! This crate exposes native Rust functions and classes to a dynamically
//! typed runtime ([`lualite_core`]) and marshals values across that
//! boundary.
//!
//! # Architecture
//!
//! ```text
//! Module / ClassBuilder (declaration)
//!     -> ClassRegistry + ScopeTree
//!     -> install(&mut State)
//!     -> dispatch stubs + wrapper instances at call time
//! ```
//!
//! - [`convert`]: the marshalling protocol ([`FromValue`] / [`IntoValue`])
//! - [`stub`]: dispatch stubs generated per native signature
//! - [`wrapper`]: wrapper instances with their method tables and metatables
//! - [`registry`]: per-class descriptors and inheritance
//! - [`scope`] and [`module`]: the namespace tree and its installation
//!
//! # Example
//!
//! ```
//! use lualite::{Module, NativeClass};
//! use lualite::core::{State, Value};
//!
//! struct Counter {
//!     value: i64,
//! }
//!
//! impl NativeClass for Counter {
//!     const NAME: &'static str = "Counter";
//! }
//!
//! let mut module = Module::new();
//! module
//!     .class::<Counter>("Counter")
//!     .constructor(|start: i64| Counter { value: start })
//!     .method("increment", |c: &mut Counter| c.value += 1)
//!     .getter("value", |c: &Counter| c.value);
//!
//! let mut state = State::new();
//! module.install(&mut state).unwrap();
//!
//! let class = state.get_global("Counter");
//! let new = state.get_field(&class, "new").unwrap();
//! let counter = state.call(&new, vec![Value::Int(5)]).unwrap().remove(0);
//! state.call_method(&counter, "increment", Vec::new()).unwrap();
//! state.call_method(&counter, "increment", Vec::new()).unwrap();
//! assert_eq!(state.get_field(&counter, "value").unwrap(), Value::Int(7));
//! ```

pub use lualite_core as core;

pub mod class_builder;
pub mod convert;
pub mod error;
pub mod module;
pub mod names;
pub mod registry;
pub mod scope;
pub mod stub;
pub mod traits;
pub mod wrapper;

pub use class_builder::ClassBuilder;
pub use convert::{ByHandle, FromValue, IntoValue, Marshal, ObjectRef, Opaque};
pub use error::RegistrationError;
pub use module::{Module, ScopeBuilder};
pub use registry::{ClassDescriptor, ClassFlags, ClassRegistry};
pub use stub::{IntoConstructor, IntoFunction, IntoMethod};
pub use traits::NativeClass;
pub use wrapper::Ownership;
