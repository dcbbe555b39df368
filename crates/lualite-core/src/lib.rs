//! Host runtime for lualite bindings.
//!
//! This crate is the dynamic side of the native boundary: runtime values,
//! tables with metatables, native functions and their call frames, the heap
//! that owns native objects, and the [`State`] that ties them together.
//!
//! There is no parser here. Script-level operations are driven through the
//! `State` API the same way an interpreter would drive them:
//!
//! ```
//! use lualite_core::{NativeFunction, State, Value};
//!
//! let mut state = State::new();
//! state.set_global(
//!     "double",
//!     NativeFunction::new(|frame| {
//!         let n = frame.arg(1).as_integer().unwrap_or(0);
//!         frame.push(n * 2);
//!         Ok(1)
//!     }),
//! );
//! let results = state.call_global("double", vec![Value::Int(21)]).unwrap();
//! assert_eq!(results, vec![Value::Int(42)]);
//! ```

pub mod config;
pub mod error;
pub mod function;
pub mod heap;
pub mod meta;
pub mod state;
pub mod table;
pub mod type_hash;
pub mod value;

pub use config::StateConfig;
pub use error::{ConversionError, NativeError};
pub use function::{CallFrame, NativeCallable, NativeFunction};
pub use heap::{ObjectHandle, ObjectHeap};
pub use state::State;
pub use table::{Table, TableRef, WeakTableRef};
pub use type_hash::TypeHash;
pub use value::{TableKey, Value};
