//! Reserved names.

pub use lualite_core::meta::{GC, INDEX, NEWINDEX};

/// Key inside each wrapper table holding the native object's handle.
pub const INSTANCE_KEY: &str = "__instance";

/// Key inside each class table holding the exposed class name.
pub const CLASS_NAME_KEY: &str = "__classname";

/// Name under which `ClassBuilder::constructor` exposes a constructor.
pub const DEFAULT_CONSTRUCTOR: &str = "new";

/// First argument position of a method or metamethod (`obj:name(...)`).
pub const METHOD_FIRST_ARG: usize = 2;

/// First argument position of a property accessor (`__index(t, k)` and
/// `__newindex(t, k, v)`).
pub const PROPERTY_FIRST_ARG: usize = 3;
