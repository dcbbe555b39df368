//! Names of the metamethods the runtime honours.

/// Fallback for reads of absent keys
pub const INDEX: &str = "__index";
/// Fallback for writes of absent keys
pub const NEWINDEX: &str = "__newindex";
/// Makes a table callable
pub const CALL: &str = "__call";
/// Length operator
pub const LEN: &str = "__len";
/// String conversion
pub const TOSTRING: &str = "__tostring";
/// Equality between distinct tables
pub const EQ: &str = "__eq";
/// Finalizer, run when the table is collected
pub const GC: &str = "__gc";
