//! Marker trait for native classes.

/// Marker trait for types that can be registered as native classes.
///
/// Types implementing this trait can be used with `ClassBuilder`, returned
/// as [`ObjectRef`](crate::convert::ObjectRef) or `Box<T>`, and received as
/// `ObjectRef<T>` arguments.
///
/// # Example
///
/// ```
/// use lualite::NativeClass;
///
/// struct Counter { value: i64 }
///
/// impl NativeClass for Counter {
///     const NAME: &'static str = "Counter";
/// }
/// ```
pub trait NativeClass: 'static {
    /// Diagnostic name of this type, used in error messages and logs.
    const NAME: &'static str;
}
