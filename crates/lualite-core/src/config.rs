//! Runtime configuration.

/// Default limit for nested native calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Configuration for a [`State`](crate::State).
///
/// # Example
///
/// ```
/// use lualite_core::StateConfig;
///
/// let config = StateConfig::new()
///     .with_max_call_depth(64)
///     .with_finalize_on_close(false);
/// assert_eq!(config.max_call_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    /// Maximum nesting of `State::call` before it fails
    pub max_call_depth: usize,
    /// Run pending finalizers when the state is dropped
    pub finalize_on_close: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            finalize_on_close: true,
        }
    }
}

impl StateConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum call depth.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set whether finalizers run when the state is dropped.
    pub fn with_finalize_on_close(mut self, enabled: bool) -> Self {
        self.finalize_on_close = enabled;
        self
    }
}
