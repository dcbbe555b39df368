//! Registration and installation errors.

use thiserror::Error;

/// Errors that can occur while installing a module into a runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// A scope or class would be installed over a non-table value
    #[error("cannot install '{name}': field already holds a {type_name}")]
    NamespaceConflict {
        name: String,
        type_name: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_conflict_message() {
        let err = RegistrationError::NamespaceConflict {
            name: "math".to_string(),
            type_name: "number",
        };
        assert!(err.to_string().contains("math"));
        assert!(err.to_string().contains("number"));
    }
}
