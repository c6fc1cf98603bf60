//! Error types for the capability registry.

/// Errors produced by registration and trust feedback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid capability {id:?}: {reason}")]
    InvalidCapability { id: String, reason: String },

    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_capability_display_names_agent() {
        let err = RegistryError::InvalidCapability {
            id: "coder-1".into(),
            reason: "trust_score must be within 0..=100".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("coder-1"));
        assert!(msg.contains("trust_score"));
    }

    #[test]
    fn test_unknown_agent_display() {
        let err = RegistryError::UnknownAgent("ghost".into());
        assert_eq!(err.to_string(), "unknown agent: ghost");
    }
}
