//! Error types for BOM graph operations.

/// Errors raised by normalization, graph mutation, exploration and storage.
#[derive(Debug, thiserror::Error)]
pub enum BomError {
    /// A part identifier is malformed or cannot be resolved.
    #[error("invalid part reference: {0}")]
    InvalidPartReference(String),

    /// A quantity is not a strictly positive integer.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A request body is missing a required field or has the wrong shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Project number or project name is missing.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// The proposed edge would make a part (transitively) contain itself.
    #[error("circular link: {parent} -> {child} would make {parent} contain itself")]
    CircularLink { parent: String, child: String },

    #[error("parent assembly not found: {0}")]
    ParentNotFound(String),

    #[error("child link not found: {parent} -> {child}")]
    ChildLinkNotFound { parent: String, child: String },

    /// The persisted graph already contains a cycle on the requested path.
    #[error("cycle detected in stored graph: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("assembly nesting exceeds depth limit of {limit}")]
    DepthExceeded { limit: usize },

    /// The configured link policy refuses this parent/child combination.
    #[error("link policy violation: {0}")]
    PolicyViolation(String),

    #[error("scope lock busy: {lock_path}")]
    LockBusy { lock_path: String },

    /// Storage or I/O failure other than an absent document.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl BomError {
    /// Stable snake_case classification used by adapters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPartReference(_) => "invalid_part_reference",
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidScope(_) => "invalid_scope",
            Self::CircularLink { .. } => "circular_link",
            Self::ParentNotFound(_) => "parent_not_found",
            Self::ChildLinkNotFound { .. } => "child_link_not_found",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::DepthExceeded { .. } => "depth_exceeded",
            Self::PolicyViolation(_) => "policy_violation",
            Self::LockBusy { .. } => "lock_busy",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
        }
    }

    /// Whether the error is a rejection of caller input rather than a
    /// failure of the stored graph or the substrate.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPartReference(_)
                | Self::InvalidQuantity(_)
                | Self::InvalidRequest(_)
                | Self::InvalidScope(_)
                | Self::PolicyViolation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_detected_renders_path() {
        let err = BomError::CycleDetected {
            path: vec!["A-001".into(), "B-002".into(), "A-001".into()],
        };
        assert_eq!(
            err.to_string(),
            "cycle detected in stored graph: A-001 -> B-002 -> A-001"
        );
        assert_eq!(err.kind(), "cycle_detected");
    }

    #[test]
    fn circular_link_is_not_a_shape_validation_error() {
        let err = BomError::CircularLink {
            parent: "C-003".into(),
            child: "A-001".into(),
        };
        assert!(!err.is_validation());
        assert!(BomError::InvalidQuantity("0".into()).is_validation());
    }
}
