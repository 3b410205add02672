//! Error types for volume operations.
//!
//! Every variant except `InvalidParameter` and `TensorData` signals that two
//! volumes were combined without agreeing on space, role or sampling grid.

use thiserror::Error;

use crate::volume::{Role, Space};

/// Main error type for lstk-core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A volume was used in a space other than the one the operation requires.
    #[error("space mismatch in {context}: expected {expected}, found {found}")]
    SpaceMismatch {
        context: String,
        expected: Space,
        found: Space,
    },

    /// A volume was used in a role the operation does not accept.
    #[error("role mismatch in {context}: expected one of [{expected}], found {found}")]
    RoleMismatch {
        context: String,
        expected: String,
        found: Role,
    },

    /// Two volumes in the same space do not share a sampling grid.
    #[error("grid mismatch in {context}: {detail}")]
    GridMismatch { context: String, detail: String },

    /// Invalid numeric parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Tensor data could not be read back as f32.
    #[error("tensor data error: {0}")]
    TensorData(String),
}

/// Result type for lstk-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a space mismatch error.
    pub fn space_mismatch(context: impl Into<String>, expected: Space, found: Space) -> Self {
        Self::SpaceMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    /// Create a role mismatch error listing the accepted roles.
    pub fn role_mismatch(context: impl Into<String>, expected: &[Role], found: Role) -> Self {
        let expected = expected
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::RoleMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    /// Create a grid mismatch error.
    pub fn grid_mismatch(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::GridMismatch {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// True for the tag and grid checks that guard cross-space operations.
    pub fn is_tag_mismatch(&self) -> bool {
        matches!(
            self,
            Self::SpaceMismatch { .. } | Self::RoleMismatch { .. } | Self::GridMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_mismatch_display() {
        let err = CoreError::space_mismatch("apply mask", Space::NativeFlair, Space::Atlas);
        assert_eq!(
            err.to_string(),
            "space mismatch in apply mask: expected flair, found mni"
        );
        assert!(err.is_tag_mismatch());
    }

    #[test]
    fn test_role_mismatch_lists_roles() {
        let err = CoreError::role_mismatch(
            "segment",
            &[Role::BrainExtracted],
            Role::Anatomical,
        );
        let msg = err.to_string();
        assert!(msg.contains("brain"));
        assert!(msg.contains("anat"));
    }

    #[test]
    fn test_invalid_parameter_is_not_tag_mismatch() {
        assert!(!CoreError::invalid_parameter("threshold").is_tag_mismatch());
    }
}
