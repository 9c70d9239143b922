//! Graph and bonding errors.

use beads_core::classify::ClassifyError;
use beads_core::enums::{BondPolicy, OperandKind};
use beads_core::template::TemplateError;
use beads_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// `require` needs exactly one template-instantiated side.
    #[error("policy '{policy}' cannot bond a {spawned} subgraph to a {head} head")]
    InvalidPolicyForOperands {
        policy: BondPolicy,
        head: OperandKind,
        spawned: OperandKind,
    },

    #[error("template '{template}' has no actionable entry or exit steps")]
    NoActionableSteps { template: String },

    /// A cycle among blocking or containment edges.
    #[error("dependency cycle: {}", cycle.join(" -> "))]
    Integrity { cycle: Vec<String> },

    #[error("bond would leave '{item}' in the wrong state: {reason}")]
    PostconditionViolated { item: String, reason: String },

    #[error("item not found: {id}")]
    NotFound { id: String },

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Rejected before anything was written; retrying cannot help.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPolicyForOperands { .. } | Self::NoActionableSteps { .. }
        )
    }

    /// Cycles and violated bond post-conditions.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::Integrity { .. } | Self::PostconditionViolated { .. }
        )
    }

    /// Whether the whole call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = GraphError::InvalidPolicyForOperands {
            policy: BondPolicy::Require,
            head: OperandKind::Proto,
            spawned: OperandKind::Proto,
        };
        assert_eq!(
            err.to_string(),
            "policy 'require' cannot bond a proto subgraph to a proto head"
        );
        assert!(err.is_validation());

        let err = GraphError::Integrity {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
        assert!(err.is_integrity());
        assert!(!err.is_retryable());
    }
}
