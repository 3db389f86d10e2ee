use thiserror::Error;

use super::NodeError;

/// Run-level errors.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Rejected before execution starts; nothing runs.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The graph contains a cycle that is not a loop node's owned body.
    #[error("Cycle detected in graph at node '{node_id}'")]
    Cycle { node_id: String },
    /// A loop node exceeded its iteration cap.
    #[error("Loop '{node_id}' exceeded the maximum of {limit} iterations")]
    LoopLimitExceeded { node_id: String, limit: u32 },
    /// No executor registered for a node type encountered in the graph.
    #[error("No executor registered for node type '{0}'")]
    ExecutorNotFound(String),
    /// A node's execute operation failed; the original error is preserved.
    #[error("Node '{node_id}' failed: {source}")]
    NodeExecution {
        node_id: String,
        #[source]
        source: NodeError,
    },
    #[error("Run aborted: {0}")]
    Aborted(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    /// The node id attached to this error, if it is node-scoped.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            WorkflowError::Cycle { node_id }
            | WorkflowError::LoopLimitExceeded { node_id, .. }
            | WorkflowError::NodeExecution { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_variants() {
        assert_eq!(
            WorkflowError::Validation("dangling edge".into()).to_string(),
            "Validation error: dangling edge"
        );
        assert_eq!(
            WorkflowError::Cycle {
                node_id: "n3".into()
            }
            .to_string(),
            "Cycle detected in graph at node 'n3'"
        );
        assert_eq!(
            WorkflowError::LoopLimitExceeded {
                node_id: "loop1".into(),
                limit: 100
            }
            .to_string(),
            "Loop 'loop1' exceeded the maximum of 100 iterations"
        );
        assert_eq!(
            WorkflowError::Aborted("user".into()).to_string(),
            "Run aborted: user"
        );
    }

    #[test]
    fn node_id_accessor() {
        let err = WorkflowError::NodeExecution {
            node_id: "code1".into(),
            source: NodeError::Execution("boom".into()),
        };
        assert_eq!(err.node_id(), Some("code1"));
        assert!(err.to_string().contains("code1"));
        assert!(WorkflowError::Aborted("x".into()).node_id().is_none());
    }
}
