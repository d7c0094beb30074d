//! Error types for connection management.

/// Errors surfaced by the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be established.
    #[error("connect to {url} failed: {reason}")]
    ConnectFailed {
        /// URL the connect attempt targeted.
        url: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// No scoped connection exists for the given workflow.
    #[error("no connection for workflow {workflow_id}")]
    UnknownWorkflow {
        /// The workflow that was addressed.
        workflow_id: String,
    },
}
