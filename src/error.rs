//! Engine error taxonomy.
//!
//! Validation problems (bad names, duplicates, cycles) are not errors; they
//! are reported as [`Alert`](crate::types::Alert)s next to a successful
//! result. Everything here fails the surrounding transaction.

use crate::types::{LinkId, RepositoryId, TopicId};

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Referenced topic does not exist.
    #[error("Topic not found: {0}")]
    TopicNotFound(TopicId),
    /// Referenced link does not exist.
    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),
    /// Referenced repository does not exist.
    #[error("Repository not found: {0}")]
    RepositoryNotFound(RepositoryId),
    /// The root topic cannot be deleted, merged or re-parented.
    #[error("Cannot {operation} the root topic {topic}")]
    RootTopic {
        /// The root topic.
        topic: TopicId,
        /// What was attempted.
        operation: &'static str,
    },
    /// A merge target must be a direct parent of the merged topic.
    #[error("Cannot merge {source_topic} into {target}: target is not a parent topic")]
    InvalidMerge {
        /// Topic being merged away.
        source_topic: TopicId,
        /// Requested merge target.
        target: TopicId,
    },
    /// The operation ran past its deadline and was abandoned.
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// What was running.
        operation: &'static str,
    },
    /// Storage failure.
    #[error("Store error during {operation}: {message}")]
    Store {
        /// What was being attempted.
        operation: &'static str,
        /// Underlying error text.
        message: String,
    },
}

impl EngineError {
    /// Wrap a store error with the operation that was being attempted.
    pub fn store<E: std::error::Error>(operation: &'static str, e: E) -> Self {
        Self::Store {
            operation,
            message: e.to_string(),
        }
    }

    /// Whether this is a "no rows" condition rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TopicNotFound(_) | Self::LinkNotFound(_) | Self::RepositoryNotFound(_)
        )
    }

    /// Whether this is a fatal invariant violation.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::RootTopic { .. } | Self::InvalidMerge { .. })
    }
}

/// Attach operation context to store results.
pub trait StoreResultExt<T> {
    /// Map a store error into [`EngineError::Store`].
    fn context(self, operation: &'static str) -> Result<T, EngineError>;
}

impl<T, E: std::error::Error> StoreResultExt<T> for Result<T, E> {
    fn context(self, operation: &'static str) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::store(operation, e))
    }
}
