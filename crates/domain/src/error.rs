//! Domain error types.

use storage::TransactionError;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure raised by an event handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    /// Creates a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised by the application service itself.
///
/// [`ApplicationService::run`](crate::ApplicationService::run) returns the
/// callback's own error type, which must be able to absorb these.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// The storage collaborator could not open or commit the transaction.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// A domain event handler failed; the transaction was rolled back.
    #[error("Domain event handler failed: {0}")]
    DomainEventHandler(#[source] HandlerError),

    /// An integration event handler failed after the transaction committed.
    #[error("Integration event handler failed after commit: {0}")]
    IntegrationEventHandler(#[source] HandlerError),
}

impl ApplicationError {
    /// Returns true if the failure happened after the write was committed.
    pub fn is_post_commit(&self) -> bool {
        matches!(self, ApplicationError::IntegrationEventHandler(_))
    }
}
