//! UseCase layer errors.

use thiserror::Error;

/// Failure to hand a request to the broadcast coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// The coordinator loop has exited and no longer accepts requests
    #[error("broadcast coordinator has stopped")]
    Stopped,
}
