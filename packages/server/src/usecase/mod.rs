//! UseCase layer: the broadcast coordinator and per-connection sessions.

pub mod coordinator;
pub mod error;
pub mod session;

pub use coordinator::{BroadcastCoordinator, CoordinatorHandle, RegisteredSession, Registry};
pub use error::CoordinatorError;
pub use session::{ClientSession, DisconnectReason};
