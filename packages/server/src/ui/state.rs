//! Server state shared by the handlers.

use crate::usecase::CoordinatorHandle;

/// Shared application state
pub struct AppState {
    /// Handle to the broadcast coordinator every session registers with
    pub coordinator: CoordinatorHandle,
}
