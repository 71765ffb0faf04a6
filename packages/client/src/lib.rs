//! Terminal client for the Parlor chat room.

pub mod error;
mod formatter;
mod session;
mod ui;

pub use error::ClientError;
pub use formatter::MessageFormatter;
pub use session::run_client;
