//! Utilities shared by the Parlor server and client.

pub mod logger;
pub mod time;
