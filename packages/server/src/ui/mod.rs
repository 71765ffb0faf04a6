//! Chat server HTTP surface.

mod handler;
mod server;
mod signal;
mod state;

pub use server::{Server, ServerConfig};
