//! Real-time chat room server library.
//!
//! Clients connect over WebSocket; each connection is served by a session
//! that forwards join notices and chat lines to a single broadcast
//! coordinator, which fans them out to every other participant.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
