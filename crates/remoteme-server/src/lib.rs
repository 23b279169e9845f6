//! `remoteme` Relay Server Library
//!
//! Core functionality for the relay:
//! - Executor running shell and agent commands with timeouts and output caps
//! - Connection registry for connected clients
//! - axum server with the WebSocket dispatch protocol and metadata routes

pub mod executor;
pub mod registry;
pub mod server;

pub use executor::Executor;
pub use registry::ConnectionRegistry;
pub use server::{AppState, Server, build_router};
