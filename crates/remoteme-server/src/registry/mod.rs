//! Connection registry for client sessions.

pub mod connection;

pub use connection::{Connection, ConnectionRegistry};
