//! `remoteme` Core Library
//!
//! Shared functionality for the relay:
//! - Dispatch protocol vocabulary (events, feedback, modes)
//! - Server configuration with defaults and file loading
//! - Monotonic wall-clock timestamps
//! - Common error types and tracing setup

pub mod config;
pub mod error;
pub mod protocol;
pub mod timestamp;
pub mod tracing_init;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use protocol::{ClientEvent, CommandRequest, Feedback, FeedbackKind, Mode, ServerEvent};
