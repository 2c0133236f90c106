//! wabridge - HTTP gateway over a WhatsApp Web session
//!
//! Pairs a WhatsApp account through a QR code, keeps the connection alive
//! with bounded reconnection, answers a couple of in-chat commands, and
//! exposes sending and group listing over HTTP.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a default config, then start the gateway
//! wabridge init
//! wabridge serve --port 3000
//!
//! # Open http://127.0.0.1:3000/login and scan the QR code
//! ```

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod qr;
pub mod server;
pub mod session;
pub mod store;
pub mod utils;

#[cfg(feature = "whatsapp")]
pub mod cli;
#[cfg(feature = "whatsapp")]
pub mod whatsapp;

// Re-export commonly used types
pub use error::{ErrorCode, GatewayError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
