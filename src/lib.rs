//! # mirai-bridge
//!
//! Client-side bridge to a mirai-api-http chat-bot gateway.
//!
//! ## Features
//!
//! - **One websocket per identity:** handshake, receive loop and fixed-interval reconnect
//! - **Correlated calls:** request/response over the shared channel, matched by `syncId`
//! - **Concurrent event handling:** every push event runs on its own task
//! - **Pluggable seams:** event decoding, event handling and lifecycle hooks are traits

pub mod config;
pub mod core;
pub mod error;
pub mod gateway;

pub use config::BridgeConfig;
pub use crate::core::{Event, EventDecoder, EventHandler, Identity, LifecycleHooks};
pub use error::{Error, Result};
pub use gateway::{Adapter, Bot, CallGateway, Subcommand};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
