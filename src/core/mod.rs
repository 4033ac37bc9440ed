//! Core module - Fundamental types and collaborator traits
//!
//! This module defines what the bridge shares with its host:
//! - Identity and correlation tag types
//! - The decoded push event
//! - Traits for event decoding, event handling and lifecycle hooks

pub mod handler;
pub mod types;

pub use handler::{EventDecoder, EventHandler, JsonEventDecoder, LifecycleHooks, NoopHooks};
pub use types::{Event, Identity, Tag};
