//! Gateway Protocol - mirai-api-http websocket adapter
//!
//! ## Protocol Overview
//!
//! - **JSON text frames** over one websocket per identity (`/all` endpoint)
//! - **Request-response pattern** correlated by `syncId`
//! - **Push events** carry a negative or missing `syncId`
//! - **Handshake** via `verifyKey` / `qq` headers; the first frame reports the result
//!
//! ## Frame Types
//!
//! - `OutboundEnvelope`: client call `{syncId, command, subcommand, content}`
//! - `InboundFrame::Response`: answer to a call, routed by tag
//! - `InboundFrame::Push`: event payload for the dispatcher

pub mod naming;
pub mod schema;

pub use naming::{normalize_params, snake_to_camel};
pub use schema::{
    classify, response_data, HandshakeOutcome, InboundFrame, OutboundEnvelope, Subcommand,
    STATUS_OK,
};
