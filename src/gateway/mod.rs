//! Gateway module - client side of the mirai-api-http websocket gateway
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 mirai-api-http gateway               │
//! │                ws://host:port/all                    │
//! └───────────┬──────────────────────────┬───────────────┘
//!             │ one channel per identity │
//!             ▼                          ▼
//!      ┌─────────────┐            ┌─────────────┐
//!      │  Session A  │            │  Session B  │
//!      └──┬───────┬──┘            └──┬───────┬──┘
//!         │       │  responses       │       │
//!  events │       └──────┐   ┌───────┘       │ events
//!         ▼              ▼   ▼               ▼
//!   ┌────────────┐  ┌─────────────┐   ┌────────────┐
//!   │ Dispatcher │  │ Correlation │   │ Dispatcher │
//!   └────────────┘  │    Store    │   └────────────┘
//!                   └──────▲──────┘
//!                          │
//!                   ┌──────┴──────┐     ┌──────────┐
//!                   │ CallGateway ├────►│ Registry │
//!                   └─────────────┘     └──────────┘
//! ```

pub mod adapter;
pub mod bot;
pub mod call;
pub mod correlation;
pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use adapter::{Adapter, ADAPTER_NAME};
pub use bot::Bot;
pub use call::CallGateway;
pub use correlation::{CorrelationStore, Waiter};
pub use dispatcher::EventDispatcher;
pub use protocol::{OutboundEnvelope, Subcommand};
pub use registry::{ConnectionRegistry, SessionHandle};
pub use session::{SessionContext, SessionExit, SessionState, TransportSession};
pub use transport::{Connector, DuplexChannel, FrameSink, FrameStream, HandshakeRequest, WebSocketConnector};
