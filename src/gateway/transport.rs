//! Transport - the duplex channel beneath a session
//!
//! A [`Connector`] opens one [`DuplexChannel`] per connection attempt. The
//! channel is split so the session's receive loop can own the read half
//! while callers share the write half through the connection registry.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::core::Identity;
use crate::error::{Error, Result};

/// Everything needed to open and authenticate one connection
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// Websocket endpoint
    pub url: Url,
    /// Identity sent as the `qq` header
    pub identity: Identity,
    /// Shared secret sent as the `verifyKey` header
    pub verify_key: SecretString,
    /// Upper bound on opening the connection
    pub timeout: Duration,
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame; `None` once the peer has closed.
    ///
    /// `Err(Error::Decode(_))` marks one unreadable frame, any other error
    /// means the connection is broken.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// An open connection, split into halves
pub struct DuplexChannel {
    /// Write half
    pub sink: Box<dyn FrameSink>,
    /// Read half
    pub stream: Box<dyn FrameStream>,
}

/// Opens connections to the gateway
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection and attach the handshake metadata
    async fn connect(&self, request: &HandshakeRequest) -> Result<DuplexChannel>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector on top of `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, request: &HandshakeRequest) -> Result<DuplexChannel> {
        let mut ws_request = request.url.as_str().into_client_request()?;

        // Header names are case-insensitive on the wire
        let verify_key = HeaderValue::from_str(request.verify_key.expose_secret())
            .map_err(|e| Error::Config(format!("Verify key is not a valid header value: {}", e)))?;
        let headers = ws_request.headers_mut();
        headers.insert(HeaderName::from_static("verifykey"), verify_key);
        headers.insert(
            HeaderName::from_static("qq"),
            HeaderValue::from(request.identity.get()),
        );

        let (ws, response) =
            tokio::time::timeout(request.timeout, tokio_tungstenite::connect_async(ws_request))
                .await
                .map_err(|_| {
                    Error::Connection(format!(
                        "Timed out after {:?} connecting to {}",
                        request.timeout, request.url
                    ))
                })??;

        debug!(
            "WebSocket to {} upgraded with status {}",
            request.url,
            response.status()
        );

        let (sink, stream) = ws.split();
        Ok(DuplexChannel {
            sink: Box::new(WebSocketSink(sink)),
            stream: Box::new(WebSocketSource(stream)),
        })
    }
}

struct WebSocketSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await?;
        Ok(())
    }
}

struct WebSocketSource(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for WebSocketSource {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| {
                        Error::Decode(format!("Binary frame is not UTF-8: {}", e))
                    }))
                }
                Ok(Message::Close(frame)) => {
                    debug!("Gateway sent close frame: {:?}", frame);
                    return None;
                }
                // tungstenite answers pings on its own
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
