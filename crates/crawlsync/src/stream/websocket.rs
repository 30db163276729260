//! WebSocket transport backed by tokio-tungstenite.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::transport::{CloseInfo, Connector, EventChannel, Frame};
use crate::error::StreamError;

/// Upper bound on the TCP connect plus HTTP upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to a WebSocket endpoint, attaching the configured headers to
/// the upgrade request.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    headers: BTreeMap<String, String>,
    handshake_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_request(&self) -> Result<tungstenite::handshake::client::Request, StreamError> {
        let invalid = |message: String| StreamError::InvalidEndpoint {
            url: self.url.clone(),
            message,
        };

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| invalid(e.to_string()))?;

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("header '{}' value: {}", name, e)))?;
            request.headers_mut().insert(name, value);
        }

        Ok(request)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn EventChannel>, StreamError> {
        let request = self.build_request()?;
        log::debug!("Opening stream to {}", self.url);

        let connect_error = |message: String| StreamError::Connect {
            url: self.url.clone(),
            message,
        };

        // A peer that accepts TCP but never answers the upgrade must not
        // leave the attempt hanging.
        let (stream, response) = tokio::time::timeout(
            self.handshake_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| {
            connect_error(format!(
                "handshake timed out after {:?}",
                self.handshake_timeout
            ))
        })?
        .map_err(|e| connect_error(e.to_string()))?;

        log::debug!("Stream handshake completed with {}", response.status());
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl EventChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<Frame, StreamError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(StreamError::Transport(e.to_string()))),
            };

            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(bytes) => Frame::Binary(bytes),
                Message::Close(close) => Frame::Close(close.map(|c| CloseInfo {
                    code: u16::from(c.code),
                    reason: c.reason.into_owned(),
                })),
                // Control frames are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed(""),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            log::debug!("Stream close handshake failed: {}", e);
        }
    }
}
