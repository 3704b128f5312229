//! Connection seam and the tokio-tungstenite implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, trace, warn};

use super::close::CloseReason;
use crate::api::install_rustls_provider;
use crate::error::Result;

/// What the session sees of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The connection is finished; no further frames follow.
    Closed(CloseReason),
}

/// One open EventSub connection.
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next text frame or the end of the connection.
    ///
    /// Must be cancel safe: it is polled inside `tokio::select!`.
    async fn next_frame(&mut self) -> Frame;

    /// Close the connection. Errors are logged, not returned.
    async fn close(&mut self);
}

/// Opens connections to an EventSub endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// [`Connector`] over `tokio_tungstenite::connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        install_rustls_provider();
        let (stream, response) = connect_async(url).await?;
        debug!(url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn next_frame(&mut self) -> Frame {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(frame) => CloseReason::from_code(frame.code.into(), frame.reason.as_str()),
                        None => CloseReason::Dropped("close frame without a status code".to_string()),
                    };
                    return Frame::Closed(reason);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    trace!("Control frame");
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!(len = data.len(), "Ignoring unexpected binary frame");
                }
                Some(Err(e)) => return Frame::Closed(CloseReason::Dropped(e.to_string())),
                None => {
                    return Frame::Closed(CloseReason::Dropped("stream ended".to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}
