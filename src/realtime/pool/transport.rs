//! Socket seam of the pool: a [`Connector`] dials an endpoint and hands back channel ends.

use futures::{SinkExt, StreamExt, future::BoxFuture};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::debug;

/// Frame exchanged with a relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Pong,
}

/// What the reading half of a socket reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Frame),
    Closed { reason: Option<String> },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to `{endpoint}`: {message}")]
    Connect { endpoint: String, message: String },
}

/// Live socket split into channel ends.
///
/// Dropping `outbound` makes the writer flush queued frames, close the socket and exit.
pub struct RelaySocket {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
    pub writer: JoinHandle<()>,
}

/// Opens sockets to relay endpoints.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<RelaySocket, TransportError>>;
}

/// WebSocket connector built on `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    /// Query string appended to every endpoint (for example the relay app key).
    query: Option<String>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
        }
    }

    fn url_for(&self, endpoint: &str) -> String {
        match &self.query {
            Some(query) if endpoint.contains('?') => format!("{endpoint}&{query}"),
            Some(query) => format!("{endpoint}?{query}"),
            None => endpoint.to_string(),
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<RelaySocket, TransportError>> {
        let endpoint = endpoint.to_string();
        let url = self.url_for(&endpoint);
        Box::pin(async move {
            let (stream, _response) =
                connect_async(url.as_str())
                    .await
                    .map_err(|err| TransportError::Connect {
                        endpoint: endpoint.clone(),
                        message: err.to_string(),
                    })?;
            let (mut sink, mut stream) = stream.split();

            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

            let writer = tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let message = match frame {
                        Frame::Text(text) => Message::text(text),
                        Frame::Ping => Message::Ping(Default::default()),
                        Frame::Pong => Message::Pong(Default::default()),
                    };
                    if sink.send(message).await.is_err() {
                        return;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
            });

            let reader_endpoint = endpoint.clone();
            tokio::spawn(async move {
                let reason = loop {
                    let event = match stream.next().await {
                        Some(Ok(Message::Text(text))) => Frame::Text(text.to_string()),
                        Some(Ok(Message::Pong(_))) => Frame::Pong,
                        Some(Ok(Message::Close(frame))) => {
                            break frame.map(|f| f.reason.to_string());
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => break Some(err.to_string()),
                        None => break None,
                    };
                    if inbound_tx.send(TransportEvent::Frame(event)).is_err() {
                        return;
                    }
                };
                debug!(endpoint = %reader_endpoint, ?reason, "relay socket closed");
                let _ = inbound_tx.send(TransportEvent::Closed { reason });
            });

            Ok(RelaySocket {
                outbound: outbound_tx,
                inbound: inbound_rx,
                writer,
            })
        })
    }
}
