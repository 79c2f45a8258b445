//! WebSocket transport for the Deriv API

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::common::channels::{create_event_channel, create_outbound_channel};
use crate::common::errors::{ClientError, Result};
use crate::common::traits::{Connector, TransportChannels};
use crate::common::types::TransportEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the endpoint URL with the application id query parameter
pub fn endpoint_url(base: &str, app_id: u32) -> Result<String> {
    let url = Url::parse_with_params(base, &[("app_id", app_id.to_string())])
        .map_err(|e| ClientError::Configuration(format!("invalid websocket url {}: {}", base, e)))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url.to_string()),
        other => Err(ClientError::Configuration(format!(
            "websocket url must use ws or wss, got {}",
            other
        ))),
    }
}

/// Opens tokio-tungstenite WebSocket connections
///
/// Each open transport is driven by one spawned I/O task that owns the
/// socket; nothing else touches it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    #[instrument(skip(self))]
    async fn open(&self, url: &str) -> Result<TransportChannels> {
        info!("Connecting to Deriv WebSocket: {}", url);

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::ConnectFailed(e.to_string()))?;

        info!("WebSocket connection established");

        let (outbound_tx, outbound_rx) = create_outbound_channel();
        let (event_tx, event_rx) = create_event_channel();
        tokio::spawn(run_socket(ws_stream, outbound_rx, event_tx));

        Ok(TransportChannels {
            outbound: outbound_tx,
            inbound: event_rx,
        })
    }
}

/// Pump frames between the socket and the owner's channels until either side closes
async fn run_socket(
    ws_stream: WsStream,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
) {
    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::Message(text)).await.is_err() {
                            debug!("Transport owner dropped, closing socket");
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => {
                            if events.send(TransportEvent::Message(text)).await.is_err() {
                                let _ = write.send(Message::Close(None)).await;
                                return;
                            }
                        }
                        Err(e) => warn!("Dropping non UTF-8 binary frame: {}", e),
                    },
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                        debug!("Received Ping");
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("Received Pong");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("WebSocket closed: {:?}", frame);
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break Some(e.to_string());
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break None;
                    }
                }
            }
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            error!("WebSocket send failed: {}", e);
                            break Some(e.to_string());
                        }
                    }
                    None => {
                        debug!("All outbound senders dropped, closing socket");
                        let _ = write.send(Message::Close(None)).await;
                        break Some("closed by client".to_string());
                    }
                }
            }
            _ = events.closed() => {
                debug!("Transport owner dropped, closing socket");
                let _ = write.send(Message::Close(None)).await;
                return;
            }
        }
    };

    let _ = events.send(TransportEvent::Closed { reason }).await;
}
