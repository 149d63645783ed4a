//! WebSocket transport
//!
//! Dials the service with tokio-tungstenite, adding the basic-auth header to
//! the HTTP upgrade request, then splits the stream into:
//! - a writer task draining `Link::outbound` into text frames
//! - a reader task decoding text frames into `Packet`s on `Link::inbound`
//!
//! The writer sends a close frame once every `outbound` sender is dropped.
//! Undecodable frames are forwarded as errors; a transport error ends the
//! reader.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::protocol::Message as WsMessage;
use tracing::{debug, warn};

use super::{ConnectRequest, Connector, Link, Packet};
use crate::utils::{ClientError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<Link> {
        let mut upgrade = request.url.as_str().into_client_request()?;
        let header = HeaderValue::from_str(&request.authorization)
            .map_err(|e| ClientError::Connection(format!("invalid credential header: {e}")))?;
        upgrade.headers_mut().insert(AUTHORIZATION, header);

        let (ws_stream, response) = connect_async(upgrade).await?;
        debug!("WebSocket upgrade completed with status {}", response.status());

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Packet>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<Result<Packet>>();

        spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                let frame = packet.encode();
                debug!("-> {frame}");
                if let Err(e) = ws_sender.send(WsMessage::text(frame)).await {
                    warn!("Failed to send frame: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!("Send loop closed");
        });

        spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                let item = match frame {
                    Ok(WsMessage::Text(text)) => {
                        debug!("<- {}", text.as_str());
                        Packet::decode(text.as_str())
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(Err(e.into()));
                        break;
                    }
                };
                if inbound_tx.send(item).is_err() {
                    break;
                }
            }
            debug!("Receive loop closed");
        });

        Ok(Link { outbound, inbound })
    }
}
