//! In-memory transport
//!
//! `ChannelConnector::pair()` returns a connector plus the `ServiceSide` that
//! receives everything the connection sends and can push packets back.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{ConnectRequest, Connector, Link, Packet};
use crate::utils::{ClientError, Result};

pub struct ChannelConnector {
    link: Mutex<Option<Link>>,
    requests: UnboundedSender<ConnectRequest>,
    refusal: Option<String>,
}

pub struct ServiceSide {
    /// Packets sent by the connection.
    pub received: UnboundedReceiver<Packet>,
    /// Packets (or link failures) delivered to the connection.
    pub sender: UnboundedSender<Result<Packet>>,
    /// Connect requests seen by the connector.
    pub requests: UnboundedReceiver<ConnectRequest>,
}

impl ChannelConnector {
    pub fn pair() -> (Self, ServiceSide) {
        let (to_service, received) = mpsc::unbounded_channel();
        let (sender, from_service) = mpsc::unbounded_channel();
        let (requests_tx, requests) = mpsc::unbounded_channel();

        let connector = Self {
            link: Mutex::new(Some(Link {
                outbound: to_service,
                inbound: from_service,
            })),
            requests: requests_tx,
            refusal: None,
        };
        let service = ServiceSide {
            received,
            sender,
            requests,
        };
        (connector, service)
    }

    /// A connector whose every `open` fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        let (requests, _) = mpsc::unbounded_channel();
        Self {
            link: Mutex::new(None),
            requests,
            refusal: Some(reason.into()),
        }
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<Link> {
        let _ = self.requests.send(request.clone());

        if let Some(reason) = &self.refusal {
            return Err(ClientError::Connection(reason.clone()));
        }

        self.link
            .lock()
            .map_err(|_| ClientError::Connection("connector poisoned".into()))?
            .take()
            .ok_or_else(|| ClientError::Connection("link already used".into()))
    }
}

impl ServiceSide {
    pub fn send(&self, packet: Packet) {
        let _ = self.sender.send(Ok(packet));
    }

    /// Sends the engine.io open and socket.io connect packets.
    pub fn accept(&self, ping_interval_ms: u64) {
        self.send(Packet::Open(super::Handshake {
            sid: uuid::Uuid::new_v4().to_string(),
            upgrades: Vec::new(),
            ping_interval: ping_interval_ms,
            ping_timeout: ping_interval_ms,
        }));
        self.send(Packet::Connect);
    }

    /// Next packet from the connection, skipping keep-alive traffic.
    pub async fn next(&mut self) -> Option<Packet> {
        loop {
            match self.received.recv().await? {
                Packet::Ping | Packet::Pong => continue,
                other => return Some(other),
            }
        }
    }
}
