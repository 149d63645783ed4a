//! The `transport` module is responsible for the link between a `Connection`
//! and the service.
//!
//! It defines the wire packets and the `Connector` seam. `WebSocketConnector`
//! dials the real service; `ChannelConnector` hands the connection an
//! in-memory link so tests can play the service side.

pub mod channel;
pub mod packet;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::config::{Credential, Endpoint};
use crate::utils::{ClientError, Result};

pub use channel::{ChannelConnector, ServiceSide};
pub use packet::{Handshake, Packet};
pub use websocket::WebSocketConnector;

/// engine.io protocol revision spoken by socket.io v2 servers.
pub const ENGINE_IO_VERSION: &str = "3";

/// Everything needed to open one authenticated link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: Url,
    pub authorization: String,
}

impl ConnectRequest {
    /// Builds `{base}/socket.io/?EIO=3&transport=websocket`, adding
    /// `auto_commit=false` for manual-commit endpoints.
    pub fn new(endpoint: &Endpoint, credential: &Credential) -> Result<Self> {
        let mut url = Url::parse(&endpoint.base_url)?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(ClientError::InvalidUrl(format!(
                    "unsupported scheme '{other}'"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(endpoint.base_url.clone()))?;

        let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
        url.set_path(&path);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("EIO", ENGINE_IO_VERSION)
                .append_pair("transport", "websocket");
            if !endpoint.use_auto_commit {
                query.append_pair("auto_commit", "false");
            }
        }

        Ok(Self {
            url,
            authorization: credential.authorization_header(),
        })
    }
}

/// An open link: packets to send and packets (or link failures) received.
///
/// Dropping `outbound` closes the link.
#[derive(Debug)]
pub struct Link {
    pub outbound: UnboundedSender<Packet>,
    pub inbound: UnboundedReceiver<Result<Packet>>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, request: &ConnectRequest) -> Result<Link>;
}
