//! Wire packets
//!
//! The service speaks socket.io v2 over engine.io v3 text frames. Each
//! WebSocket text frame carries exactly one engine.io packet:
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   open
//! 2 / 3                           ping / pong
//! 40                              socket.io connect
//! 42["data",{..},"key",1700000]   socket.io event
//! 421["subscribe",["topic"]]      event with ack id 1
//! 431[null,"ok"]                  ack for id 1
//! 44"reason"                      socket.io error
//! ```
//!
//! Only the default namespace is supported; a `/nsp,` prefix on inbound
//! packets is tolerated and dropped. Binary packets (`45`/`46`) are
//! rejected; message content and keys are carried as JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::utils::{ClientError, Result};

/// Engine.io open handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect,
    Disconnect,
    Event {
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    Error(Value),
}

impl Packet {
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Packet::Event {
            id: None,
            name: name.into(),
            args,
        }
    }

    pub fn event_with_ack(id: u64, name: impl Into<String>, args: Vec<Value>) -> Self {
        Packet::Event {
            id: Some(id),
            name: name.into(),
            args,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!(
                "0{}",
                serde_json::json!({
                    "sid": handshake.sid,
                    "upgrades": handshake.upgrades,
                    "pingInterval": handshake.ping_interval,
                    "pingTimeout": handshake.ping_timeout,
                })
            ),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect => "40".to_string(),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { id, name, args } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                let id = id.map(|i| i.to_string()).unwrap_or_default();
                format!("42{id}{}", Value::Array(array))
            }
            Packet::Ack { id, args } => format!("43{id}{}", Value::Array(args.clone())),
            Packet::Error(detail) => format!("44{detail}"),
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Protocol("empty frame".into()))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket(rest),
            '6' => Ok(Packet::Noop),
            other => Err(ClientError::Protocol(format!(
                "unsupported engine.io packet type '{other}'"
            ))),
        }
    }
}

fn decode_socket(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ClientError::Protocol("empty socket.io packet".into()))?;
    let body = strip_namespace(chars.as_str());

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let (id, payload) = split_id(body)?;
            let mut args = parse_array(payload)?;
            if args.is_empty() {
                return Err(ClientError::Protocol("event without a name".into()));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(ClientError::Protocol(format!(
                        "event name must be a string, got {other}"
                    )));
                }
            };
            Ok(Packet::Event { id, name, args })
        }
        '3' => match split_id(body)? {
            (Some(id), payload) => Ok(Packet::Ack {
                id,
                args: parse_array(payload)?,
            }),
            (None, _) => Err(ClientError::Protocol("ack without an id".into())),
        },
        '4' => {
            let detail = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
            };
            Ok(Packet::Error(detail))
        }
        '5' | '6' => Err(ClientError::Protocol(
            "binary socket.io packets are not supported".into(),
        )),
        other => Err(ClientError::Protocol(format!(
            "unsupported socket.io packet type '{other}'"
        ))),
    }
}

fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn split_id(body: &str) -> Result<(Option<u64>, &str)> {
    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok((None, body));
    }
    let id = body[..digits]
        .parse()
        .map_err(|e| ClientError::Protocol(format!("bad ack id: {e}")))?;
    Ok((Some(id), &body[digits..]))
}

fn parse_array(payload: &str) -> Result<Vec<Value>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str(payload)? {
        Value::Array(items) => Ok(items),
        other => Err(ClientError::Protocol(format!(
            "expected a JSON array payload, got {other}"
        ))),
    }
}
