//! Session state machine
//!
//! `Session` is the transport-free core of a connection. It tracks the
//! connection state, correlates acks with the calls that asked for them and
//! keeps the ledger of delivery keys issued by `produce`. The driver task
//! feeds it inbound packets and acts on the returned `Dispatch`.
//!
//! The public operations here are synchronous and designed to be held behind
//! `Arc<Mutex<Session>>`; callers must not hold the lock across an `.await`.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::client::message::{
    DeliveryKey, DeliveryReport, Destination, Event, Message, key_from_value,
};
use crate::client::state::{CommitState, ConnectionState};
use crate::transport::Packet;
use crate::utils::{ClientError, Result};

pub const SUBSCRIBE: &str = "subscribe";
pub const PRODUCE: &str = "produce";
pub const COMMIT: &str = "commit";
pub const DATA: &str = "data";
pub const DELIVERY_REPORT: &str = "delivery-report";
pub const EXCEPTION: &str = "exception";
pub const ERROR: &str = "error";

#[derive(Debug)]
enum PendingCall {
    Subscribe {
        destinations: Vec<Destination>,
        reply: oneshot::Sender<Result<Value>>,
    },
    Produce {
        key: DeliveryKey,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// What the driver should do after an inbound packet.
#[derive(Debug)]
pub enum Dispatch {
    Emit(Event),
    /// A `data` event whose payload still has to be opened.
    Data {
        payload: Value,
        key: DeliveryKey,
        timestamp: i64,
    },
    Reply(Packet),
    /// Start client pings at this interval.
    Handshake(Duration),
    /// The service refused the connection before accepting it.
    Refused(ClientError),
    Close,
    Nothing,
}

#[derive(Debug)]
pub struct Session {
    state: ConnectionState,
    auto_commit: bool,
    next_ack_id: u64,
    pending: HashMap<u64, PendingCall>,
    issued_keys: HashMap<DeliveryKey, usize>,
    subscriptions: Vec<Destination>,
}

impl Session {
    pub fn new(auto_commit: bool) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            auto_commit,
            next_ack_id: 0,
            pending: HashMap::new(),
            issued_keys: HashMap::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscriptions(&self) -> &[Destination] {
        &self.subscriptions
    }

    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn begin_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn take_ack_id(&mut self) -> u64 {
        let id = self.next_ack_id;
        self.next_ack_id += 1;
        id
    }

    pub fn subscribe(
        &mut self,
        destinations: Vec<Destination>,
        reply: oneshot::Sender<Result<Value>>,
    ) -> Result<Packet> {
        self.ensure_connected()?;
        let id = self.take_ack_id();
        let packet = Packet::event_with_ack(id, SUBSCRIBE, vec![Value::from(destinations.clone())]);
        self.pending.insert(
            id,
            PendingCall::Subscribe {
                destinations,
                reply,
            },
        );
        Ok(packet)
    }

    pub fn produce(
        &mut self,
        message: &Message,
        key: DeliveryKey,
        reply: oneshot::Sender<Result<()>>,
    ) -> Result<Packet> {
        self.ensure_connected()?;
        let payload = serde_json::to_value(message)?;
        let id = self.take_ack_id();
        let packet = Packet::event_with_ack(id, PRODUCE, vec![payload, Value::from(key.clone())]);
        *self.issued_keys.entry(key.clone()).or_insert(0) += 1;
        self.pending.insert(id, PendingCall::Produce { key, reply });
        Ok(packet)
    }

    /// `Some(packet)` when a commit must be sent. Auto-commit connections
    /// and idle manual-commit connections have nothing to commit.
    pub fn commit(&mut self) -> Result<Option<Packet>> {
        self.ensure_connected()?;
        if self.auto_commit {
            debug!("commit ignored on an auto-commit connection");
            return Ok(None);
        }
        match self.state {
            ConnectionState::Connected(CommitState::AwaitingCommit) => {
                self.state = ConnectionState::Connected(CommitState::Idle);
                Ok(Some(Packet::event(COMMIT, Vec::new())))
            }
            _ => {
                debug!("commit ignored, no message awaiting commit");
                Ok(None)
            }
        }
    }

    /// Moves to `Disconnected`, failing every pending call. Returns the
    /// state before the transition.
    pub fn disconnected(&mut self) -> ConnectionState {
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        for (_, call) in self.pending.drain() {
            match call {
                PendingCall::Subscribe { reply, .. } => {
                    let _ = reply.send(Err(ClientError::NotConnected));
                }
                PendingCall::Produce { reply, .. } => {
                    let _ = reply.send(Err(ClientError::NotConnected));
                }
            }
        }
        previous
    }

    pub fn handle(&mut self, packet: Packet) -> Dispatch {
        match packet {
            Packet::Open(handshake) if handshake.ping_interval > 0 => {
                Dispatch::Handshake(Duration::from_millis(handshake.ping_interval))
            }
            Packet::Open(_) | Packet::Pong | Packet::Noop => Dispatch::Nothing,
            Packet::Ping => Dispatch::Reply(Packet::Pong),
            Packet::Close | Packet::Disconnect => Dispatch::Close,
            Packet::Connect => {
                if self.state == ConnectionState::Connecting {
                    self.state = ConnectionState::Connected(CommitState::Idle);
                    Dispatch::Emit(Event::Connected)
                } else {
                    Dispatch::Nothing
                }
            }
            Packet::Error(detail) => {
                if self.state == ConnectionState::Connecting {
                    Dispatch::Refused(ClientError::Connection(describe(&detail)))
                } else {
                    Dispatch::Emit(Event::Error(ClientError::Service(describe(&detail))))
                }
            }
            Packet::Ack { id, args } => self.handle_ack(id, args),
            Packet::Event { name, args, .. } => self.handle_event(&name, args),
        }
    }

    fn handle_event(&mut self, name: &str, mut args: Vec<Value>) -> Dispatch {
        match name {
            DATA => {
                if !self.state.is_connected() {
                    return protocol_error("data received before the connection was accepted");
                }
                if args.is_empty() {
                    return protocol_error("data event without a payload");
                }
                let key = key_from_value(args.get(1));
                let Some(timestamp) = args.get(2).and_then(as_timestamp) else {
                    return protocol_error("data event without a timestamp");
                };
                if !self.auto_commit {
                    self.state = ConnectionState::Connected(CommitState::AwaitingCommit);
                }
                Dispatch::Data {
                    payload: args.swap_remove(0),
                    key,
                    timestamp,
                }
            }
            DELIVERY_REPORT => {
                let Some(first) = args.into_iter().next() else {
                    return protocol_error("delivery report without a body");
                };
                match serde_json::from_value::<DeliveryReport>(first) {
                    Ok(report) => self.settle_report(report),
                    Err(e) => protocol_error(&format!("malformed delivery report: {e}")),
                }
            }
            EXCEPTION => Dispatch::Emit(Event::Exception(
                args.first().map(describe).unwrap_or_default(),
            )),
            ERROR => Dispatch::Emit(Event::Error(ClientError::Service(
                args.first().map(describe).unwrap_or_default(),
            ))),
            other => {
                debug!("ignoring unknown event '{other}'");
                Dispatch::Nothing
            }
        }
    }

    fn settle_report(&mut self, report: DeliveryReport) -> Dispatch {
        match self.issued_keys.get_mut(&report.key) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.issued_keys.remove(&report.key);
                }
                Dispatch::Emit(Event::DeliveryReport(report))
            }
            None => {
                warn!("delivery report for unknown key '{}'", report.key);
                protocol_error(&format!("delivery report for unknown key '{}'", report.key))
            }
        }
    }

    fn release_key(&mut self, key: &str) {
        if let Some(count) = self.issued_keys.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.issued_keys.remove(key);
            }
        }
    }

    fn handle_ack(&mut self, id: u64, args: Vec<Value>) -> Dispatch {
        let Some(call) = self.pending.remove(&id) else {
            return protocol_error(&format!("ack for unknown call id {id}"));
        };
        let error = args.first().filter(|v| !v.is_null()).map(describe);

        match call {
            PendingCall::Subscribe {
                destinations,
                reply,
            } => {
                let outcome = match error {
                    Some(err) => Err(ClientError::Subscribe(err)),
                    None => {
                        for destination in destinations {
                            if !self.subscriptions.contains(&destination) {
                                self.subscriptions.push(destination);
                            }
                        }
                        Ok(args.get(1).cloned().unwrap_or(Value::Null))
                    }
                };
                let _ = reply.send(outcome);
            }
            PendingCall::Produce { key, reply } => {
                let outcome = match error {
                    Some(err) => {
                        self.release_key(&key);
                        Err(ClientError::Publish(err))
                    }
                    None => Ok(()),
                };
                let _ = reply.send(outcome);
            }
        }
        Dispatch::Nothing
    }
}

fn protocol_error(detail: &str) -> Dispatch {
    Dispatch::Emit(Event::Error(ClientError::Protocol(detail.to_string())))
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

fn as_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
