//! Client connection
//!
//! `Connection` is the pub/sub facade. `open` returns at once in the
//! `Connecting` state and spawns a driver task that owns the transport link:
//! - inbound packets are fed to the shared `Session`
//! - connection-level outcomes are pushed onto the event queue
//! - commands from `subscribe`/`publish`/`commit` are forwarded to the link
//!
//! Call-scoped failures come back from the call itself; a successful
//! `publish` is confirmed later by `Event::DeliveryReport`. There is no
//! automatic reconnect or resubscribe: open a new connection and subscribe
//! again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{Instant, Interval, interval_at};
use tracing::{debug, info, warn};

use crate::client::message::{Delivery, DeliveryKey, Destination, Event, Message};
use crate::client::mode::DeliveryMode;
use crate::client::session::{Dispatch, Session};
use crate::client::state::ConnectionState;
use crate::config::{Credential, Endpoint};
use crate::transport::{ConnectRequest, Connector, Packet};
use crate::utils::{ClientError, Result};

enum Command {
    Send(Packet),
    Close,
}

pub struct Connection {
    id: String,
    session: Arc<Mutex<Session>>,
    mode: Arc<DeliveryMode>,
    commands: UnboundedSender<Command>,
    events: UnboundedReceiver<Event>,
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    /// Starts connecting to `endpoint`. Must be called from within a tokio
    /// runtime. The outcome arrives as `Event::Connected` or
    /// `Event::ConnectError`.
    pub fn open<C: Connector>(
        endpoint: &Endpoint,
        credential: &Credential,
        mode: DeliveryMode,
        connector: C,
    ) -> Self {
        let id = format!("conn-{}", uuid::Uuid::new_v4());
        let session = Arc::new(Mutex::new(Session::new(endpoint.use_auto_commit)));
        let mode = Arc::new(mode);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        match ConnectRequest::new(endpoint, credential) {
            Ok(request) => {
                lock(&session).begin_connecting();
                info!("{id} connecting to {}", endpoint.base_url);
                tokio::spawn(drive(
                    connector,
                    request,
                    session.clone(),
                    mode.clone(),
                    commands_rx,
                    events_tx,
                    id.clone(),
                ));
            }
            Err(e) => {
                let _ = events_tx.send(Event::ConnectError(e));
            }
        }

        Self {
            id,
            session,
            mode,
            commands,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.session).state()
    }

    /// Destinations acknowledged by the service on this connection.
    pub fn subscriptions(&self) -> Vec<Destination> {
        lock(&self.session).subscriptions().to_vec()
    }

    /// Next event from the connection; `None` once the driver has exited and
    /// every event has been consumed.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Subscribes to `destinations` and waits for the service's ack.
    ///
    /// Calling this again forwards the new set to the service unchanged.
    pub async fn subscribe<I, D>(&self, destinations: I) -> Result<Value>
    where
        I: IntoIterator<Item = D>,
        D: Into<Destination>,
    {
        let mut unique: Vec<Destination> = Vec::new();
        for destination in destinations {
            let destination = destination.into();
            if !unique.contains(&destination) {
                unique.push(destination);
            }
        }

        let (reply, ack) = oneshot::channel();
        let packet = lock(&self.session).subscribe(unique, reply)?;
        self.send(packet)?;
        ack.await.map_err(|_| ClientError::NotConnected)?
    }

    /// Publishes `message` under `key` and waits for the submission ack.
    ///
    /// `Ok` means the service took the message; the matching
    /// `Event::DeliveryReport` follows separately.
    pub async fn publish(&self, message: Message, key: impl Into<DeliveryKey>) -> Result<()> {
        let message = self.mode.seal(message)?;
        let (reply, ack) = oneshot::channel();
        let packet = lock(&self.session).produce(&message, key.into(), reply)?;
        self.send(packet)?;
        ack.await.map_err(|_| ClientError::NotConnected)?
    }

    /// Commits the most recently received message. Returns `false` when
    /// there was nothing to commit.
    pub fn commit(&self) -> Result<bool> {
        match lock(&self.session).commit()? {
            Some(packet) => {
                self.send(packet)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes the connection; later operations fail with `NotConnected`.
    pub fn disconnect(&self) {
        lock(&self.session).disconnected();
        let _ = self.commands.send(Command::Close);
    }

    fn send(&self, packet: Packet) -> Result<()> {
        self.commands
            .send(Command::Send(packet))
            .map_err(|_| ClientError::NotConnected)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Close);
    }
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn drive<C: Connector>(
    connector: C,
    request: ConnectRequest,
    session: Arc<Mutex<Session>>,
    mode: Arc<DeliveryMode>,
    mut commands: UnboundedReceiver<Command>,
    events: UnboundedSender<Event>,
    id: String,
) {
    let mut link = match connector.open(&request).await {
        Ok(link) => link,
        Err(e) => {
            warn!("{id} connection failed: {e}");
            lock(&session).disconnected();
            let _ = events.send(Event::ConnectError(e));
            return;
        }
    };

    let mut ping: Option<Interval> = None;
    let mut refused = false;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(packet)) => {
                    if link.outbound.send(packet).is_err() {
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = link.outbound.send(Packet::Disconnect);
                    break;
                }
            },
            inbound = link.inbound.recv() => match inbound {
                Some(Ok(packet)) => {
                    let dispatch = lock(&session).handle(packet);
                    match dispatch {
                        Dispatch::Emit(event) => {
                            if matches!(event, Event::Connected) {
                                info!("{id} connected");
                            }
                            let _ = events.send(event);
                        }
                        Dispatch::Data { payload, key, timestamp } => {
                            let event = match mode.open(payload, &key) {
                                Ok((message, signature)) => Event::Message(Delivery {
                                    message,
                                    key,
                                    timestamp,
                                    signature,
                                }),
                                Err(e) => {
                                    warn!("{id} could not open message '{key}': {e}");
                                    Event::Error(e)
                                }
                            };
                            let _ = events.send(event);
                        }
                        Dispatch::Reply(packet) => {
                            let _ = link.outbound.send(packet);
                        }
                        Dispatch::Handshake(period) => {
                            debug!("{id} pinging every {period:?}");
                            ping = Some(interval_at(Instant::now() + period, period));
                        }
                        Dispatch::Refused(e) => {
                            warn!("{id} connection refused: {e}");
                            refused = true;
                            let _ = events.send(Event::ConnectError(e));
                            break;
                        }
                        Dispatch::Close => break,
                        Dispatch::Nothing => {}
                    }
                }
                Some(Err(e)) => {
                    let _ = events.send(Event::Error(e));
                }
                None => break,
            },
            _ = next_tick(&mut ping) => {
                let _ = link.outbound.send(Packet::Ping);
            }
        }
    }

    let previous = lock(&session).disconnected();
    if refused {
        return;
    }
    if previous == ConnectionState::Connecting {
        let _ = events.send(Event::ConnectError(ClientError::Connection(
            "link closed before the service accepted the connection".into(),
        )));
    } else {
        info!("{id} disconnected");
        let _ = events.send(Event::Disconnected);
    }
}
