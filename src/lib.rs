//! # securesub
//!
//! `securesub` is a client for a hosted pub/sub messaging service reached
//! over a socket.io-style WebSocket protocol. A process connects as a
//! producer or a consumer in one of two delivery modes:
//!
//! - platform managed: the service tracks commits; consumers pick auto or
//!   manual commit at connect time
//! - externally managed: producers sign content and consumers open PKCS#7
//!   envelopes addressed to their own key
//!
//! ## Core Modules
//!
//! - `client`: the `Connection` facade, its session state machine and message types.
//! - `config`: loads the endpoint, credential, destinations and key locations.
//! - `envelope`: RSA-SHA256 signatures and PKCS#7 envelopes.
//! - `rest`: the address-book REST call.
//! - `transport`: wire packets plus the WebSocket and in-memory links.
//! - `utils`: error type and logging setup.

pub mod client;
pub mod config;
pub mod envelope;
pub mod rest;
pub mod transport;
pub mod utils;

pub use client::{Connection, DeliveryMode, Event, Message};
pub use utils::{ClientError, Result};
