//! The `client` module is the pub/sub facade used by producers and
//! consumers.
//!
//! `Connection` owns one real-time link to the service. `Session` is its
//! transport-free state machine, `DeliveryMode` decides whether content is
//! signed and enveloped, and `message` holds the wire and event types.

pub mod connection;
pub mod message;
pub mod mode;
pub mod session;
pub mod state;

pub use connection::Connection;
pub use message::{
    Delivery, DeliveryKey, DeliveryReport, Destination, Event, Headers, Message, SignatureStatus,
};
pub use mode::DeliveryMode;
pub use state::{CommitState, ConnectionState};

#[cfg(test)]
mod session_tests;
