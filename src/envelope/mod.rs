//! The `envelope` module protects message content in externally managed
//! delivery: RSA-SHA256 signatures over plaintext content and PKCS#7
//! enveloped data addressed to a single recipient.
//!
//! Signing and encryption are separate layers. A producer signs the
//! plaintext `content`; the envelope wraps the message for the consumer;
//! the consumer decrypts first and verifies second.

pub mod codec;
pub mod keys;

pub use codec::{EnvelopeCodec, decrypt, encrypt_for_recipient, sign, verify};
pub use keys::KeyMaterial;

#[cfg(test)]
pub(crate) mod fixtures;
