//! Delivery modes
//!
//! In externally managed mode outgoing content is signed and incoming
//! payloads may arrive as PKCS#7 PEM envelopes whose plaintext is the JSON
//! message. Platform managed mode passes messages through untouched.

use serde_json::Value;
use tracing::warn;

use crate::client::message::{Message, SignatureStatus};
use crate::config::{DeliveryModeKind, Profile};
use crate::envelope::EnvelopeCodec;
use crate::utils::{ClientError, Result};

#[derive(Debug, Clone, Default)]
pub enum DeliveryMode {
    #[default]
    PlatformManaged,
    ExternallyManaged(EnvelopeCodec),
}

impl DeliveryMode {
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        match profile.settings.service.mode {
            DeliveryModeKind::PlatformManaged => Ok(DeliveryMode::PlatformManaged),
            DeliveryModeKind::ExternallyManaged => {
                let material = profile
                    .key_material
                    .as_ref()
                    .ok_or_else(|| config::ConfigError::NotFound("keys.dir".to_string()))?;
                if profile.counterparty_cert_pem.is_none() {
                    warn!("no counterparty certificate; message signatures will not be checked");
                }
                let codec =
                    EnvelopeCodec::new(material, profile.counterparty_cert_pem.as_deref())?;
                Ok(DeliveryMode::ExternallyManaged(codec))
            }
        }
    }

    /// Prepares an outgoing message: signs `content` in externally managed mode.
    pub fn seal(&self, mut message: Message) -> Result<Message> {
        if let DeliveryMode::ExternallyManaged(codec) = self {
            message.headers.signature = Some(codec.sign(message.content.as_bytes())?);
        }
        Ok(message)
    }

    /// Turns a `data` payload into a message, decrypting and verifying as the
    /// mode requires. A bad signature is logged, not fatal.
    pub fn open(&self, payload: Value, key: &str) -> Result<(Message, SignatureStatus)> {
        let message: Message = match (self, payload) {
            (DeliveryMode::ExternallyManaged(codec), Value::String(envelope)) => {
                let plaintext = codec.decrypt(&envelope)?;
                serde_json::from_slice(&plaintext)?
            }
            (DeliveryMode::PlatformManaged, Value::String(_)) => {
                return Err(ClientError::Decrypt(
                    "received an envelope but no key material is configured".into(),
                ));
            }
            (_, payload) => serde_json::from_value(payload)?,
        };

        let status = match (&message.headers.signature, self) {
            (None, _) => SignatureStatus::Unsigned,
            (Some(_), DeliveryMode::PlatformManaged) => SignatureStatus::Unchecked,
            (Some(signature), DeliveryMode::ExternallyManaged(codec)) => {
                match codec.verify(message.content.as_bytes(), signature) {
                    Some(true) => SignatureStatus::Verified,
                    Some(false) => {
                        warn!("signature check failed for message key '{key}'");
                        SignatureStatus::Invalid
                    }
                    None => SignatureStatus::Unchecked,
                }
            }
        };

        Ok((message, status))
    }
}
