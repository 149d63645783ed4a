//! Envelope codec
//!
//! Thin wrappers over OpenSSL:
//! - `sign` / `verify`: RSA-SHA256 (PKCS#1 v1.5) over the exact content bytes
//! - `encrypt_for_recipient` / `decrypt`: PKCS#7 enveloped data, PEM armored,
//!   AES-256-CBC content encryption, binary mode (no MIME canonicalization)

use openssl::hash::MessageDigest;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::sign::{Signer, Verifier};
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::{X509, X509Ref};

use crate::envelope::KeyMaterial;
use crate::utils::{ClientError, Result};

/// Signs `content` with the sender's private key.
pub fn sign(content: &[u8], private_key: &PKeyRef<Private>) -> Result<Vec<u8>> {
    let mut signer = Signer::new(MessageDigest::sha256(), private_key)?;
    signer.update(content)?;
    Ok(signer.sign_to_vec()?)
}

/// Checks `signature` over `content` against the sender's certificate.
///
/// Malformed signatures and certificates without a usable public key yield
/// `false`.
pub fn verify(content: &[u8], signature: &[u8], certificate: &X509Ref) -> bool {
    let check = || -> std::result::Result<bool, openssl::error::ErrorStack> {
        let public_key = certificate.public_key()?;
        let mut verifier = Verifier::new(MessageDigest::sha256(), &public_key)?;
        verifier.update(content)?;
        verifier.verify(signature)
    };
    check().unwrap_or(false)
}

/// Wraps `content` in a PKCS#7 envelope readable only by `recipient`.
pub fn encrypt_for_recipient(content: &[u8], recipient: &X509Ref) -> Result<String> {
    let mut recipients = Stack::new()?;
    recipients.push(recipient.to_owned())?;
    let envelope = Pkcs7::encrypt(
        &recipients,
        content,
        Cipher::aes_256_cbc(),
        Pkcs7Flags::BINARY,
    )?;
    String::from_utf8(envelope.to_pem()?)
        .map_err(|e| ClientError::Protocol(format!("envelope PEM is not UTF-8: {e}")))
}

/// Opens a PEM envelope addressed to the holder of `private_key`.
///
/// OpenSSL locates the recipient entry through `certificate`, so both halves
/// of the key pair are required.
pub fn decrypt(
    envelope: &str,
    private_key: &PKeyRef<Private>,
    certificate: &X509Ref,
) -> Result<Vec<u8>> {
    let parsed = Pkcs7::from_pem(envelope.as_bytes())
        .map_err(|e| ClientError::Decrypt(format!("malformed envelope: {e}")))?;
    parsed
        .decrypt(private_key, certificate, Pkcs7Flags::BINARY)
        .map_err(|e| ClientError::Decrypt(format!("envelope not addressed to this key: {e}")))
}

/// A codec bound to one party's keys and, optionally, the certificate of the
/// party it talks to.
#[derive(Clone)]
pub struct EnvelopeCodec {
    private_key: PKey<Private>,
    certificate: X509,
    counterparty: Option<X509>,
}

impl EnvelopeCodec {
    pub fn new(material: &KeyMaterial, counterparty_cert_pem: Option<&str>) -> Result<Self> {
        let private_key = PKey::private_key_from_pem(material.private_key_pem.as_bytes())?;
        let certificate = X509::from_pem(material.public_cert_pem.as_bytes())?;
        let counterparty = counterparty_cert_pem
            .map(|pem| X509::from_pem(pem.as_bytes()))
            .transpose()?;
        Ok(Self {
            private_key,
            certificate,
            counterparty,
        })
    }

    pub fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        sign(content, &self.private_key)
    }

    /// `None` when no counterparty certificate is configured.
    pub fn verify(&self, content: &[u8], signature: &[u8]) -> Option<bool> {
        self.counterparty
            .as_ref()
            .map(|cert| verify(content, signature, cert))
    }

    pub fn encrypt_for_recipient(&self, content: &[u8], recipient: &X509Ref) -> Result<String> {
        encrypt_for_recipient(content, recipient)
    }

    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>> {
        decrypt(envelope, &self.private_key, &self.certificate)
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("private_key", &"<redacted>")
            .field("counterparty", &self.counterparty.is_some())
            .finish()
    }
}
