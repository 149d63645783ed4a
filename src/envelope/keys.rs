use std::fs;
use std::path::Path;

use crate::utils::{ClientError, Result};

/// File name of a party's private key inside its key directory.
pub const PRIVATE_KEY_FILE: &str = "key.pem";
/// File name of a party's public certificate inside its key directory.
pub const CERTIFICATE_FILE: &str = "cert.pem";

/// A party's PEM encoded key pair. Loaded once, never transmitted.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub private_key_pem: String,
    pub public_cert_pem: String,
}

impl KeyMaterial {
    pub fn new(private_key_pem: impl Into<String>, public_cert_pem: impl Into<String>) -> Self {
        Self {
            private_key_pem: private_key_pem.into(),
            public_cert_pem: public_cert_pem.into(),
        }
    }

    /// Reads `key.pem` and `cert.pem` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            private_key_pem: read_pem(&dir.join(PRIVATE_KEY_FILE))?,
            public_cert_pem: read_pem(&dir.join(CERTIFICATE_FILE))?,
        })
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key_pem", &"<redacted>")
            .field("public_cert_pem", &self.public_cert_pem.len())
            .finish()
    }
}

pub fn read_pem(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ClientError::KeyFile {
        path: path.to_path_buf(),
        source,
    })
}
