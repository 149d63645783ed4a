use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes the service endpoint, the application credential, the two
/// well-known destinations, key file locations and the log level.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub service: ServiceSettings,
    pub credential: Credential,
    pub destinations: DestinationSettings,
    pub keys: KeySettings,
    pub logging: LoggingSettings,
}

/// Where the service lives and how this process talks to it.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceSettings {
    pub url: String,
    pub mode: DeliveryModeKind,
    pub auto_commit: bool,
}

/// Which side of the connection protects message content.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryModeKind {
    #[default]
    PlatformManaged,
    ExternallyManaged,
}

/// Basic-auth credential for the application.
#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the `Authorization` header sent during the handshake.
    pub fn authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The service URL plus the commit semantics selected at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub use_auto_commit: bool,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, use_auto_commit: bool) -> Self {
        Self {
            base_url: base_url.into(),
            use_auto_commit,
        }
    }
}

/// Destination names used by the drivers, one per delivery mode.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DestinationSettings {
    pub externally_managed: Option<String>,
    pub platform_managed: Option<String>,
}

/// Key file locations.
///
/// `dir` holds this party's `key.pem` and `cert.pem`. Consumers verify
/// signatures against `counterparty_certificate`, or `dir/cert.pem` when it
/// is unset.
#[derive(Debug, Deserialize, Clone)]
pub struct KeySettings {
    pub dir: PathBuf,
    pub counterparty_certificate: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing optional values are filled using defaults; missing required
/// values fail the load.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub service: Option<PartialServiceSettings>,
    pub credential: Option<PartialCredential>,
    pub destinations: Option<DestinationSettings>,
    pub keys: Option<PartialKeySettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServiceSettings {
    pub url: Option<String>,
    pub mode: Option<DeliveryModeKind>,
    pub auto_commit: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialCredential {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialKeySettings {
    pub dir: Option<PathBuf>,
    pub counterparty_certificate: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cert"),
            counterparty_certificate: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.service.url.clone(), self.service.auto_commit)
    }

    /// Destination configured for the active delivery mode.
    pub fn destination(&self) -> Result<&str, config::ConfigError> {
        let (key, value) = match self.service.mode {
            DeliveryModeKind::ExternallyManaged => (
                "destinations.externally_managed",
                &self.destinations.externally_managed,
            ),
            DeliveryModeKind::PlatformManaged => (
                "destinations.platform_managed",
                &self.destinations.platform_managed,
            ),
        };
        value
            .as_deref()
            .ok_or_else(|| config::ConfigError::NotFound(key.to_string()))
    }
}
