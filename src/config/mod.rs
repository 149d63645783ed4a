mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::envelope::KeyMaterial;
use crate::utils::Result;
use settings::PartialSettings;

pub use settings::{
    Credential, DeliveryModeKind, DestinationSettings, Endpoint, KeySettings, LoggingSettings,
    ServiceSettings, Settings,
};

/// Prefix of the environment variables read by `load_config`, e.g.
/// `SECURESUB_CREDENTIAL__USERNAME`.
pub const ENV_PREFIX: &str = "SECURESUB";

/// Everything a connection needs, resolved once at process start.
#[derive(Debug, Clone)]
pub struct Profile {
    pub settings: Settings,
    pub endpoint: Endpoint,
    pub credential: Credential,
    pub key_material: Option<KeyMaterial>,
    pub counterparty_cert_pem: Option<String>,
}

/// Loads the configuration from `config/default`, a `.env` file and
/// `SECURESUB_*` environment variables, then reads key files when the mode
/// is externally managed.
pub fn load() -> Result<Profile> {
    resolve(load_config()?)
}

/// Loads the configuration from the default file and environment variables.
/// Merges the configuration with default values.
pub fn load_config() -> std::result::Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from("config/default")
}

/// Same as `load_config` but with an explicit config file stem.
pub fn load_config_from(file: &str) -> std::result::Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    merge(partial)
}

fn merge(partial: PartialSettings) -> std::result::Result<Settings, ConfigError> {
    let service = partial.service.unwrap_or_default();
    let credential = partial.credential.unwrap_or_default();
    let keys = partial.keys.unwrap_or_default();
    let default_keys = KeySettings::default();

    Ok(Settings {
        service: ServiceSettings {
            url: required(service.url, "service.url")?,
            mode: service.mode.unwrap_or_default(),
            auto_commit: service.auto_commit.unwrap_or(true),
        },
        credential: Credential {
            username: required(credential.username, "credential.username")?,
            password: required(credential.password, "credential.password")?,
        },
        destinations: partial.destinations.unwrap_or_default(),
        keys: KeySettings {
            dir: keys.dir.unwrap_or(default_keys.dir),
            counterparty_certificate: keys.counterparty_certificate,
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .and_then(|l| l.level)
                .unwrap_or_else(|| LoggingSettings::default().level),
        },
    })
}

fn required(value: Option<String>, key: &str) -> std::result::Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::NotFound(key.to_string()))
}

/// Turns loaded settings into a `Profile`, reading key material from disk
/// only for externally managed delivery.
///
/// Without `keys.counterparty_certificate`, signatures are checked against
/// the party's own `cert.pem`.
pub fn resolve(settings: Settings) -> Result<Profile> {
    let (key_material, counterparty_cert_pem) = match settings.service.mode {
        DeliveryModeKind::ExternallyManaged => {
            let material = KeyMaterial::load(&settings.keys.dir)?;
            let counterparty = settings
                .keys
                .counterparty_certificate
                .as_deref()
                .map(crate::envelope::keys::read_pem)
                .transpose()?
                .unwrap_or_else(|| material.public_cert_pem.clone());
            (Some(material), Some(counterparty))
        }
        DeliveryModeKind::PlatformManaged => (None, None),
    };

    Ok(Profile {
        endpoint: settings.endpoint(),
        credential: settings.credential.clone(),
        key_material,
        counterparty_cert_pem,
        settings,
    })
}
