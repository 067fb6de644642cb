//! TOML configuration for the agent.
//!
//! Every field has a usable default, so an empty file yields a working
//! local-broker setup. Validation failures are fatal: the loader is the
//! only place configuration errors are allowed to surface, and they
//! abort startup with a non-zero exit.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::mqtt::{BrokerEndpoint, Credentials, MqttError};

const DEFAULT_RESOLUTION_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} '{value}' must not contain '/'")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("sensehat rotation must be 0, 90, 180 or 270 degrees, got {0}")]
    InvalidRotation(u16),

    #[error(transparent)]
    Broker(#[from] MqttError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Seconds between sensor samples. 0 falls back to the default.
    pub resolution: u64,
    /// Optional text scrolled across the LED matrix at startup.
    pub welcome_msg: Option<String>,
    pub mqtt: MqttSection,
    pub sensehat: SensehatSection,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION_SECS,
            welcome_msg: None,
            mqtt: MqttSection::default(),
            sensehat: SensehatSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqttSection {
    pub broker_address: String,
    /// Client name as it appears in topic paths.
    pub client_name: String,
    pub zone: String,
    pub room: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Retain the last reading on status topics for late subscribers.
    pub retain_status: bool,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_address: "mqtt://127.0.0.1:1883".to_string(),
            client_name: "sensehat".to_string(),
            zone: "downstairs".to_string(),
            room: "living-room".to_string(),
            user: None,
            password: None,
            retain_status: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensehatSection {
    pub rounding: u32,
    pub acceleration_multiplier: f64,
    pub gyroscope_multiplier: f64,
    pub low_light: bool,
    pub rotation: u16,
}

impl Default for SensehatSection {
    fn default() -> Self {
        Self {
            rounding: 4,
            acceleration_multiplier: 9.80665,
            gyroscope_multiplier: 1.0,
            low_light: true,
            rotation: 0,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AgentConfig = toml::from_str(&raw)?;
        let config = config.validated()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        for (field, value) in [
            ("zone", &self.mqtt.zone),
            ("room", &self.mqtt.room),
            ("client_name", &self.mqtt.client_name),
        ] {
            if value.contains('/') {
                return Err(ConfigError::InvalidIdentifier {
                    field,
                    value: value.clone(),
                });
            }
        }
        // Scheme and address problems must fail here, before any
        // connection object exists.
        BrokerEndpoint::parse(&self.mqtt.broker_address)?;
        match self.sensehat.rotation {
            0 | 90 | 180 | 270 => {}
            other => return Err(ConfigError::InvalidRotation(other)),
        }
        if self.resolution == 0 {
            warn!(
                fallback = DEFAULT_RESOLUTION_SECS,
                "resolution 0 is not usable, falling back to default"
            );
            self.resolution = DEFAULT_RESOLUTION_SECS;
        }
        Ok(self)
    }

    pub fn endpoint(&self) -> Result<BrokerEndpoint, ConfigError> {
        Ok(BrokerEndpoint::parse(&self.mqtt.broker_address)?)
    }

    /// Anonymous when no user is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        self.mqtt.user.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.mqtt.password.clone().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<AgentConfig, ConfigError> {
        let config: AgentConfig = toml::from_str(raw)?;
        config.validated()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.resolution, 300);
        assert_eq!(config.mqtt.broker_address, "mqtt://127.0.0.1:1883");
        assert_eq!(config.mqtt.zone, "downstairs");
        assert_eq!(config.sensehat.rounding, 4);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn identifiers_with_separator_are_rejected() {
        let err = parse("[mqtt]\nzone = \"up/stairs\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidIdentifier { field: "zone", .. }
        ));
    }

    #[test]
    fn unsupported_scheme_is_fatal() {
        let err = parse("[mqtt]\nbroker_address = \"amqp://10.0.0.1:5672\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Broker(MqttError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn invalid_rotation_is_fatal() {
        let err = parse("[sensehat]\nrotation = 45\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRotation(45)));
    }

    #[test]
    fn zero_resolution_falls_back_to_default() {
        let config = parse("resolution = 0\n").unwrap();
        assert_eq!(config.resolution, 300);
    }

    #[test]
    fn credentials_require_a_username() {
        let config = parse("[mqtt]\nuser = \"agent\"\npassword = \"secret\"\n").unwrap();
        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.username, "agent");
        assert_eq!(credentials.password, "secret");

        let anonymous = parse("[mqtt]\npassword = \"ignored\"\n").unwrap();
        assert!(anonymous.credentials().is_none());
    }
}
