//! Topic construction for the zone/room/client/stream hierarchy.
//!
//! Publishers and subscribers derive their topics from the same
//! [`Topic`] value, so a publish topic and the matching subscribe
//! topic can never drift apart for a given client identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three data streams a client can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Sensor,
    Led,
    Joystick,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Sensor => "sensor",
            StreamKind::Led => "led",
            StreamKind::Joystick => "joystick",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final topic segment that disambiguates the purpose of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFunction {
    /// Outbound readings (`.../status`).
    Status,
    /// Inbound command batches (`.../cmd`).
    Cmd,
}

impl TopicFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicFunction::Status => "status",
            TopicFunction::Cmd => "cmd",
        }
    }
}

impl fmt::Display for TopicFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one logical MQTT client. Set once at construction,
/// immutable afterwards.
///
/// `client_id` is the plain client name as it appears in topics; the
/// broker session id (with its per-stream suffix) is derived separately
/// by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub zone: String,
    pub room: String,
    pub client_id: String,
    pub kind: StreamKind,
}

impl ClientIdentity {
    pub fn new(zone: &str, room: &str, client_id: &str, kind: StreamKind) -> Self {
        Self {
            zone: zone.to_string(),
            room: room.to_string(),
            client_id: client_id.to_string(),
            kind,
        }
    }

    pub fn topic(&self) -> Topic {
        Topic {
            identity: self.clone(),
        }
    }
}

/// Hierarchical topic `zone/room/client_id/kind[/function]`.
///
/// Construction is pure and deterministic; segment validity (no `/` in
/// zone, room, or client id) is enforced by the configuration loader
/// before an identity ever reaches this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    identity: ClientIdentity,
}

impl Topic {
    pub fn base(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.identity.zone,
            self.identity.room,
            self.identity.client_id,
            self.identity.kind
        )
    }

    pub fn with_function(&self, function: TopicFunction) -> String {
        format!("{}/{}", self.base(), function)
    }

    pub fn kind(&self) -> StreamKind {
        self.identity.kind
    }
}
