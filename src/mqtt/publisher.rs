//! Fire-and-forget publishing of structured payloads.

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tracing::{debug, warn};

use super::topic::{Topic, TopicFunction};

/// Publishes serialized readings to this client's topic at QoS 0.
///
/// No delivery feedback reaches the caller: serialization failures and
/// a full request queue are logged and the attempt is skipped, matching
/// the at-most-once contract of the status streams.
pub struct Publisher {
    client: AsyncClient,
    topic: Topic,
    retain_status: bool,
}

impl Publisher {
    pub fn new(client: AsyncClient, topic: Topic, retain_status: bool) -> Self {
        Self {
            client,
            topic,
            retain_status,
        }
    }

    pub fn publish<T: Serialize>(&self, payload: &T, function: Option<TopicFunction>) {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!("skipping publish, payload failed to serialize: {e}");
                return;
            }
        };
        let topic = match function {
            Some(function) => self.topic.with_function(function),
            None => self.topic.base(),
        };
        // Status topics may retain the last value for late subscribers;
        // everything else never retains.
        let retain = self.retain_status && matches!(function, Some(TopicFunction::Status));
        match self.client.try_publish(&topic, QoS::AtMostOnce, retain, body) {
            Ok(()) => debug!(%topic, retain, "publish request queued"),
            Err(e) => warn!(%topic, "publish request not queued: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::topic::{ClientIdentity, StreamKind};
    use rumqttc::MqttOptions;
    use serde_json::json;

    fn publisher(retain_status: bool) -> Publisher {
        let options = MqttOptions::new("test_pub", "127.0.0.1", 1883);
        // The event loop is never polled, so nothing leaves the process;
        // try_publish only has to reach the request queue.
        let (client, _event_loop) = AsyncClient::new(options, 8);
        let topic = ClientIdentity::new("zone1", "room1", "client1", StreamKind::Sensor).topic();
        Publisher::new(client, topic, retain_status)
    }

    #[tokio::test]
    async fn publish_never_panics_without_a_broker() {
        let publisher = publisher(false);
        publisher.publish(&json!({"direction": "up"}), Some(TopicFunction::Status));
        publisher.publish(&json!({"direction": "down"}), None);
    }

    #[tokio::test]
    async fn queue_overflow_is_swallowed() {
        let publisher = publisher(true);
        // Capacity is 8 and nothing drains the queue; the surplus
        // attempts must be dropped silently, not panic or block.
        for n in 0..32 {
            publisher.publish(&json!({ "n": n }), Some(TopicFunction::Status));
        }
    }
}
