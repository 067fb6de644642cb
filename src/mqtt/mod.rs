//! # MQTT Client Layer
//!
//! Everything the agent needs to talk to a broker: topic construction,
//! one supervised connection per logical client, fire-and-forget
//! publishing, and an ordered inbox for inbound command batches.
//!
//! ```text
//! mqtt/
//! ├── topic.rs       - zone/room/client/stream topic model
//! ├── connection.rs  - connection lifecycle and event-loop task
//! ├── publisher.rs   - JSON publish at QoS 0
//! └── subscriber.rs  - bounded FIFO inbox and decoding
//! ```
//!
//! The design follows the transport's own concurrency model: rumqttc's
//! event loop runs in a background task that is the only writer of
//! connection state, while application loops publish through cloned
//! client handles and read state with eventual consistency.

pub mod connection;
pub mod publisher;
pub mod subscriber;
pub mod topic;

pub use connection::{
    BrokerEndpoint, BrokerScheme, ConnectionState, Credentials, MqttConnection, MqttError,
};
pub use publisher::Publisher;
pub use subscriber::{Inbound, InboundMessage, Inbox, Subscriber};
pub use topic::{ClientIdentity, StreamKind, Topic, TopicFunction};
