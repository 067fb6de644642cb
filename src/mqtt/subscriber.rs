//! Inbound message queueing and decoding.
//!
//! The connection's event-loop task pushes every inbound publish into a
//! bounded FIFO [`Inbox`]; the command loop drains it one message at a
//! time through [`Subscriber::decode_next`]. Single producer, single
//! consumer, arrival order preserved.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Raw inbound message as delivered by the broker. Owned by the inbox
/// until dequeued; ownership transfers to the consumer on dequeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Bounded FIFO buffer shared between the network task and the command
/// loop. On overflow the oldest message is dropped so the freshest
/// command batch always survives.
#[derive(Debug, Clone)]
pub struct Inbox {
    queue: Arc<Mutex<VecDeque<InboundMessage>>>,
    capacity: usize,
}

impl Inbox {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, message: InboundMessage) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            queue.pop_front();
            warn!(
                capacity = self.capacity,
                "inbox full, dropping oldest message"
            );
        }
        queue.push_back(message);
        debug!(pending = queue.len(), "enqueued inbound message");
    }

    pub fn pop(&self) -> Option<InboundMessage> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.is_empty()
    }

    pub fn len(&self) -> usize {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.len()
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

/// Outcome of one `decode_next` call. Callers must branch on all three:
/// nothing queued, a decoded payload, or a payload that was queued but
/// is not valid JSON.
#[derive(Debug)]
pub enum Inbound {
    Empty,
    Decoded(Value),
    Malformed(serde_json::Error),
}

/// Consumer side of the inbox.
pub struct Subscriber {
    inbox: Inbox,
}

impl Subscriber {
    pub fn new(inbox: Inbox) -> Self {
        Self { inbox }
    }

    /// Non-blocking: pops the oldest message, if any, and parses it as
    /// UTF-8 JSON. Parse failures consume the message.
    pub fn decode_next(&self) -> Inbound {
        let Some(message) = self.inbox.pop() else {
            return Inbound::Empty;
        };
        match serde_json::from_slice(&message.payload) {
            Ok(value) => Inbound::Decoded(value),
            Err(e) => Inbound::Malformed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(n: usize) -> InboundMessage {
        InboundMessage {
            topic: "zone1/room1/client1/led/cmd".to_string(),
            payload: format!("[{{\"wait\":{{\"seconds\":{n}}}}}]").into_bytes(),
        }
    }

    #[test]
    fn decode_next_preserves_fifo_order_then_reports_empty() {
        let inbox = Inbox::with_capacity(16);
        let subscriber = Subscriber::new(inbox.clone());
        for n in 0..5 {
            inbox.push(message(n));
        }
        for n in 0..5 {
            match subscriber.decode_next() {
                Inbound::Decoded(value) => {
                    assert_eq!(value[0]["wait"]["seconds"], n);
                }
                other => panic!("expected decoded message {n}, got {other:?}"),
            }
        }
        assert!(matches!(subscriber.decode_next(), Inbound::Empty));
        assert!(inbox.is_empty());
    }

    #[test]
    fn overflow_drops_the_oldest_message() {
        let inbox = Inbox::with_capacity(3);
        for n in 0..5 {
            inbox.push(message(n));
        }
        assert_eq!(inbox.len(), 3);
        // 0 and 1 were dropped, 2 is now the head
        let head = inbox.pop().unwrap();
        assert!(String::from_utf8_lossy(&head.payload).contains("\"seconds\":2"));
    }

    #[test]
    fn malformed_payload_is_distinct_from_empty() {
        let inbox = Inbox::with_capacity(4);
        let subscriber = Subscriber::new(inbox.clone());
        inbox.push(InboundMessage {
            topic: "t".to_string(),
            payload: b"not json {{".to_vec(),
        });
        assert!(matches!(subscriber.decode_next(), Inbound::Malformed(_)));
        assert!(matches!(subscriber.decode_next(), Inbound::Empty));
    }
}
