use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use prost_types::Timestamp;

/// Message as handed to publish. The broker assigns the id and publish time.
#[derive(Debug, Clone, Default)]
pub struct PubsubMessage {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
    /// Messages sharing a non-empty key are delivered serially, in publish
    /// order, on subscriptions created with message ordering enabled.
    pub ordering_key: String,
}

/// Payload of a published message.
///
/// Immutable once published; one instance is shared across every
/// subscription the message fans out to. Per-delivery state (ack id,
/// delivery attempt) lives outside.
#[derive(Debug)]
pub(crate) struct MessageBody {
    pub id: String,
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
    pub publish_time: Timestamp,
    pub ordering_key: String,
}

impl MessageBody {
    pub(crate) fn new(id: String, message: PubsubMessage) -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            id,
            data: message.data,
            attributes: message.attributes,
            publish_time: Timestamp {
                seconds: now.as_secs() as i64,
                nanos: now.subsec_nanos() as i32,
            },
            ordering_key: message.ordering_key,
        }
    }

    /// Byte count charged to flow control.
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }
}

/// One delivery of a message on one subscription.
#[derive(Debug, Clone)]
pub(crate) struct PulledMessage {
    pub body: Arc<MessageBody>,
    /// Unique per delivery, not per message.
    pub ack_id: String,
    /// 1 on first delivery, incremented on each redelivery.
    pub delivery_attempt: usize,
}
