use std::sync::Arc;

use crate::queue::MessageQueue;
use crate::status::Status;
use crate::subscription::{Subscription, SubscriptionConfig};
use crate::topic::Topic;

/// Client is the entry point to one in-process broker.
///
/// Every client owns an independent broker instance; clones share it.
/// There is no global state, so tests build a client per scenario and let
/// it drop at the end.
///
/// Clients should be reused rather than being created as needed. A Client
/// may be shared by multiple tasks.
#[derive(Clone)]
pub struct Client {
    queue: Arc<MessageQueue>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(MessageQueue::new()),
        }
    }

    /// create_topic creates a new topic.
    ///
    /// The topic id must start with a letter, contain only letters,
    /// numbers, dashes (-), underscores (_), periods (.), tildes (~),
    /// plus (+) or percent signs (%), be between 3 and 255 characters in
    /// length, and must not start with "goog".
    ///
    /// If the topic already exists an error will be returned.
    pub fn create_topic(&self, id: &str) -> Result<Topic, Status> {
        let topic = self.topic(id);
        topic.create().map(|_| topic)
    }

    /// topic creates a reference to a topic. The topic itself may or may
    /// not exist.
    pub fn topic(&self, id: &str) -> Topic {
        Topic::new(id.to_string(), self.queue.clone())
    }

    /// get_topics returns the ids of all topics on the broker.
    pub fn get_topics(&self) -> Vec<String> {
        self.queue.list_topics()
    }

    /// create_subscription creates a new subscription on a topic.
    ///
    /// Subscription ids follow the same rules as topic ids. If the
    /// subscription already exists an error will be returned.
    pub fn create_subscription(
        &self,
        id: &str,
        topic_id: &str,
        config: SubscriptionConfig,
    ) -> Result<Subscription, Status> {
        let subscription = self.subscription(id);
        subscription.create(topic_id, config).map(|_| subscription)
    }

    /// subscription creates a reference to a subscription.
    pub fn subscription(&self, id: &str) -> Subscription {
        Subscription::new(id.to_string(), self.queue.clone())
    }

    /// get_subscriptions returns handles for all subscriptions on the
    /// broker.
    pub fn get_subscriptions(&self) -> Vec<Subscription> {
        self.queue
            .list_subscriptions()
            .into_iter()
            .map(|name| Subscription::new(name, self.queue.clone()))
            .collect()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
