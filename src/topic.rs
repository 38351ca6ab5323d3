use std::sync::Arc;

use crate::message::PubsubMessage;
use crate::queue::MessageQueue;
use crate::status::Status;
use crate::subscription::Subscription;

/// Topic is a reference to a broker topic.
#[derive(Clone)]
pub struct Topic {
    name: String,
    queue: Arc<MessageQueue>,
}

impl Topic {
    pub(crate) fn new(name: String, queue: Arc<MessageQueue>) -> Self {
        Self { name, queue }
    }

    /// id returns the unique identifier of the topic.
    pub fn id(&self) -> &str {
        &self.name
    }

    /// create creates the topic.
    pub fn create(&self) -> Result<(), Status> {
        self.queue.create_topic(&self.name)
    }

    /// delete deletes the topic. Attached subscriptions survive but are
    /// detached: their backlog stays readable only until they are deleted,
    /// and further pulls fail.
    pub fn delete(&self) -> Result<(), Status> {
        self.queue.delete_topic(&self.name)
    }

    /// exists reports whether the topic exists on the broker.
    pub fn exists(&self) -> bool {
        self.queue.topic_exists(&self.name)
    }

    /// publish fans the message into every attached subscription and
    /// returns the assigned message id.
    pub fn publish(&self, message: PubsubMessage) -> Result<String, Status> {
        self.queue.publish(&self.name, message)
    }

    /// subscriptions returns handles for the subscriptions attached to
    /// this topic.
    pub fn subscriptions(&self) -> Result<Vec<Subscription>, Status> {
        Ok(self
            .queue
            .list_topic_subscriptions(&self.name)?
            .into_iter()
            .map(|name| Subscription::new(name, self.queue.clone()))
            .collect())
    }
}
