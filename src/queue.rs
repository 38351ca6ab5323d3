use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::message::{MessageBody, PubsubMessage, PulledMessage};
use crate::status::Status;
use crate::subscription::SubscriptionConfig;

pub(crate) const DEFAULT_ACK_DEADLINE_SECONDS: i32 = 10;

/// The broker core: owns every topic, every subscription backlog and every
/// in-flight table.
///
/// Constructed by [`crate::client::Client`] and shared behind an `Arc` by
/// all handles minted from that client. There is deliberately no global
/// instance; tests build one per scenario and drop it at the end.
///
/// The registry lock covers only name lookups and fan-out target
/// resolution. Backlog and in-flight mutation happens under the owning
/// subscription's lock, so independent subscriptions never contend.
pub(crate) struct MessageQueue {
    registry: Mutex<Registry>,
    next_message_id: AtomicU64,
    next_ack_id: AtomicU64,
}

#[derive(Default)]
struct Registry {
    topics: HashMap<String, TopicState>,
    subscriptions: HashMap<String, Arc<SubscriptionState>>,
}

#[derive(Default)]
struct TopicState {
    subscriptions: HashSet<String>,
}

pub(crate) struct SubscriptionState {
    pub(crate) topic: String,
    pub(crate) config: SubscriptionConfig,
    inner: Mutex<SubscriptionInner>,
    /// Signalled on publish and nack so pull tickers can wake early.
    pub(crate) notify: Notify,
}

#[derive(Default)]
struct SubscriptionInner {
    backlog: VecDeque<BacklogEntry>,
    in_flight: HashMap<String, BacklogEntry>,
    /// Set when the parent topic was deleted. The subscription survives
    /// but can no longer be pulled from.
    detached: bool,
}

struct BacklogEntry {
    body: Arc<MessageBody>,
    /// Number of deliveries so far.
    attempts: usize,
}

impl MessageQueue {
    pub(crate) fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_message_id: AtomicU64::new(1),
            next_ack_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn create_topic(&self, name: &str) -> Result<(), Status> {
        validate_id("topic", name)?;
        let mut registry = self.registry.lock();
        if registry.topics.contains_key(name) {
            return Err(Status::already_exists(format!("topic already exists: {name}")));
        }
        registry.topics.insert(name.to_string(), TopicState::default());
        tracing::debug!("created topic: {name}");
        Ok(())
    }

    /// Removes the topic. Its subscriptions become detached: they keep
    /// their backlog but any further pull fails FailedPrecondition, until
    /// they are deleted in their own right.
    pub(crate) fn delete_topic(&self, name: &str) -> Result<(), Status> {
        let mut registry = self.registry.lock();
        let topic = registry
            .topics
            .remove(name)
            .ok_or_else(|| Status::not_found(format!("topic not found: {name}")))?;
        for sub_name in &topic.subscriptions {
            if let Some(sub) = registry.subscriptions.get(sub_name) {
                sub.inner.lock().detached = true;
                sub.notify.notify_waiters();
            }
        }
        tracing::debug!("deleted topic: {name}");
        Ok(())
    }

    pub(crate) fn topic_exists(&self, name: &str) -> bool {
        self.registry.lock().topics.contains_key(name)
    }

    pub(crate) fn list_topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn list_topic_subscriptions(&self, topic: &str) -> Result<Vec<String>, Status> {
        let registry = self.registry.lock();
        let topic = registry
            .topics
            .get(topic)
            .ok_or_else(|| Status::not_found(format!("topic not found: {topic}")))?;
        let mut names: Vec<String> = topic.subscriptions.iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub(crate) fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        mut config: SubscriptionConfig,
    ) -> Result<(), Status> {
        validate_id("subscription", name)?;
        if config.ack_deadline_seconds <= 0 {
            config.ack_deadline_seconds = DEFAULT_ACK_DEADLINE_SECONDS;
        }
        let mut registry = self.registry.lock();
        if !registry.topics.contains_key(topic) {
            return Err(Status::not_found(format!("topic not found: {topic}")));
        }
        if registry.subscriptions.contains_key(name) {
            return Err(Status::already_exists(format!("subscription already exists: {name}")));
        }
        let state = Arc::new(SubscriptionState {
            topic: topic.to_string(),
            config,
            inner: Mutex::new(SubscriptionInner::default()),
            notify: Notify::new(),
        });
        registry.subscriptions.insert(name.to_string(), state);
        if let Some(topic) = registry.topics.get_mut(topic) {
            topic.subscriptions.insert(name.to_string());
        }
        tracing::debug!("created subscription: {name} on topic {topic}");
        Ok(())
    }

    /// Removes the subscription wholesale: backlog and in-flight leases go
    /// with it, so every outstanding message is implicitly nacked into
    /// oblivion.
    pub(crate) fn delete_subscription(&self, name: &str) -> Result<(), Status> {
        let mut registry = self.registry.lock();
        let state = registry
            .subscriptions
            .remove(name)
            .ok_or_else(|| Status::not_found(format!("subscription not found: {name}")))?;
        if let Some(topic) = registry.topics.get_mut(&state.topic) {
            topic.subscriptions.remove(name);
        }
        state.notify.notify_waiters();
        tracing::debug!("deleted subscription: {name}");
        Ok(())
    }

    pub(crate) fn subscription_exists(&self, name: &str) -> bool {
        self.registry.lock().subscriptions.contains_key(name)
    }

    pub(crate) fn list_subscriptions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().subscriptions.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn subscription_config(&self, name: &str) -> Result<(String, SubscriptionConfig), Status> {
        let state = self.subscription_state(name)?;
        Ok((state.topic.clone(), state.config.clone()))
    }

    pub(crate) fn subscription_state(&self, name: &str) -> Result<Arc<SubscriptionState>, Status> {
        self.registry
            .lock()
            .subscriptions
            .get(name)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("subscription not found: {name}")))
    }

    /// Fans one shared copy of the message into the backlog of every
    /// subscription attached to the topic and returns the assigned id.
    pub(crate) fn publish(&self, topic: &str, message: PubsubMessage) -> Result<String, Status> {
        let targets: Vec<Arc<SubscriptionState>> = {
            let registry = self.registry.lock();
            let state = registry
                .topics
                .get(topic)
                .ok_or_else(|| Status::not_found(format!("topic not found: {topic}")))?;
            state
                .subscriptions
                .iter()
                .filter_map(|name| registry.subscriptions.get(name).cloned())
                .collect()
        };

        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed).to_string();
        let body = Arc::new(MessageBody::new(id.clone(), message));
        tracing::trace!("published message: topic={topic} id={id}");

        for sub in targets {
            sub.inner.lock().backlog.push_back(BacklogEntry {
                body: body.clone(),
                attempts: 0,
            });
            sub.notify.notify_waiters();
        }
        Ok(id)
    }

    /// Dequeues up to `max_messages` from the backlog, moves them to the
    /// in-flight table under fresh ack ids and returns them. Non-blocking;
    /// an empty backlog yields an empty vec.
    pub(crate) fn pull(&self, subscription: &str, max_messages: usize) -> Result<Vec<PulledMessage>, Status> {
        let state = self.subscription_state(subscription)?;
        let mut inner = state.inner.lock();
        if inner.detached {
            return Err(Status::failed_precondition(format!(
                "subscription is detached from its topic: {subscription}"
            )));
        }
        let mut pulled = Vec::new();
        while pulled.len() < max_messages {
            let Some(entry) = inner.backlog.pop_front() else {
                break;
            };
            let ack_id = self.next_ack_id.fetch_add(1, Ordering::Relaxed).to_string();
            let delivery_attempt = entry.attempts + 1;
            pulled.push(PulledMessage {
                body: entry.body.clone(),
                ack_id: ack_id.clone(),
                delivery_attempt,
            });
            inner.in_flight.insert(
                ack_id,
                BacklogEntry {
                    body: entry.body,
                    attempts: delivery_attempt,
                },
            );
        }
        Ok(pulled)
    }

    /// Settles deliveries. Unknown ack ids are silently skipped, which
    /// makes double acks and ack-after-nack races first-wins no-ops.
    pub(crate) fn ack(&self, subscription: &str, ack_ids: &[String]) -> Result<(), Status> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let state = self.subscription_state(subscription)?;
        let mut inner = state.inner.lock();
        for ack_id in ack_ids {
            if inner.in_flight.remove(ack_id).is_some() {
                tracing::trace!("acked: subscription={subscription} ack_id={ack_id}");
            }
        }
        Ok(())
    }

    /// Returns deliveries to the backlog tail with their attempt count
    /// carried forward, so the next pull sees an incremented
    /// delivery_attempt. Unknown ack ids are silently skipped.
    pub(crate) fn nack(&self, subscription: &str, ack_ids: &[String]) -> Result<(), Status> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let state = self.subscription_state(subscription)?;
        let mut redelivered = 0;
        {
            let mut inner = state.inner.lock();
            for ack_id in ack_ids {
                if let Some(entry) = inner.in_flight.remove(ack_id) {
                    inner.backlog.push_back(entry);
                    redelivered += 1;
                }
            }
        }
        if redelivered > 0 {
            tracing::trace!("nacked {redelivered} messages: subscription={subscription}");
            state.notify.notify_waiters();
        }
        Ok(())
    }

    /// Zero seconds is a nack. Positive deadlines are advisory: lease
    /// expiry is enforced stream-side, the queue keeps the in-flight entry
    /// either way.
    pub(crate) fn modify_ack_deadline(
        &self,
        subscription: &str,
        ack_ids: &[String],
        seconds: i32,
    ) -> Result<(), Status> {
        if seconds <= 0 {
            return self.nack(subscription, ack_ids);
        }
        self.subscription_state(subscription).map(|_| ())
    }

    #[cfg(test)]
    fn backlog_len(&self, subscription: &str) -> usize {
        self.subscription_state(subscription)
            .map(|s| s.inner.lock().backlog.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn in_flight_len(&self, subscription: &str) -> usize {
        self.subscription_state(subscription)
            .map(|s| s.inner.lock().in_flight.len())
            .unwrap_or(0)
    }
}

/// Resource ids follow the Pub/Sub rules: start with a letter, 3 to 255
/// characters from `[A-Za-z0-9-_.~+%]`, and must not start with `goog`.
fn validate_id(kind: &str, id: &str) -> Result<(), Status> {
    let len_ok = (3..=255).contains(&id.len());
    let starts_with_letter = id.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let chars_ok = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.~+%".contains(c));
    if len_ok && starts_with_letter && chars_ok && !id.starts_with("goog") {
        Ok(())
    } else {
        Err(Status::invalid_argument(format!("invalid {kind} id: {id}")))
    }
}
