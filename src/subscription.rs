use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::queue::MessageQueue;
use crate::status::Status;
use crate::subscriber::{MessageStream, ReceivedMessage, SubscriberOptions, SubscriptionEvent};

/// Subscription metadata.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Seconds a subscriber may hold a message before it should be acked.
    /// Zero falls back to the 10 second default.
    pub ack_deadline_seconds: i32,
    /// Deliver messages sharing an ordering key serially, in publish order.
    pub enable_message_ordering: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            ack_deadline_seconds: 10,
            enable_message_ordering: false,
        }
    }
}

/// Settings for [`Subscription::receive`].
pub struct ReceiveConfig {
    /// Concurrent handler workers draining the event channel.
    pub worker_count: usize,
    pub subscriber: SubscriberOptions,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            subscriber: SubscriberOptions::default(),
        }
    }
}

/// Subscription is a reference to a broker subscription.
pub struct Subscription {
    name: String,
    queue: Arc<MessageQueue>,
    stream: Mutex<Option<OpenStream>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("name", &self.name).finish()
    }
}

struct OpenStream {
    stream: MessageStream,
    events: async_channel::Receiver<SubscriptionEvent>,
}

impl Subscription {
    pub(crate) fn new(name: String, queue: Arc<MessageQueue>) -> Self {
        Self {
            name,
            queue,
            stream: Mutex::new(None),
        }
    }

    /// id returns the unique identifier of the subscription.
    pub fn id(&self) -> &str {
        &self.name
    }

    /// create creates the subscription on the given topic.
    pub fn create(&self, topic: &str, config: SubscriptionConfig) -> Result<(), Status> {
        self.queue.create_subscription(topic, &self.name, config)
    }

    /// delete deletes the subscription. The backlog and every outstanding
    /// message go with it.
    pub fn delete(&self) -> Result<(), Status> {
        self.queue.delete_subscription(&self.name)
    }

    /// exists reports whether the subscription exists on the broker.
    pub fn exists(&self) -> bool {
        self.queue.subscription_exists(&self.name)
    }

    /// config fetches the subscription's topic and current configuration.
    pub fn config(&self) -> Result<(String, SubscriptionConfig), Status> {
        self.queue.subscription_config(&self.name)
    }

    /// open starts the delivery stream and returns the event channel.
    ///
    /// Must be called from within a tokio runtime. Opening an already open
    /// subscription hands out another receiver for the same channel; the
    /// new options are ignored until the stream is closed and reopened.
    /// If the subscription does not exist the stream emits an error event
    /// instead of delivering.
    pub fn open(&self, options: SubscriberOptions) -> async_channel::Receiver<SubscriptionEvent> {
        let mut lock = self.stream.lock();
        if let Some(open) = lock.as_ref() {
            return open.events.clone();
        }
        let (tx, rx) = async_channel::unbounded();
        let stream = MessageStream::new(self.queue.clone(), self.name.clone(), options, tx);
        stream.start();
        *lock = Some(OpenStream {
            stream,
            events: rx.clone(),
        });
        rx
    }

    /// close stops the delivery stream with the configured close behavior
    /// and fires the `Close` event.
    pub async fn close(&self) {
        let open = self.stream.lock().take();
        if let Some(open) = open {
            open.stream.stop().await;
        }
    }

    /// pause halts pulls. Messages already handed out keep settling.
    pub fn pause(&self) {
        if let Some(open) = self.stream.lock().as_ref() {
            open.stream.pause();
        }
    }

    /// resume restarts pulls on a paused stream.
    pub fn resume(&self) {
        if let Some(open) = self.stream.lock().as_ref() {
            open.stream.resume();
        }
    }

    /// set_options applies new subscriber settings to the open stream.
    /// Flow control and lease bookkeeping restart fresh; messages already
    /// handed out stay tracked until settled.
    pub fn set_options(&self, options: SubscriberOptions) {
        if let Some(open) = self.stream.lock().as_ref() {
            open.stream.set_options(options);
        }
    }

    /// subscriber_options returns the open stream's current settings, as a
    /// base to merge changes into before [`Subscription::set_options`].
    pub fn subscriber_options(&self) -> Option<SubscriberOptions> {
        self.stream.lock().as_ref().map(|open| open.stream.options())
    }

    /// receive calls `f` for every delivered message until the
    /// cancellation token fires, then closes the stream.
    ///
    /// `worker_count` handlers run concurrently; with message ordering
    /// enabled, keyed messages still arrive serially because the next one
    /// is only delivered once its predecessor is acked.
    pub async fn receive<F, Fut>(
        &self,
        cancel: CancellationToken,
        f: F,
        config: Option<ReceiveConfig>,
    ) -> Result<(), Status>
    where
        F: Fn(ReceivedMessage) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.config()?;
        let config = config.unwrap_or_default();
        let events = self.open(config.subscriber.clone());

        let mut workers = Vec::with_capacity(config.worker_count);
        for _ in 0..config.worker_count {
            let events = events.clone();
            let f = f.clone();
            let name = self.name.clone();
            workers.push(tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        SubscriptionEvent::Message(message) => f(message).await,
                        SubscriptionEvent::Error(e) => {
                            tracing::error!("subscription error: {name}: {e}")
                        }
                        SubscriptionEvent::Close => break,
                    }
                }
                tracing::trace!("stop message receiver: {name}");
            }));
        }

        cancel.cancelled().await;
        self.close().await;
        for worker in workers {
            let _ = worker.await;
        }
        Ok(())
    }
}
