use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::queue::MessageQueue;
use crate::status::Status;

/// Batching settings for the ack path.
#[derive(Debug, Clone)]
pub struct AckOptions {
    /// Flush once this many completions are pending.
    pub max_messages: usize,
    /// Flush this long after the first pending completion. Zero flushes on
    /// every call.
    pub max_milliseconds: u64,
}

impl Default for AckOptions {
    fn default() -> Self {
        Self {
            max_messages: 100,
            max_milliseconds: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckKind {
    Ack,
    Nack,
}

/// Resolves once the batched queue call for one ack or nack has been
/// issued.
pub(crate) struct Awaiter {
    consumer: oneshot::Receiver<Result<(), Status>>,
}

impl Awaiter {
    fn new(consumer: oneshot::Receiver<Result<(), Status>>) -> Self {
        Self { consumer }
    }

    pub(crate) async fn get(self) -> Result<(), Status> {
        match self.consumer.await {
            Ok(result) => result,
            Err(_) => Err(Status::cancelled("ack batch was dropped before flushing")),
        }
    }
}

/// Coalesces ack and nack calls for one subscription stream into batched
/// queue operations, flushing on a size or time trigger.
///
/// Ack and nack batches are independent so a nack never waits behind a
/// full ack batch. Every submission gets its own completion signal,
/// resolved exactly once at flush.
pub(crate) struct AckManager {
    inner: Arc<AckInner>,
}

struct AckInner {
    queue: Arc<MessageQueue>,
    subscription: String,
    options: AckOptions,
    acks: Mutex<Batch>,
    nacks: Mutex<Batch>,
}

#[derive(Default)]
struct Batch {
    pending: Vec<(String, oneshot::Sender<Result<(), Status>>)>,
    timer: Option<JoinHandle<()>>,
}

impl AckManager {
    pub(crate) fn new(queue: Arc<MessageQueue>, subscription: String, options: AckOptions) -> Self {
        Self {
            inner: Arc::new(AckInner {
                queue,
                subscription,
                options,
                acks: Mutex::new(Batch::default()),
                nacks: Mutex::new(Batch::default()),
            }),
        }
    }

    pub(crate) fn ack(&self, ack_id: &str) -> Awaiter {
        self.submit(AckKind::Ack, ack_id)
    }

    pub(crate) fn nack(&self, ack_id: &str) -> Awaiter {
        self.submit(AckKind::Nack, ack_id)
    }

    fn submit(&self, kind: AckKind, ack_id: &str) -> Awaiter {
        let (producer, consumer) = oneshot::channel();
        let flush_now = {
            let mut batch = self.inner.batch(kind).lock();
            batch.pending.push((ack_id.to_string(), producer));
            if batch.pending.len() >= self.inner.options.max_messages
                || self.inner.options.max_milliseconds == 0
            {
                true
            } else {
                if batch.timer.is_none() {
                    batch.timer = Some(self.spawn_timer(kind));
                }
                false
            }
        };
        if flush_now {
            if let Err(e) = self.inner.flush(kind) {
                tracing::error!("failed to flush {kind:?} batch: {e}");
            }
        }
        Awaiter::new(consumer)
    }

    fn spawn_timer(&self, kind: AckKind) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let delay = Duration::from_millis(self.inner.options.max_milliseconds);
        tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = inner.flush(kind) {
                tracing::error!("failed to flush {kind:?} batch: {e}");
            }
        })
    }

    /// Drains both batches. The first error is reported after every
    /// pending completion has been resolved.
    pub(crate) fn flush(&self) -> Result<(), Status> {
        let acks = self.inner.flush(AckKind::Ack);
        let nacks = self.inner.flush(AckKind::Nack);
        acks.and(nacks)
    }

    pub(crate) fn close(&self) -> Result<(), Status> {
        self.flush()
    }
}

impl AckInner {
    fn batch(&self, kind: AckKind) -> &Mutex<Batch> {
        match kind {
            AckKind::Ack => &self.acks,
            AckKind::Nack => &self.nacks,
        }
    }

    fn flush(&self, kind: AckKind) -> Result<(), Status> {
        let pending = {
            let mut batch = self.batch(kind).lock();
            if let Some(timer) = batch.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut batch.pending)
        };
        if pending.is_empty() {
            return Ok(());
        }

        let ack_ids: Vec<String> = pending.iter().map(|(id, _)| id.clone()).collect();
        let result = match kind {
            AckKind::Ack => self.queue.ack(&self.subscription, &ack_ids),
            AckKind::Nack => self.queue.nack(&self.subscription, &ack_ids),
        };
        // Completion signals resolve in submission order.
        for (_, producer) in pending {
            let _ = producer.send(result.clone());
        }
        result
    }
}

impl Drop for AckInner {
    fn drop(&mut self) {
        for batch in [&mut self.acks, &mut self.nacks] {
            if let Some(timer) = batch.get_mut().timer.take() {
                timer.abort();
            }
        }
    }
}
