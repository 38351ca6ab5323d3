use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prost_types::Timestamp;
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub use crate::ack::AckOptions;
pub use crate::flow::FlowControlOptions;

use crate::ack::{AckKind, AckManager, Awaiter};
use crate::flow::FlowControl;
use crate::lease::{LeaseConfig, LeaseManager};
use crate::message::PulledMessage;
use crate::queue::{MessageQueue, SubscriptionState, DEFAULT_ACK_DEADLINE_SECONDS};
use crate::status::Status;

const LEASE_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Settings for the streaming pull loop.
#[derive(Debug, Clone)]
pub struct StreamingOptions {
    /// Period of each pull ticker.
    pub pull_interval: Duration,
    /// Maximum messages taken from the backlog per pull.
    pub max_pull_size: usize,
    /// Number of parallel pull tickers.
    pub max_streams: usize,
    /// Stream lifetime. Zero disables the timeout.
    pub timeout: Duration,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            pull_interval: Duration::from_millis(10),
            max_pull_size: 100,
            max_streams: 5,
            timeout: Duration::ZERO,
        }
    }
}

/// What to do with outstanding messages when the stream closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    /// Wait for handlers to settle every delivered message.
    Wait,
    /// Immediately return every outstanding message to the backlog.
    Nack,
}

#[derive(Debug, Clone)]
pub struct CloseOptions {
    pub behavior: CloseBehavior,
    /// Upper bound on the `Wait` drain. Zero falls back to
    /// `max_extension_time`.
    pub timeout: Duration,
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self {
            behavior: CloseBehavior::Wait,
            timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    pub flow_control: FlowControlOptions,
    /// Lower bound on any single lease extension.
    pub min_ack_deadline: Duration,
    /// Upper bound on any single lease extension.
    pub max_ack_deadline: Duration,
    /// Cumulative lease extension budget per message. Zero disables
    /// extension.
    pub max_extension_time: Duration,
    pub streaming: StreamingOptions,
    pub close: CloseOptions,
    pub ack_manager: AckOptions,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            flow_control: FlowControlOptions::default(),
            min_ack_deadline: Duration::from_secs(10),
            max_ack_deadline: Duration::from_secs(600),
            max_extension_time: Duration::from_secs(3600),
            streaming: StreamingOptions::default(),
            close: CloseOptions::default(),
            ack_manager: AckOptions::default(),
        }
    }
}

/// Events emitted on a subscription's channel while it is open.
#[derive(Debug)]
pub enum SubscriptionEvent {
    Message(ReceivedMessage),
    Error(Status),
    Close,
}

/// One delivered message, handed to user code.
///
/// Settling the delivery goes back through the owning stream so flow
/// control, leases and ordering advance together. Settling twice is a
/// no-op past the first call.
#[derive(Clone)]
pub struct ReceivedMessage {
    message: PulledMessage,
    subscription: String,
    queue: Arc<MessageQueue>,
    stream: Weak<StreamInner>,
}

impl ReceivedMessage {
    fn new(inner: &StreamInner, message: PulledMessage) -> Self {
        Self {
            message,
            subscription: inner.subscription.clone(),
            queue: inner.queue.clone(),
            stream: inner.weak.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.message.body.id
    }

    pub fn data(&self) -> &[u8] {
        &self.message.body.data
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.message.body.attributes
    }

    pub fn publish_time(&self) -> &Timestamp {
        &self.message.body.publish_time
    }

    pub fn ordering_key(&self) -> Option<&str> {
        let key = self.message.body.ordering_key.as_str();
        (!key.is_empty()).then_some(key)
    }

    /// 1 on first delivery, incremented on each redelivery.
    pub fn delivery_attempt(&self) -> usize {
        self.message.delivery_attempt
    }

    pub fn ack_id(&self) -> &str {
        &self.message.ack_id
    }

    /// Byte count charged to flow control.
    pub fn len(&self) -> usize {
        self.message.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completes when the batched queue acknowledge has been issued.
    pub async fn ack(&self) -> Result<(), Status> {
        self.settle(AckKind::Ack).await
    }

    /// Returns the message to the backlog for redelivery.
    pub async fn nack(&self) -> Result<(), Status> {
        self.settle(AckKind::Nack).await
    }

    async fn settle(&self, kind: AckKind) -> Result<(), Status> {
        match self.stream.upgrade() {
            Some(stream) => match stream.finish(&self.message.ack_id, kind) {
                Some(awaiter) => awaiter.get().await,
                None => Ok(()),
            },
            // The stream is gone; settle straight with the queue.
            None => {
                let ack_ids = [self.message.ack_id.clone()];
                match kind {
                    AckKind::Ack => self.queue.ack(&self.subscription, &ack_ids),
                    AckKind::Nack => self.queue.nack(&self.subscription, &ack_ids),
                }
            }
        }
    }

    /// Zero seconds is a nack.
    pub async fn modify_ack_deadline(&self, seconds: i32) -> Result<(), Status> {
        if seconds <= 0 {
            return self.nack().await;
        }
        if let Some(stream) = self.stream.upgrade() {
            stream.extend_lease(&self.message.ack_id, seconds);
        }
        self.queue
            .modify_ack_deadline(&self.subscription, &[self.message.ack_id.clone()], seconds)
    }
}

impl fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("id", &self.id())
            .field("ack_id", &self.ack_id())
            .field("delivery_attempt", &self.delivery_attempt())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Stopped,
    Running,
    Paused,
}

struct InFlightEntry {
    bytes: usize,
    /// Set for deliveries that hold their ordering key.
    ordering_key: Option<String>,
}

struct StreamState {
    mode: RunMode,
    flow: FlowControl,
    leases: LeaseManager,
    /// Pulled but deferred by flow control, in pull order.
    pending: VecDeque<PulledMessage>,
    in_flight: HashMap<String, InFlightEntry>,
    /// Per ordering key, buffered messages waiting for the key to go idle.
    ordering: HashMap<String, VecDeque<PulledMessage>>,
    /// Keys with a delivery outstanding. A nacked head keeps its key here
    /// until the redelivery arrives.
    processing_keys: HashSet<String>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    pull_error_emitted: bool,
    started: bool,
}

/// Per-subscription delivery engine.
///
/// Runs `max_streams` pull tickers against the queue, routes messages
/// through flow control and the ordering queues, keeps leases extended and
/// emits deliveries on the subscription's event channel.
pub(crate) struct MessageStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    weak: Weak<StreamInner>,
    queue: Arc<MessageQueue>,
    subscription: String,
    ordering_enabled: bool,
    ack_deadline: Duration,
    ack_manager: AckManager,
    options: Mutex<SubscriberOptions>,
    state: Mutex<StreamState>,
    events: async_channel::Sender<SubscriptionEvent>,
}

impl MessageStream {
    pub(crate) fn new(
        queue: Arc<MessageQueue>,
        subscription: String,
        options: SubscriberOptions,
        events: async_channel::Sender<SubscriptionEvent>,
    ) -> Self {
        let (ack_deadline, ordering_enabled) = match queue.subscription_config(&subscription) {
            Ok((_, config)) => (
                Duration::from_secs(config.ack_deadline_seconds.max(1) as u64),
                config.enable_message_ordering,
            ),
            Err(_) => (Duration::from_secs(DEFAULT_ACK_DEADLINE_SECONDS as u64), false),
        };
        let lease_config = LeaseConfig {
            ack_deadline,
            min_ack_deadline: options.min_ack_deadline,
            max_ack_deadline: options.max_ack_deadline,
            max_extension_time: options.max_extension_time,
        };
        let inner = Arc::new_cyclic(|weak| StreamInner {
            weak: weak.clone(),
            queue: queue.clone(),
            subscription: subscription.clone(),
            ordering_enabled,
            ack_deadline,
            ack_manager: AckManager::new(queue, subscription, options.ack_manager.clone()),
            state: Mutex::new(StreamState {
                mode: RunMode::Stopped,
                flow: FlowControl::new(options.flow_control.clone()),
                leases: LeaseManager::new(lease_config),
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
                ordering: HashMap::new(),
                processing_keys: HashSet::new(),
                tasks: Vec::new(),
                cancel: CancellationToken::new(),
                pull_error_emitted: false,
                started: false,
            }),
            options: Mutex::new(options),
            events,
        });
        Self { inner }
    }

    /// Launches the pull tickers, lease ticker and lifetime timeout.
    /// Idempotent; a paused stream resumes.
    pub(crate) fn start(&self) {
        let inner = &self.inner;
        {
            let mut st = inner.state.lock();
            match st.mode {
                RunMode::Running => return,
                RunMode::Paused => {
                    st.mode = RunMode::Running;
                    return;
                }
                RunMode::Stopped => {}
            }
        }

        let sub_state = match inner.queue.subscription_state(&inner.subscription) {
            Ok(state) => state,
            Err(e) => {
                let events = inner.events.clone();
                tokio::spawn(async move {
                    let _ = events.send(SubscriptionEvent::Error(e)).await;
                });
                return;
            }
        };

        let streaming = inner.options.lock().streaming.clone();
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(streaming.max_streams + 2);

        for _ in 0..streaming.max_streams {
            tasks.push(Self::spawn_pull_ticker(
                inner.clone(),
                sub_state.clone(),
                cancel.clone(),
                streaming.pull_interval,
            ));
        }
        tasks.push(Self::spawn_lease_ticker(inner.clone(), cancel.clone()));
        if streaming.timeout > Duration::ZERO {
            tasks.push(Self::spawn_lifetime_timeout(inner.clone(), cancel.clone(), streaming.timeout));
        }

        {
            let mut st = inner.state.lock();
            st.mode = RunMode::Running;
            st.cancel = cancel;
            st.tasks = tasks;
            st.pull_error_emitted = false;
            st.started = true;
        }
        tracing::debug!(
            "started stream: {} ({} pull tickers)",
            inner.subscription,
            streaming.max_streams
        );
    }

    fn spawn_pull_ticker(
        inner: Arc<StreamInner>,
        sub_state: Arc<SubscriptionState>,
        cancel: CancellationToken,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {}
                    _ = sub_state.notify.notified() => {}
                }
                inner.pull_iteration();
            }
        })
    }

    fn spawn_lease_ticker(inner: Arc<StreamInner>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(LEASE_CHECK_INTERVAL) => {}
                }
                inner.extend_leases();
            }
        })
    }

    fn spawn_lifetime_timeout(
        inner: Arc<StreamInner>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(timeout) => {
                    tracing::warn!("stream lifetime exceeded: {}", inner.subscription);
                    inner.emit_error(Status::deadline_exceeded(format!(
                        "stream timed out: {}",
                        inner.subscription
                    )));
                    inner.shutdown().await;
                }
            }
        })
    }

    pub(crate) async fn stop(&self) {
        self.inner.shutdown().await;
    }

    /// Pulls halt; handlers keep settling what is already out.
    pub(crate) fn pause(&self) {
        let mut st = self.inner.state.lock();
        if st.mode == RunMode::Running {
            st.mode = RunMode::Paused;
            tracing::debug!("paused stream: {}", self.inner.subscription);
        }
    }

    pub(crate) fn resume(&self) {
        let mut st = self.inner.state.lock();
        if st.mode == RunMode::Paused {
            st.mode = RunMode::Running;
            tracing::debug!("resumed stream: {}", self.inner.subscription);
        }
    }

    /// Swaps in fresh flow control and lease bookkeeping built from the
    /// new settings. Messages already out stay tracked until settled;
    /// their release saturates at zero on the new counters.
    pub(crate) fn set_options(&self, options: SubscriberOptions) {
        let lease_config = LeaseConfig {
            ack_deadline: self.inner.ack_deadline,
            min_ack_deadline: options.min_ack_deadline,
            max_ack_deadline: options.max_ack_deadline,
            max_extension_time: options.max_extension_time,
        };
        {
            let mut st = self.inner.state.lock();
            st.flow = FlowControl::new(options.flow_control.clone());
            st.leases = LeaseManager::new(lease_config);
        }
        *self.inner.options.lock() = options;
    }

    pub(crate) fn options(&self) -> SubscriberOptions {
        self.inner.options.lock().clone()
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock();
        if st.mode != RunMode::Stopped {
            tracing::warn!(
                "stream dropped without close, cancelling pull tasks: {}",
                self.inner.subscription
            );
            st.mode = RunMode::Stopped;
            st.cancel.cancel();
        }
    }
}

impl StreamInner {
    /// One iteration of the pull loop: drain deferred work, then pull a
    /// bounded batch and route it.
    fn pull_iteration(&self) {
        let max_pull_size = self.options.lock().streaming.max_pull_size;
        let mut deliveries = Vec::new();
        let mut pull_error = None;
        {
            let mut st = self.state.lock();
            if st.mode != RunMode::Running {
                return;
            }
            self.drain_locked(&mut st, &mut deliveries);

            let max_to_pull = if st.flow.options().allow_excess_messages {
                max_pull_size
            } else {
                max_pull_size.min(st.flow.available_messages())
            };
            if max_to_pull > 0 {
                st.flow.start_batch_pull();
                match self.queue.pull(&self.subscription, max_to_pull) {
                    Ok(messages) => {
                        for message in messages {
                            self.route_message(&mut st, message, &mut deliveries);
                        }
                        st.pull_error_emitted = false;
                    }
                    Err(e) => {
                        // One event per error streak, not one per tick.
                        if !st.pull_error_emitted {
                            st.pull_error_emitted = true;
                            pull_error = Some(e);
                        }
                    }
                }
                st.flow.end_batch_pull();
            }
        }
        self.emit_messages(deliveries);
        if let Some(e) = pull_error {
            self.emit_error(e);
        }
    }

    /// Delivers deferred messages while flow control accepts them, then
    /// retries ordering keys parked by flow control.
    fn drain_locked(&self, st: &mut StreamState, out: &mut Vec<PulledMessage>) {
        loop {
            let fits = match st.pending.front() {
                Some(message) => st.flow.can_accept(message.body.len()),
                None => break,
            };
            if !fits {
                break;
            }
            if let Some(message) = st.pending.pop_front() {
                self.route_message(st, message, out);
            }
        }
        let idle_keys: Vec<String> = st
            .ordering
            .keys()
            .filter(|key| !st.processing_keys.contains(*key))
            .cloned()
            .collect();
        for key in idle_keys {
            self.advance_key(st, &key, out);
        }
    }

    fn route_message(&self, st: &mut StreamState, message: PulledMessage, out: &mut Vec<PulledMessage>) {
        let key = message.body.ordering_key.clone();
        if self.ordering_enabled && !key.is_empty() {
            // Keyed messages always buffer in their ordering queue so
            // per-key order survives flow-control deferrals; advance_key
            // enforces the caps at delivery time.
            if message.delivery_attempt > 1 {
                // Redelivered head: the previous lease for this key is
                // gone, so unblock the key and put the message first.
                st.processing_keys.remove(&key);
                st.ordering.entry(key.clone()).or_default().push_front(message);
            } else {
                st.ordering.entry(key.clone()).or_default().push_back(message);
            }
            if !st.processing_keys.contains(&key) {
                self.advance_key(st, &key, out);
            }
        } else if st.flow.can_accept(message.body.len()) {
            self.deliver(st, message, None, out);
        } else {
            st.pending.push_back(message);
        }
    }

    /// Hands out the next buffered message for an idle key, if flow
    /// control accepts it.
    fn advance_key(&self, st: &mut StreamState, key: &str, out: &mut Vec<PulledMessage>) {
        let fits = match st.ordering.get(key).and_then(|queue| queue.front()) {
            Some(head) => st.flow.can_accept(head.body.len()),
            None => false,
        };
        if !fits {
            return;
        }
        let message = match st.ordering.get_mut(key).and_then(|queue| queue.pop_front()) {
            Some(message) => message,
            None => return,
        };
        if st.ordering.get(key).is_some_and(|queue| queue.is_empty()) {
            st.ordering.remove(key);
        }
        st.processing_keys.insert(key.to_string());
        self.deliver(st, message, Some(key.to_string()), out);
    }

    fn deliver(
        &self,
        st: &mut StreamState,
        message: PulledMessage,
        ordering_key: Option<String>,
        out: &mut Vec<PulledMessage>,
    ) {
        st.flow.add_message(message.body.len());
        st.leases.add_lease(&message.ack_id);
        st.in_flight.insert(
            message.ack_id.clone(),
            InFlightEntry {
                bytes: message.body.len(),
                ordering_key,
            },
        );
        out.push(message);
    }

    /// Settles one delivery: ack-manager enqueue first, then release flow
    /// control, lease and the in-flight slot, then let deferred work
    /// advance. Returns `None` when the delivery was already settled.
    fn finish(&self, ack_id: &str, kind: AckKind) -> Option<Awaiter> {
        let entry = self.state.lock().in_flight.remove(ack_id)?;
        let awaiter = match kind {
            AckKind::Ack => self.ack_manager.ack(ack_id),
            AckKind::Nack => self.ack_manager.nack(ack_id),
        };
        {
            let mut st = self.state.lock();
            st.flow.remove_message(entry.bytes);
            st.leases.remove_lease(ack_id);
            if let Some(key) = entry.ordering_key {
                // An ack frees the key for the next buffered message. A
                // nack keeps it blocked until the redelivery arrives.
                if kind == AckKind::Ack {
                    st.processing_keys.remove(&key);
                }
            }
        }
        self.drain_deferred();
        Some(awaiter)
    }

    fn drain_deferred(&self) {
        let mut deliveries = Vec::new();
        {
            let mut st = self.state.lock();
            if st.mode != RunMode::Running {
                return;
            }
            self.drain_locked(&mut st, &mut deliveries);
        }
        self.emit_messages(deliveries);
    }

    fn extend_lease(&self, ack_id: &str, seconds: i32) {
        let mut st = self.state.lock();
        st.leases.extend_deadline(ack_id, seconds);
    }

    /// Lease ticker body: extend every lease close to its deadline, both
    /// locally and (advisorily) at the queue.
    fn extend_leases(&self) {
        let (ack_ids, seconds) = {
            let mut st = self.state.lock();
            if st.mode == RunMode::Stopped {
                return;
            }
            let seconds = st.leases.extension_seconds();
            let candidates = st.leases.leases_needing_extension(Instant::now());
            let mut granted = Vec::with_capacity(candidates.len());
            for ack_id in candidates {
                if st.leases.extend_deadline(&ack_id, seconds).is_some() {
                    granted.push(ack_id);
                }
            }
            (granted, seconds)
        };
        if ack_ids.is_empty() {
            return;
        }
        tracing::trace!(
            "extending {} leases by {seconds}s: {}",
            ack_ids.len(),
            self.subscription
        );
        if let Err(e) = self.queue.modify_ack_deadline(&self.subscription, &ack_ids, seconds) {
            tracing::warn!("failed to extend ack deadlines: {e}");
        }
    }

    async fn shutdown(&self) {
        let (close, max_extension) = {
            let options = self.options.lock();
            (options.close.clone(), options.max_extension_time)
        };
        {
            let mut st = self.state.lock();
            if st.mode == RunMode::Stopped {
                let never_started = !st.started;
                drop(st);
                // A stream that never launched still owes its consumers a
                // close event.
                if never_started && !self.events.is_closed() {
                    let _ = self.events.try_send(SubscriptionEvent::Close);
                    self.events.close();
                }
                return;
            }
            st.mode = RunMode::Stopped;
            st.cancel.cancel();
            st.tasks.clear();
        }
        tracing::debug!("stopping stream: {}", self.subscription);

        match close.behavior {
            CloseBehavior::Nack => self.nack_outstanding(),
            CloseBehavior::Wait => {
                let limit = if close.timeout > Duration::ZERO {
                    close.timeout
                } else {
                    max_extension
                };
                self.wait_for_outstanding(Instant::now() + limit).await;
            }
        }

        if let Err(e) = self.ack_manager.close() {
            tracing::error!("failed to flush acks on close: {e}");
        }
        {
            let mut st = self.state.lock();
            st.pending.clear();
            st.ordering.clear();
            st.processing_keys.clear();
            st.in_flight.clear();
            st.leases.clear();
            st.flow = FlowControl::new(st.flow.options().clone());
        }
        let _ = self.events.try_send(SubscriptionEvent::Close);
        self.events.close();
        tracing::debug!("stream stopped: {}", self.subscription);
    }

    /// Returns every delivered, deferred and key-buffered message to the
    /// backlog in one batch.
    fn nack_outstanding(&self) {
        let ack_ids = {
            let mut st = self.state.lock();
            Self::take_outstanding(&mut st)
        };
        if ack_ids.is_empty() {
            return;
        }
        tracing::debug!(
            "nacking {} outstanding messages: {}",
            ack_ids.len(),
            self.subscription
        );
        if let Err(e) = self.queue.nack(&self.subscription, &ack_ids) {
            tracing::error!("failed to nack outstanding messages: {e}");
        }
    }

    /// Polls until handlers settle everything the stream handed out, still
    /// letting buffered messages flow as capacity frees up. On deadline
    /// the stragglers are nacked so they stay deliverable.
    async fn wait_for_outstanding(&self, deadline: Instant) {
        loop {
            let (deliveries, empty) = {
                let mut st = self.state.lock();
                let mut out = Vec::new();
                self.drain_locked(&mut st, &mut out);
                let empty = st.in_flight.is_empty() && st.pending.is_empty() && st.ordering.is_empty();
                (out, empty)
            };
            self.emit_messages(deliveries);
            if empty {
                return;
            }
            if Instant::now() >= deadline {
                self.emit_error(Status::deadline_exceeded(format!(
                    "close timed out with messages outstanding: {}",
                    self.subscription
                )));
                self.nack_outstanding();
                return;
            }
            sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    fn take_outstanding(st: &mut StreamState) -> Vec<String> {
        let mut ack_ids: Vec<String> = st.in_flight.keys().cloned().collect();
        ack_ids.extend(st.pending.iter().map(|m| m.ack_id.clone()));
        for queue in st.ordering.values() {
            ack_ids.extend(queue.iter().map(|m| m.ack_id.clone()));
        }
        st.in_flight.clear();
        st.pending.clear();
        st.ordering.clear();
        st.processing_keys.clear();
        st.leases.clear();
        st.flow = FlowControl::new(st.flow.options().clone());
        ack_ids
    }

    fn emit_messages(&self, messages: Vec<PulledMessage>) {
        for message in messages {
            tracing::trace!(
                "delivering: subscription={} id={} attempt={}",
                self.subscription,
                message.body.id,
                message.delivery_attempt
            );
            let received = ReceivedMessage::new(self, message);
            if self.events.try_send(SubscriptionEvent::Message(received)).is_err() {
                tracing::trace!("event channel closed, dropping delivery: {}", self.subscription);
            }
        }
    }

    fn emit_error(&self, error: Status) {
        if self.events.try_send(SubscriptionEvent::Error(error)).is_err() {
            tracing::trace!("event channel closed: {}", self.subscription);
        }
    }
}
