use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Leases whose deadline is at most this far away are extension candidates.
pub(crate) const EXTENSION_THRESHOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub(crate) struct LeaseConfig {
    /// Initial deadline, taken from the subscription's ack deadline.
    pub ack_deadline: Duration,
    /// Lower bound on any single extension.
    pub min_ack_deadline: Duration,
    /// Upper bound on any single extension.
    pub max_ack_deadline: Duration,
    /// Cumulative extension budget per message. Zero disables extension.
    pub max_extension_time: Duration,
}

#[derive(Debug)]
struct Lease {
    start: Instant,
    deadline: Instant,
}

/// Tracks the ack deadline of every message a stream has handed out and
/// decides which deadlines to push back before they lapse.
#[derive(Debug)]
pub(crate) struct LeaseManager {
    config: LeaseConfig,
    leases: HashMap<String, Lease>,
}

impl LeaseManager {
    pub(crate) fn new(config: LeaseConfig) -> Self {
        Self {
            config,
            leases: HashMap::new(),
        }
    }

    pub(crate) fn add_lease(&mut self, ack_id: &str) {
        let now = Instant::now();
        self.leases.insert(
            ack_id.to_string(),
            Lease {
                start: now,
                deadline: now + self.config.ack_deadline,
            },
        );
    }

    /// Ack ids whose deadline falls inside the extension window and whose
    /// cumulative budget is not spent. Leases past the budget are left to
    /// lapse and are not returned.
    pub(crate) fn leases_needing_extension(&self, now: Instant) -> Vec<String> {
        self.leases
            .iter()
            .filter(|(_, lease)| {
                if now.saturating_duration_since(lease.start) >= self.config.max_extension_time {
                    return false;
                }
                match lease.deadline.checked_duration_since(now) {
                    Some(until) => until > Duration::ZERO && until <= EXTENSION_THRESHOLD,
                    None => false,
                }
            })
            .map(|(ack_id, _)| ack_id.clone())
            .collect()
    }

    /// Push the deadline back by up to `seconds`, clamped to the
    /// per-extension bounds and the remaining budget. Returns the granted
    /// extension, or `None` when the budget is exhausted and the lease has
    /// been dropped.
    pub(crate) fn extend_deadline(&mut self, ack_id: &str, seconds: i32) -> Option<Duration> {
        let now = Instant::now();
        let lease = self.leases.get_mut(ack_id)?;
        let elapsed = now.saturating_duration_since(lease.start);
        if elapsed >= self.config.max_extension_time {
            tracing::debug!("extension budget exhausted, dropping lease: ack_id={ack_id}");
            self.leases.remove(ack_id);
            return None;
        }
        let budget = self.config.max_extension_time - elapsed;
        let granted = Duration::from_secs(seconds.max(0) as u64)
            .clamp(self.config.min_ack_deadline, self.config.max_ack_deadline)
            .min(budget);
        lease.deadline = now + granted;
        Some(granted)
    }

    /// Seconds a periodic extension asks for: the subscription's ack
    /// deadline clamped to the per-extension bounds.
    pub(crate) fn extension_seconds(&self) -> i32 {
        self.config
            .ack_deadline
            .clamp(self.config.min_ack_deadline, self.config.max_ack_deadline)
            .as_secs() as i32
    }

    pub(crate) fn remove_lease(&mut self, ack_id: &str) {
        self.leases.remove(ack_id);
    }

    pub(crate) fn clear(&mut self) {
        self.leases.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.leases.len()
    }
}
