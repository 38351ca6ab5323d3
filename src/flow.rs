/// Flow control settings for one open subscription stream.
#[derive(Debug, Clone)]
pub struct FlowControlOptions {
    /// Maximum number of messages handed to user code that have not yet
    /// been acked or nacked.
    pub max_messages: usize,
    /// Maximum payload bytes outstanding at once.
    pub max_bytes: usize,
    /// Let one in-progress batch pull finish even when it overshoots
    /// `max_messages`. The byte ceiling always binds.
    pub allow_excess_messages: bool,
}

impl Default for FlowControlOptions {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            max_bytes: 100 * 1024 * 1024,
            allow_excess_messages: false,
        }
    }
}

/// Counts outstanding deliveries for one stream and answers whether one
/// more message of a given size may be handed out.
#[derive(Debug)]
pub(crate) struct FlowControl {
    options: FlowControlOptions,
    in_flight_messages: usize,
    in_flight_bytes: usize,
    in_batch_pull: bool,
}

impl FlowControl {
    pub(crate) fn new(options: FlowControlOptions) -> Self {
        Self {
            options,
            in_flight_messages: 0,
            in_flight_bytes: 0,
            in_batch_pull: false,
        }
    }

    pub(crate) fn can_accept(&self, bytes: usize) -> bool {
        if self.options.allow_excess_messages && self.in_batch_pull {
            return self.in_flight_bytes + bytes <= self.options.max_bytes;
        }
        self.in_flight_messages < self.options.max_messages
            && self.in_flight_bytes + bytes <= self.options.max_bytes
    }

    /// Brackets one pull cycle so `allow_excess_messages` only relaxes the
    /// message cap for the batch being committed.
    pub(crate) fn start_batch_pull(&mut self) {
        self.in_batch_pull = true;
    }

    pub(crate) fn end_batch_pull(&mut self) {
        self.in_batch_pull = false;
    }

    pub(crate) fn add_message(&mut self, bytes: usize) {
        self.in_flight_messages += 1;
        self.in_flight_bytes += bytes;
    }

    pub(crate) fn remove_message(&mut self, bytes: usize) {
        self.in_flight_messages = self.in_flight_messages.saturating_sub(1);
        self.in_flight_bytes = self.in_flight_bytes.saturating_sub(bytes);
    }

    pub(crate) fn in_flight_messages(&self) -> usize {
        self.in_flight_messages
    }

    /// Message slots left before `max_messages` is reached.
    pub(crate) fn available_messages(&self) -> usize {
        self.options.max_messages.saturating_sub(self.in_flight_messages)
    }

    pub(crate) fn options(&self) -> &FlowControlOptions {
        &self.options
    }
}
