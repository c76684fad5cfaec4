//! The notification seam between the engine and whatever makes noise.

use crate::definition::TimerDefinition;

/// Receives boundary notifications from a [`Runner`](crate::Runner).
pub trait NotificationSink {
    fn segment_complete(&mut self, definition: &TimerDefinition, interval_index: usize, cycle_index: u32);

    fn timer_finished(&mut self, definition: &TimerDefinition);

    /// Whether the sink stays silent until the user has interacted once.
    fn requires_interaction_unlock(&self) -> bool {
        false
    }
}

/// Remembers what it was told. Useful in tests and headless hosts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingSink {
    pub segments: Vec<(usize, u32)>,
    pub finished: usize,
    pub requires_unlock: bool,
}

impl NotificationSink for RecordingSink {
    fn segment_complete(&mut self, _definition: &TimerDefinition, interval_index: usize, cycle_index: u32) {
        self.segments.push((interval_index, cycle_index));
    }

    fn timer_finished(&mut self, _definition: &TimerDefinition) {
        self.finished += 1;
    }

    fn requires_interaction_unlock(&self) -> bool {
        self.requires_unlock
    }
}
