use cadence_core::{NotificationSink, TimerDefinition};
use tracing::warn;

/// Desktop notifications for interval boundaries.
pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn send_notification(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .appname("cadence")
            .show()
        {
            warn!("Failed to send notification: {}", e);
        }
    }
}

impl NotificationSink for DesktopNotifier {
    fn segment_complete(&mut self, definition: &TimerDefinition, interval_index: usize, cycle_index: u32) {
        let body = match definition.interval(interval_index + 1) {
            Some(next) if next.is_rest => "Rest".to_string(),
            Some(_) => "Work".to_string(),
            None => format!("Cycle {} complete", cycle_index + 1),
        };
        self.send_notification(&definition.name, &body);
    }

    fn timer_finished(&mut self, definition: &TimerDefinition) {
        self.send_notification(&definition.name, "Timer finished!");
    }
}
