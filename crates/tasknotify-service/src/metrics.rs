//! Dispatch counters in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the dispatcher; shared across concurrent events.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    events_received: AtomicU64,
    events_filtered: AtomicU64,
    events_delivered: AtomicU64,
    events_failed: AtomicU64,
    sent_irc: AtomicU64,
    sent_slack: AtomicU64,
    sent_pulse: AtomicU64,
    sent_email: AtomicU64,
    notifications_failed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        bump(&self.events_received);
    }

    pub fn record_filtered(&self) {
        bump(&self.events_filtered);
    }

    pub fn record_delivered(&self) {
        bump(&self.events_delivered);
    }

    pub fn record_failed(&self) {
        bump(&self.events_failed);
    }

    /// Count a notification accepted by the delivery interface.
    pub fn record_sent(&self, channel: &str) {
        match channel {
            "irc" => bump(&self.sent_irc),
            "slack" => bump(&self.sent_slack),
            "pulse" => bump(&self.sent_pulse),
            "email" => bump(&self.sent_email),
            _ => {}
        }
    }

    pub fn record_notification_failed(&self) {
        bump(&self.notifications_failed);
    }

    pub fn events_received(&self) -> u64 {
        read(&self.events_received)
    }

    pub fn events_filtered(&self) -> u64 {
        read(&self.events_filtered)
    }

    pub fn events_delivered(&self) -> u64 {
        read(&self.events_delivered)
    }

    pub fn events_failed(&self) -> u64 {
        read(&self.events_failed)
    }

    /// Format all counters as Prometheus text.
    pub fn render(&self) -> String {
        let mut output = String::new();

        writeln!(
            output,
            "# HELP tasknotify_events_total Task events processed by outcome"
        )
        .ok();
        writeln!(output, "# TYPE tasknotify_events_total counter").ok();
        for (outcome, counter) in [
            ("received", &self.events_received),
            ("filtered", &self.events_filtered),
            ("delivered", &self.events_delivered),
            ("failed", &self.events_failed),
        ] {
            writeln!(
                output,
                "tasknotify_events_total{{outcome=\"{outcome}\"}} {}",
                read(counter)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP tasknotify_notifications_sent_total Notifications accepted by channel"
        )
        .ok();
        writeln!(output, "# TYPE tasknotify_notifications_sent_total counter").ok();
        for (channel, counter) in [
            ("irc", &self.sent_irc),
            ("slack", &self.sent_slack),
            ("pulse", &self.sent_pulse),
            ("email", &self.sent_email),
        ] {
            writeln!(
                output,
                "tasknotify_notifications_sent_total{{channel=\"{channel}\"}} {}",
                read(counter)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP tasknotify_notifications_failed_total Notifications that failed to build or send"
        )
        .ok();
        writeln!(output, "# TYPE tasknotify_notifications_failed_total counter").ok();
        writeln!(
            output,
            "tasknotify_notifications_failed_total {}",
            read(&self.notifications_failed)
        )
        .ok();

        output
    }
}
