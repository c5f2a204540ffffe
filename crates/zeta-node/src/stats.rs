//! Process-wide session counters.
//!
//! The pipeline bumps `messages_received`; the session manager fixes
//! `connected_since` at the first successful connection. Everything
//! else is a snapshot computed on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Shared counters for one process run.
#[derive(Debug, Default)]
pub struct SessionStats {
    messages_received: AtomicU64,
    connected_since: OnceLock<DateTime<Utc>>,
}

impl SessionStats {
    /// Creates zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one accepted inbound message.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Total accepted inbound messages.
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Fixes the connection epoch. Later calls have no effect.
    pub fn mark_connected(&self, at: DateTime<Utc>) {
        let _ = self.connected_since.set(at);
    }

    /// First successful connection time, if any.
    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.connected_since.get().copied()
    }

    /// Time since the first successful connection; zero before it.
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        self.connected_since()
            .and_then(|since| (now - since).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Builds a snapshot for `active_relay_count` relays.
    pub fn snapshot(&self, active_relay_count: usize, now: DateTime<Utc>) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received(),
            active_relay_count,
            uptime: self.uptime(now),
        }
    }
}

/// Point-in-time view of the session counters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Accepted inbound messages.
    pub messages_received: u64,
    /// Relays currently connected.
    pub active_relay_count: usize,
    /// Time since the first successful connection.
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// Uptime as `"{h}h {m}m"`.
    pub fn uptime_display(&self) -> String {
        format_uptime(self.uptime)
    }
}

/// Formats a duration as `"{h}h {m}m"`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}
