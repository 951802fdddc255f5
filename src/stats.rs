// ===============================
// src/stats.rs
// ===============================
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy. Each field is loaded independently, so under
/// concurrent updates the fields are not a single consistent cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub errors: u64,
    pub reconnects: u64,
    pub dropped: u64,
}

/// Lock-free client counters.
#[derive(Debug, Default)]
pub struct Stats {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
    reconnects: AtomicU64,
    dropped: AtomicU64,
}

impl Stats {
    pub fn new() -> Self { Self::default() }

    pub fn inc_sent(&self) { self.messages_sent.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_received(&self) { self.messages_received.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_errors(&self) { self.errors.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_reconnects(&self) { self.reconnects.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_dropped(&self) { self.dropped.fetch_add(1, Ordering::Relaxed); }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter (tests / tools only).
    pub fn reset(&self) {
        self.messages_sent.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.reconnects.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }
}
