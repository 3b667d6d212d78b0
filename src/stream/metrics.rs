// src/stream/metrics.rs
//
// Counters for one viewer run. Cheap to clone; clones share the counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub sessions_started: Arc<AtomicU64>,
    pub frames_received: Arc<AtomicU64>,
    pub frame_decode_failures: Arc<AtomicU64>,
    pub metadata_updates: Arc<AtomicU64>,
    pub malformed_messages: Arc<AtomicU64>,
    pub ignored_messages: Arc<AtomicU64>,
    pub server_errors: Arc<AtomicU64>,
    pub stale_events_dropped: Arc<AtomicU64>,
    pub counter_regressions: Arc<AtomicU64>,
    pub overlay_renders: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            sessions_started: Arc::new(AtomicU64::new(0)),
            frames_received: Arc::new(AtomicU64::new(0)),
            frame_decode_failures: Arc::new(AtomicU64::new(0)),
            metadata_updates: Arc::new(AtomicU64::new(0)),
            malformed_messages: Arc::new(AtomicU64::new(0)),
            ignored_messages: Arc::new(AtomicU64::new(0)),
            server_errors: Arc::new(AtomicU64::new(0)),
            stale_events_dropped: Arc::new(AtomicU64::new(0)),
            counter_regressions: Arc::new(AtomicU64::new(0)),
            overlay_renders: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_received.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            sessions_started: self.get(&self.sessions_started),
            frames_received: self.get(&self.frames_received),
            fps: self.fps(),
            frame_decode_failures: self.get(&self.frame_decode_failures),
            metadata_updates: self.get(&self.metadata_updates),
            malformed_messages: self.get(&self.malformed_messages),
            ignored_messages: self.get(&self.ignored_messages),
            server_errors: self.get(&self.server_errors),
            stale_events_dropped: self.get(&self.stale_events_dropped),
            counter_regressions: self.get(&self.counter_regressions),
            overlay_renders: self.get(&self.overlay_renders),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub sessions_started: u64,
    pub frames_received: u64,
    pub fps: f64,
    pub frame_decode_failures: u64,
    pub metadata_updates: u64,
    pub malformed_messages: u64,
    pub ignored_messages: u64,
    pub server_errors: u64,
    pub stale_events_dropped: u64,
    pub counter_regressions: u64,
    pub overlay_renders: u64,
    pub elapsed_secs: f64,
}
