// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Event, HarnessObserver, PinSpace, Timestamp};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Run statistics collected through the observer hook.
#[derive(Debug)]
pub struct RunMetrics {
    half_cycles: AtomicU64,
    event_count: AtomicU64,
    events_by_source: Mutex<BTreeMap<String, u64>>,
    start_time: Mutex<Instant>,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            half_cycles: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
            events_by_source: Mutex::new(BTreeMap::new()),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.half_cycles.store(0, Ordering::SeqCst);
        self.event_count.store(0, Ordering::SeqCst);
        if let Ok(mut m) = self.events_by_source.lock() {
            m.clear();
        }
        if let Ok(mut start) = self.start_time.lock() {
            *start = Instant::now();
        }
    }

    pub fn get_half_cycles(&self) -> u64 {
        self.half_cycles.load(Ordering::SeqCst)
    }

    pub fn get_events(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    pub fn get_events_for(&self, source: &str) -> u64 {
        self.events_by_source
            .lock()
            .ok()
            .and_then(|m| m.get(source).copied())
            .unwrap_or(0)
    }

    /// Simulated full clock cycles per wall-clock second.
    pub fn get_cycle_rate(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_half_cycles() as f64 / 2.0 / elapsed
        } else {
            0.0
        }
    }
}

impl HarnessObserver for RunMetrics {
    fn on_run_start(&self, _pins: &PinSpace) {
        self.reset();
    }

    fn on_half_cycle(&self, _timestamp: Timestamp, _pins: &PinSpace) {
        self.half_cycles.fetch_add(1, Ordering::SeqCst);
    }

    fn on_event(&self, event: &Event) {
        self.event_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.events_by_source.lock() {
            *m.entry(event.source.clone()).or_insert(0) += 1;
        }
    }

    fn on_run_end(&self, timestamp: Timestamp) {
        tracing::info!(
            "Run metrics: {} half-cycles, {} events, {:.0} cycles/s (final timestamp {})",
            self.get_half_cycles(),
            self.get_events(),
            self.get_cycle_rate(),
            timestamp
        );
    }
}
