// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The clock driver: alternates model steps and design half-cycles.

use crate::event::{EventBuffer, EventLog};
use crate::models::Model;
use crate::signals::{DesignIn, PinSpace, Width};
use crate::stimulus::CommandPlayer;
use crate::{Design, HarnessObserver, SimResult, SimulationError, Timestamp};
use padring_config::{BenchManifest, InputScript};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Owner recorded for the clock and reset pins.
pub const HARNESS_OWNER: &str = "harness";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Cycles run after the reset cycle.
    pub cycles: u64,
    pub final_timestamp: Timestamp,
    pub events: u64,
    pub events_by_source: BTreeMap<String, u64>,
    pub log_sha256: String,
}

pub struct Harness<D: Design> {
    design: D,
    pins: PinSpace,
    models: Vec<Model>,
    player: CommandPlayer,
    clock: DesignIn,
    reset: DesignIn,
    reset_active_low: bool,
    /// Models are held, and emit nothing, while reset is asserted.
    in_reset: bool,
    pub observers: Vec<Arc<dyn HarnessObserver>>,
    timestamp: Timestamp,
    events: EventBuffer,
    events_by_source: BTreeMap<String, u64>,
}

impl<D: Design> std::fmt::Debug for Harness<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("models", &self.models)
            .field("timestamp", &self.timestamp)
            .field("pending_commands", &self.player.remaining())
            .finish()
    }
}

impl<D: Design> Harness<D> {
    /// Binds clock, reset and every model's pins, then lets the design
    /// resolve them. Image paths resolve against `base_dir`.
    pub fn new(mut design: D, manifest: &BenchManifest, base_dir: &Path) -> SimResult<Self> {
        let mut pins = PinSpace::new();
        let active_low = manifest.reset.active_low;
        let clock = pins.claim(&manifest.clock, Width::W1, HARNESS_OWNER, 0)?;
        let reset = pins.claim(
            &manifest.reset.pin,
            Width::W1,
            HARNESS_OWNER,
            !active_low as u8,
        )?;

        let mut names = HashSet::new();
        let mut models = Vec::with_capacity(manifest.models.len());
        for config in &manifest.models {
            if !names.insert(config.name.as_str()) {
                return Err(SimulationError::DuplicateModel(config.name.clone()));
            }
            models.push(Model::from_config(config, &mut pins, base_dir)?);
        }

        design.bind(&pins)?;
        tracing::info!(
            "Bench ready: {} models on {} pins",
            models.len(),
            pins.len()
        );

        Ok(Self {
            design,
            pins,
            models,
            player: CommandPlayer::new(),
            clock,
            reset,
            reset_active_low: active_low,
            in_reset: true,
            observers: Vec::new(),
            timestamp: 0,
            events: EventBuffer::new(),
            events_by_source: BTreeMap::new(),
        })
    }

    /// Parses and schedules an input script. Replaces any previous one.
    pub fn load_script(&mut self, script: &InputScript) -> SimResult<()> {
        self.player = CommandPlayer::load(script, &self.models)?;
        Ok(())
    }

    pub fn add_observer(&mut self, observer: Arc<dyn HarnessObserver>) {
        self.observers.push(observer);
    }

    pub fn pins(&self) -> &PinSpace {
        &self.pins
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn design(&self) -> &D {
        &self.design
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn set_reset(&mut self, asserted: bool) {
        self.reset
            .set(&mut self.pins, (asserted != self.reset_active_low) as u8);
        self.in_reset = asserted;
    }

    /// Settles the design in reset, holds reset for one cycle, then runs
    /// `cycles` cycles. The log is closed exactly once, after every model
    /// finished.
    pub fn run<W: Write>(&mut self, cycles: u64, mut log: EventLog<W>) -> SimResult<(W, RunSummary)> {
        for observer in &self.observers {
            observer.on_run_start(&self.pins);
        }

        self.set_reset(true);
        self.design.step(&mut self.pins);
        self.cycle(&mut log)?;
        self.set_reset(false);
        tracing::debug!("Reset released at {}", self.timestamp);

        for _ in 0..cycles {
            self.cycle(&mut log)?;
        }

        let now = self.timestamp;
        for i in 0..self.models.len() {
            self.models[i].finish(now, &mut self.events);
            self.flush(&mut log)?;
        }

        let (writer, log_summary) = log.close()?;
        for observer in &self.observers {
            observer.on_run_end(now);
        }

        let summary = RunSummary {
            cycles,
            final_timestamp: now,
            events: log_summary.events,
            events_by_source: self.events_by_source.clone(),
            log_sha256: log_summary.sha256,
        };
        tracing::info!(
            "Run finished at timestamp {} with {} events",
            summary.final_timestamp,
            summary.events
        );
        Ok((writer, summary))
    }

    fn cycle<W: Write>(&mut self, log: &mut EventLog<W>) -> SimResult<()> {
        self.step_models(log)?;
        self.half_cycle(0);
        self.step_models(log)?;
        self.half_cycle(1);
        Ok(())
    }

    fn half_cycle(&mut self, level: u8) {
        self.clock.set(&mut self.pins, level);
        self.design.step(&mut self.pins);
        self.timestamp += 1;
        for observer in &self.observers {
            observer.on_half_cycle(self.timestamp, &self.pins);
        }
    }

    fn step_models<W: Write>(&mut self, log: &mut EventLog<W>) -> SimResult<()> {
        let now = self.timestamp;
        for scheduled in self.player.due(now) {
            self.models[scheduled.target].apply(now, &scheduled.command);
        }
        if self.in_reset {
            return Ok(());
        }
        for i in 0..self.models.len() {
            self.models[i].step(now, &mut self.pins, &mut self.events);
            self.flush(log)?;
        }
        Ok(())
    }

    fn flush<W: Write>(&mut self, log: &mut EventLog<W>) -> SimResult<()> {
        for event in self.events.drain() {
            log.append(&event)?;
            *self
                .events_by_source
                .entry(event.source.clone())
                .or_default() += 1;
            for observer in &self.observers {
                observer.on_event(&event);
            }
        }
        Ok(())
    }
}
