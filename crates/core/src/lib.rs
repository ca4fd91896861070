// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod event;
pub mod harness;
pub mod metrics;
pub mod models;
pub mod signals;
pub mod stimulus;

use std::path::PathBuf;

pub use event::{Event, EventBuffer, EventLog, LogSummary};
pub use harness::{Harness, RunSummary};
pub use metrics::RunMetrics;
pub use models::{Model, ModelCommand};
pub use signals::{DesignIn, DesignOut, Direction, PinId, PinSpace, TriState, Width};
pub use stimulus::{CommandPlayer, ScheduledCommand};

/// Simulated time. Advances by one on every clock edge.
pub type Timestamp = u64;

/// Clock edges per full clock cycle.
pub const STEPS_PER_CYCLE: u64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("unsupported pin width {0} (expected 1, 4 or 8)")]
    UnsupportedWidth(u8),
    #[error("pin '{name}' is {actual} bits wide, expected {expected}")]
    WidthMismatch {
        name: String,
        expected: u8,
        actual: u8,
    },
    #[error("pin '{name}' is already driven by '{owner}'")]
    PinConflict { name: String, owner: String },
    #[error("pin '{0}' is bound both as a design input and a design output")]
    DirectionConflict(String),
    #[error("design binding failed: {0}")]
    DesignBinding(String),
    #[error("model '{model}': {reason}")]
    InvalidModel { model: String, reason: String },
    #[error("duplicate model name '{0}'")]
    DuplicateModel(String),
    #[error("failed to load flash image {path:?}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image of {len} bytes at {offset:#x} exceeds flash size {size:#x}")]
    ImageOutOfRange { len: usize, offset: u64, size: u64 },
    #[error("input command #{index}: unknown target '{target}'")]
    UnknownTarget { index: usize, target: String },
    #[error("input command #{index} for '{target}': {reason}")]
    BadCommand {
        index: usize,
        target: String,
        reason: String,
    },
    #[error("event log write failed: {0}")]
    LogWrite(#[from] std::io::Error),
    #[error("event log encoding failed: {0}")]
    LogEncode(#[from] serde_json::Error),
}

impl SimulationError {
    /// Configuration errors are detected before the first clock edge.
    pub fn is_config(&self) -> bool {
        !matches!(
            self,
            SimulationError::LogWrite(_) | SimulationError::LogEncode(_)
        )
    }
}

pub type SimResult<T> = Result<T, SimulationError>;

/// The clocked design under test. Its internals are opaque; the harness only
/// exchanges pin values with it.
pub trait Design {
    /// Resolve every declared pin against the design's ports. Called once,
    /// after all models have bound their pins.
    fn bind(&mut self, pins: &PinSpace) -> SimResult<()>;

    /// Copy design inputs in, advance the design until it settles, and
    /// publish its outputs with [`PinSpace::publish`].
    fn step(&mut self, pins: &mut PinSpace);
}

/// Trait for observing a harness run without influencing it.
pub trait HarnessObserver: std::fmt::Debug + Send + Sync {
    fn on_run_start(&self, _pins: &PinSpace) {}
    fn on_run_end(&self, _timestamp: Timestamp) {}
    /// Called after the design has settled on a new clock edge.
    fn on_half_cycle(&self, _timestamp: Timestamp, _pins: &PinSpace) {}
    fn on_event(&self, _event: &Event) {}
}
