// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use padring_core::{HarnessObserver, PinSpace, Timestamp};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

/// Dumps every bound pin on each clock edge. One VCD time unit is one
/// harness timestamp.
pub struct VcdObserver {
    state: Mutex<VcdState>,
    ids: Vec<IdCode>,
    widths: Vec<u32>,
}

struct VcdState {
    // Taken and dropped at run end, which flushes the file.
    writer: Option<Writer<BufWriter<File>>>,
    last: Vec<Option<u8>>,
}

impl VcdObserver {
    pub fn new(path: &Path, pins: &PinSpace) -> anyhow::Result<Self> {
        let file = File::create(path)?;
        let mut writer = Writer::new(BufWriter::new(file));

        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("bench")?;
        let mut ids = Vec::with_capacity(pins.len());
        let mut widths = Vec::with_capacity(pins.len());
        for pin in pins.iter() {
            let width = pin.width.bits() as u32;
            ids.push(writer.add_wire(width, pin.name)?);
            widths.push(width);
        }
        writer.upscope()?;
        writer.enddefinitions()?;

        Ok(Self {
            state: Mutex::new(VcdState {
                writer: Some(writer),
                last: vec![None; ids.len()],
            }),
            ids,
            widths,
        })
    }

    fn dump(&self, timestamp: Timestamp, pins: &PinSpace) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let VcdState { writer, last } = &mut *state;
        let Some(w) = writer.as_mut() else {
            return;
        };

        let mut stamped = false;
        for (i, pin) in pins.iter().enumerate().take(self.ids.len()) {
            if last[i] == Some(pin.value) {
                continue;
            }
            if !stamped {
                if let Err(e) = w.timestamp(timestamp) {
                    tracing::warn!("VCD write failed, trace disabled: {}", e);
                    *writer = None;
                    return;
                }
                stamped = true;
            }
            let result = if self.widths[i] == 1 {
                w.change_scalar(self.ids[i], if pin.value & 1 == 1 { Value::V1 } else { Value::V0 })
            } else {
                w.change_vector(self.ids[i], u8_to_vec(pin.value, self.widths[i]))
            };
            if let Err(e) = result {
                tracing::warn!("VCD write failed, trace disabled: {}", e);
                *writer = None;
                return;
            }
            last[i] = Some(pin.value);
        }
    }
}

// MSB first
fn u8_to_vec(val: u8, width: u32) -> Vec<Value> {
    (0..width)
        .rev()
        .map(|i| if (val >> i) & 1 == 1 { Value::V1 } else { Value::V0 })
        .collect()
}

impl core::fmt::Debug for VcdObserver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VcdObserver({} pins)", self.ids.len())
    }
}

impl HarnessObserver for VcdObserver {
    fn on_run_start(&self, pins: &PinSpace) {
        self.dump(0, pins);
    }

    fn on_half_cycle(&self, timestamp: Timestamp, pins: &PinSpace) {
        self.dump(timestamp, pins);
    }

    fn on_run_end(&self, timestamp: Timestamp) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(mut writer) = state.writer.take() {
                if let Err(e) = writer.timestamp(timestamp) {
                    tracing::warn!("VCD write failed: {}", e);
                }
            }
        }
    }
}
