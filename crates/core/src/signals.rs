// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Typed access to the design's pins.
//!
//! Every pin lives in a [`PinSpace`] and has a fixed width and a direction.
//! Pins the design drives are read through [`DesignOut`] handles; pins the
//! design reads are written through [`DesignIn`] handles, and each of those
//! has exactly one owner. [`TriState`] groups an output, its output enable
//! and the matching input into one bidirectional line.

use crate::{SimResult, SimulationError};
use std::collections::HashMap;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W1,
    W4,
    W8,
}

impl Width {
    pub fn from_bits(bits: u8) -> SimResult<Self> {
        match bits {
            1 => Ok(Width::W1),
            4 => Ok(Width::W4),
            8 => Ok(Width::W8),
            other => Err(SimulationError::UnsupportedWidth(other)),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Width::W1 => 1,
            Width::W4 => 4,
            Width::W8 => 8,
        }
    }

    pub fn mask(self) -> u8 {
        match self {
            Width::W1 => 0x01,
            Width::W4 => 0x0F,
            Width::W8 => 0xFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Driven by the design, read by models.
    FromDesign,
    /// Driven by one model (or the harness), read by the design.
    ToDesign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId(usize);

#[derive(Debug, Clone)]
struct Pin {
    name: String,
    width: Width,
    direction: Direction,
    value: u8,
    owner: Option<String>,
}

/// A read-only view of one pin, for observers.
#[derive(Debug, Clone, Copy)]
pub struct PinView<'a> {
    pub id: PinId,
    pub name: &'a str,
    pub width: Width,
    pub direction: Direction,
    pub value: u8,
}

#[derive(Debug, Clone, Default)]
pub struct PinSpace {
    pins: Vec<Pin>,
    index: HashMap<String, PinId>,
}

impl PinSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(&mut self, name: &str, width: Width, direction: Direction) -> SimResult<PinId> {
        if let Some(&id) = self.index.get(name) {
            let pin = &self.pins[id.0];
            if pin.width != width {
                return Err(SimulationError::WidthMismatch {
                    name: name.to_string(),
                    expected: width.bits(),
                    actual: pin.width.bits(),
                });
            }
            if pin.direction != direction {
                return Err(SimulationError::DirectionConflict(name.to_string()));
            }
            return Ok(id);
        }

        let id = PinId(self.pins.len());
        self.pins.push(Pin {
            name: name.to_string(),
            width,
            direction,
            value: 0,
            owner: None,
        });
        self.index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Binds a design output for reading. Any number of models may observe one pin.
    pub fn observe(&mut self, name: &str, width: Width) -> SimResult<DesignOut> {
        let id = self.declare(name, width, Direction::FromDesign)?;
        Ok(DesignOut {
            id,
            mask: width.mask(),
        })
    }

    /// Claims a design input for `owner`. The line starts at `float`.
    pub fn claim(
        &mut self,
        name: &str,
        width: Width,
        owner: &str,
        float: u8,
    ) -> SimResult<DesignIn> {
        let id = self.declare(name, width, Direction::ToDesign)?;
        let pin = &mut self.pins[id.0];
        if let Some(existing) = &pin.owner {
            return Err(SimulationError::PinConflict {
                name: name.to_string(),
                owner: existing.clone(),
            });
        }
        let float = float & width.mask();
        pin.owner = Some(owner.to_string());
        pin.value = float;
        Ok(DesignIn {
            id,
            mask: width.mask(),
            float,
        })
    }

    pub fn find(&self, name: &str) -> Option<PinId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: PinId) -> &str {
        &self.pins[id.0].name
    }

    pub fn width(&self, id: PinId) -> Width {
        self.pins[id.0].width
    }

    pub fn direction(&self, id: PinId) -> Direction {
        self.pins[id.0].direction
    }

    pub fn owner(&self, id: PinId) -> Option<&str> {
        self.pins[id.0].owner.as_deref()
    }

    pub fn read(&self, id: PinId) -> u8 {
        self.pins[id.0].value
    }

    /// Publishes a settled design output. Writes to design inputs are ignored.
    pub fn publish(&mut self, id: PinId, value: u8) {
        let pin = &mut self.pins[id.0];
        if pin.direction == Direction::FromDesign {
            pin.value = value & pin.width.mask();
        }
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PinView<'_>> {
        self.pins.iter().enumerate().map(|(i, pin)| PinView {
            id: PinId(i),
            name: &pin.name,
            width: pin.width,
            direction: pin.direction,
            value: pin.value,
        })
    }
}

/// Handle to a pin the design drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignOut {
    id: PinId,
    mask: u8,
}

impl DesignOut {
    pub fn id(&self) -> PinId {
        self.id
    }

    pub fn get(&self, pins: &PinSpace) -> u8 {
        pins.read(self.id) & self.mask
    }

    pub fn bit(&self, pins: &PinSpace, n: u8) -> bool {
        (self.get(pins) >> n) & 1 == 1
    }

    pub fn level(&self, pins: &PinSpace) -> DigitalLevel {
        self.bit(pins, 0).into()
    }
}

/// Handle to a pin the design reads, held by its single owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignIn {
    id: PinId,
    mask: u8,
    float: u8,
}

impl DesignIn {
    pub fn id(&self) -> PinId {
        self.id
    }

    pub fn float(&self) -> u8 {
        self.float
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn set(&self, pins: &mut PinSpace, value: u8) {
        pins.pins[self.id.0].value = value & self.mask;
    }

    pub fn set_level(&self, pins: &mut PinSpace, level: DigitalLevel) {
        self.set(pins, bool::from(level) as u8);
    }

    /// Stops driving; the line returns to its float level.
    pub fn release(&self, pins: &mut PinSpace) {
        self.set(pins, self.float);
    }

    /// The value currently presented to the design.
    pub fn get(&self, pins: &PinSpace) -> u8 {
        pins.read(self.id)
    }
}

/// A bidirectional line: design output `o`, its enable `oe`, and input `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriState {
    o: DesignOut,
    oe: DesignOut,
    i: DesignIn,
}

impl TriState {
    pub fn bind(
        pins: &mut PinSpace,
        o: &str,
        oe: &str,
        i: &str,
        width: Width,
        owner: &str,
        float: u8,
    ) -> SimResult<Self> {
        Ok(Self {
            o: pins.observe(o, width)?,
            oe: pins.observe(oe, width)?,
            i: pins.claim(i, width, owner, float)?,
        })
    }

    pub fn mask(&self) -> u8 {
        self.i.mask
    }

    /// The design's output value, regardless of enable.
    pub fn get(&self, pins: &PinSpace) -> u8 {
        self.o.get(pins)
    }

    pub fn get_oe(&self, pins: &PinSpace) -> u8 {
        self.oe.get(pins)
    }

    /// Bits the design currently drives, with their values.
    pub fn design_driven(&self, pins: &PinSpace) -> u8 {
        self.get(pins) & self.get_oe(pins)
    }

    /// Resolves every bit: the design wins where its enable is set, then
    /// the model where `drive_mask` is set, otherwise the float level.
    pub fn resolve(&self, pins: &PinSpace, drive: u8, drive_mask: u8) -> u8 {
        let oe = self.get_oe(pins);
        let model = drive_mask & !oe;
        let floating = !oe & !drive_mask;
        ((self.get(pins) & oe) | (drive & model) | (self.i.float & floating)) & self.i.mask
    }

    /// Resolves the line and presents the result to the design.
    pub fn write(&self, pins: &mut PinSpace, drive: u8, drive_mask: u8) -> u8 {
        let value = self.resolve(pins, drive, drive_mask);
        self.i.set(pins, value);
        value
    }

    /// Bits both sides tried to drive this half-cycle.
    pub fn contention(&self, pins: &PinSpace, drive_mask: u8) -> u8 {
        self.get_oe(pins) & drive_mask & self.i.mask
    }
}
