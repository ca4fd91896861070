// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Open-drain two-wire bus: monitor, target responder and controller.
//!
//! Every party either releases a line or pulls it low; the resolved level
//! is the AND of all of them. The monitor decodes START/STOP conditions and
//! 9-bit frames from the resolved lines, so transactions are reported the
//! same way whichever side drives them.

use crate::event::EventBuffer;
use crate::signals::{DesignIn, DesignOut, PinSpace, Width};
use crate::{SimResult, SimulationError, Timestamp, STEPS_PER_CYCLE};
use padring_config::{I2cConfig, InputCommand};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
enum I2cEvent {
    Transaction {
        address: u8,
        direction: &'static str,
        address_ack: bool,
        data: Vec<u8>,
        acks: Vec<bool>,
        terminator: &'static str,
    },
    ProtocolError {
        reason: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        bits: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<u8>,
    },
}

fn default_stop() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum I2cCommand {
    /// Acknowledge every address and written byte from now on.
    Ack {},
    /// Refuse every address and written byte from now on.
    Nack {},
    /// Bytes returned when the design reads from this target.
    PushRead { data: Vec<u8> },
    Write {
        address: u8,
        data: Vec<u8>,
        #[serde(default = "default_stop")]
        stop: bool,
    },
    Read {
        address: u8,
        count: u16,
        #[serde(default = "default_stop")]
        stop: bool,
    },
}

#[derive(Debug, Default)]
struct Transaction {
    address: Option<u8>,
    read: bool,
    address_ack: bool,
    data: Vec<u8>,
    acks: Vec<bool>,
    /// Bits clocked in the current frame; 8 means the ACK slot is next.
    bit_count: u8,
    shift: u8,
    frames: usize,
    /// This model acknowledged the address and serves the transaction.
    responding: bool,
    current_read: Option<u8>,
    read_done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    None,
    /// Sample SDA at the end of this quarter; a NACK skips to the tail.
    CheckAck,
    /// First quarter of the STOP or bus-hold sequence.
    Tail,
}

/// One quarter bit of controller output. `true` releases the line.
#[derive(Debug, Clone, Copy)]
struct Quarter {
    scl: bool,
    sda: bool,
    mark: Mark,
}

#[derive(Debug, Default)]
struct ProgramBuilder {
    quarters: VecDeque<Quarter>,
}

impl ProgramBuilder {
    fn push(&mut self, scl: bool, sda: bool, mark: Mark) {
        self.quarters.push_back(Quarter { scl, sda, mark });
    }

    fn start(&mut self, repeated: bool) {
        if repeated {
            self.push(false, true, Mark::None);
        }
        self.push(true, true, Mark::None);
        self.push(true, false, Mark::None);
        self.push(false, false, Mark::None);
    }

    fn bit(&mut self, level: bool, mark: Mark) {
        self.push(false, level, Mark::None);
        self.push(true, level, Mark::None);
        self.push(true, level, mark);
        self.push(false, level, Mark::None);
    }

    fn byte(&mut self, byte: u8) {
        for i in (0..8).rev() {
            self.bit((byte >> i) & 1 == 1, Mark::None);
        }
        self.bit(true, Mark::CheckAck);
    }

    fn read_byte(&mut self, ack: bool) {
        for _ in 0..8 {
            self.bit(true, Mark::None);
        }
        self.bit(!ack, Mark::None);
    }

    fn tail(&mut self, stop: bool) {
        if stop {
            self.push(false, false, Mark::Tail);
            self.push(true, false, Mark::None);
            self.push(true, true, Mark::None);
        } else {
            self.push(false, true, Mark::Tail);
        }
    }

    fn build(request: &I2cCommand, repeated: bool) -> VecDeque<Quarter> {
        let mut builder = Self::default();
        builder.start(repeated);
        match request {
            I2cCommand::Write {
                address,
                data,
                stop,
            } => {
                builder.byte(address << 1);
                for byte in data {
                    builder.byte(*byte);
                }
                builder.tail(*stop);
            }
            I2cCommand::Read {
                address,
                count,
                stop,
            } => {
                builder.byte((address << 1) | 1);
                for i in 0..*count {
                    builder.read_byte(i + 1 < *count);
                }
                builder.tail(*stop);
            }
            I2cCommand::Ack {} | I2cCommand::Nack {} | I2cCommand::PushRead { .. } => {}
        }
        builder.quarters
    }
}

#[derive(Debug)]
struct Controller {
    divisor: u32,
    requests: VecDeque<I2cCommand>,
    program: VecDeque<Quarter>,
    remaining: u32,
    /// The last transaction ended without STOP; the bus is still ours.
    holding: bool,
    active: bool,
}

#[derive(Debug)]
pub struct I2cBus {
    name: String,
    sda_oe: DesignOut,
    sda_i: DesignIn,
    scl_oe: DesignOut,
    scl_i: DesignIn,
    address: Option<u8>,
    ack_override: Option<bool>,
    read_queue: VecDeque<u8>,
    sda_pull: bool,
    scl_pull: bool,
    last_sda: bool,
    last_scl: bool,
    last_activity: Timestamp,
    stop_timeout: Option<u64>,
    txn: Option<Transaction>,
    controller: Controller,
}

impl I2cBus {
    pub fn new(name: &str, config: &I2cConfig, pins: &mut PinSpace) -> SimResult<Self> {
        if config.clock_divisor == 0 || config.address.is_some_and(|a| a > 0x7F) {
            return Err(SimulationError::InvalidModel {
                model: name.to_string(),
                reason: "clock divisor must be non-zero and the address 7 bits".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            sda_oe: pins.observe(&config.pins.sda_oe, Width::W1)?,
            sda_i: pins.claim(&config.pins.sda_i, Width::W1, name, 1)?,
            scl_oe: pins.observe(&config.pins.scl_oe, Width::W1)?,
            scl_i: pins.claim(&config.pins.scl_i, Width::W1, name, 1)?,
            address: config.address,
            ack_override: None,
            read_queue: VecDeque::new(),
            sda_pull: false,
            scl_pull: false,
            last_sda: true,
            last_scl: true,
            last_activity: 0,
            stop_timeout: config
                .stop_timeout_cycles
                .map(|cycles| cycles * STEPS_PER_CYCLE),
            txn: None,
            controller: Controller {
                divisor: config.clock_divisor,
                requests: VecDeque::new(),
                program: VecDeque::new(),
                remaining: 0,
                holding: false,
                active: false,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse_command(command: &InputCommand) -> Result<I2cCommand, String> {
        let request = super::decode_request::<I2cCommand>(command)?;
        match &request {
            I2cCommand::Write { address, .. } | I2cCommand::Read { address, .. }
                if *address > 0x7F =>
            {
                Err(format!("address {:#x} does not fit in 7 bits", address))
            }
            I2cCommand::Read { count: 0, .. } => Err("'read' needs a non-zero count".to_string()),
            _ => Ok(request),
        }
    }

    pub fn apply(&mut self, command: &I2cCommand) {
        match command {
            I2cCommand::Ack {} => self.ack_override = Some(true),
            I2cCommand::Nack {} => self.ack_override = Some(false),
            I2cCommand::PushRead { data } => self.read_queue.extend(data.iter().copied()),
            I2cCommand::Write { .. } | I2cCommand::Read { .. } => {
                self.controller.requests.push_back(command.clone())
            }
        }
    }

    /// Resolved (SDA, SCL) levels with the model's current pulls.
    fn lines(&self, pins: &PinSpace) -> (bool, bool) {
        let sda = !(self.sda_oe.bit(pins, 0) || self.sda_pull);
        let scl = !(self.scl_oe.bit(pins, 0) || self.scl_pull);
        (sda, scl)
    }

    pub fn step(&mut self, timestamp: Timestamp, pins: &mut PinSpace, events: &mut EventBuffer) {
        let (sda, scl) = self.lines(pins);
        self.monitor(timestamp, sda, scl, events);

        let design_holds_scl = self.scl_oe.bit(pins, 0);
        self.run_controller(sda, design_holds_scl);

        if !self.controller.active && !self.controller.holding && !scl {
            self.sda_pull = self.target_pull();
        }

        let (sda, scl) = self.lines(pins);
        self.sda_i.set(pins, sda as u8);
        self.scl_i.set(pins, scl as u8);
    }

    fn monitor(&mut self, timestamp: Timestamp, sda: bool, scl: bool, events: &mut EventBuffer) {
        if sda != self.last_sda || scl != self.last_scl {
            self.last_activity = timestamp;
        }

        if scl && self.last_scl && sda != self.last_sda {
            if sda {
                self.close_transaction(timestamp, "stop", events);
            } else {
                self.close_transaction(timestamp, "repeated_start", events);
                self.txn = Some(Transaction::default());
            }
        } else if scl && !self.last_scl {
            self.clock_bit(sda);
        } else if let Some(timeout) = self.stop_timeout {
            if self.txn.is_some() && timestamp - self.last_activity >= timeout {
                self.report_missing_stop(timestamp, events);
            }
        }

        self.last_sda = sda;
        self.last_scl = scl;
    }

    fn clock_bit(&mut self, sda: bool) {
        let own_address = self.address;
        let ack_override = self.ack_override;
        let controller_active = self.controller.active;
        let Some(txn) = self.txn.as_mut() else {
            return;
        };

        if txn.bit_count < 8 {
            txn.shift = (txn.shift << 1) | sda as u8;
            txn.bit_count += 1;
            return;
        }

        let ack = !sda;
        let byte = txn.shift;
        if txn.frames == 0 {
            let address = byte >> 1;
            txn.address = Some(address);
            txn.read = byte & 1 == 1;
            txn.address_ack = ack;
            txn.responding = ack
                && !controller_active
                && ack_override.unwrap_or(own_address == Some(address));
        } else {
            txn.data.push(byte);
            txn.acks.push(ack);
            if txn.read && !ack {
                txn.read_done = true;
            }
        }
        txn.frames += 1;
        txn.bit_count = 0;
        txn.shift = 0;

        if txn.read && txn.responding && !txn.read_done {
            txn.current_read = Some(self.read_queue.pop_front().unwrap_or(0xFF));
        }
    }

    fn close_transaction(
        &mut self,
        timestamp: Timestamp,
        terminator: &'static str,
        events: &mut EventBuffer,
    ) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        // The clock pulse that sets up a STOP or repeated START counts as one bit.
        if txn.bit_count > 1 {
            tracing::warn!("{}: bus condition after {} bits", self.name, txn.bit_count);
            events.emit(
                timestamp,
                &self.name,
                &I2cEvent::ProtocolError {
                    reason: "incomplete_byte",
                    bits: Some(txn.bit_count),
                    address: txn.address,
                },
            );
            return;
        }
        let Some(address) = txn.address else {
            events.emit(
                timestamp,
                &self.name,
                &I2cEvent::ProtocolError {
                    reason: "empty_transaction",
                    bits: None,
                    address: None,
                },
            );
            return;
        };
        tracing::debug!(
            "{}: {} {:#04x} {:02x?}",
            self.name,
            if txn.read { "read" } else { "write" },
            address,
            txn.data
        );
        events.emit(
            timestamp,
            &self.name,
            &I2cEvent::Transaction {
                address,
                direction: if txn.read { "read" } else { "write" },
                address_ack: txn.address_ack,
                data: txn.data,
                acks: txn.acks,
                terminator,
            },
        );
    }

    fn report_missing_stop(&mut self, timestamp: Timestamp, events: &mut EventBuffer) {
        if let Some(txn) = self.txn.take() {
            tracing::warn!("{}: transaction left open without STOP", self.name);
            events.emit(
                timestamp,
                &self.name,
                &I2cEvent::ProtocolError {
                    reason: "missing_stop",
                    bits: None,
                    address: txn.address,
                },
            );
        }
    }

    /// SDA pull requested by the target responder for the current bus state.
    fn target_pull(&self) -> bool {
        let Some(txn) = &self.txn else {
            return false;
        };
        if txn.frames == 0 {
            return txn.bit_count == 8
                && self
                    .ack_override
                    .unwrap_or(self.address == Some(txn.shift >> 1));
        }
        if !txn.responding {
            return false;
        }
        if txn.read {
            if txn.read_done || txn.bit_count >= 8 {
                return false;
            }
            txn.current_read
                .is_some_and(|byte| (byte >> (7 - txn.bit_count)) & 1 == 0)
        } else {
            txn.bit_count == 8 && self.ack_override != Some(false)
        }
    }

    fn run_controller(&mut self, sda: bool, design_holds_scl: bool) {
        let ctl = &mut self.controller;
        if ctl.program.is_empty() {
            let bus_free = ctl.holding || (self.txn.is_none() && sda && !design_holds_scl);
            if !bus_free {
                return;
            }
            let Some(request) = ctl.requests.pop_front() else {
                return;
            };
            ctl.program = ProgramBuilder::build(&request, ctl.holding);
            ctl.holding = matches!(
                request,
                I2cCommand::Write { stop: false, .. } | I2cCommand::Read { stop: false, .. }
            );
            ctl.remaining = ctl.divisor;
            ctl.active = true;
        }

        let Some(quarter) = ctl.program.front().copied() else {
            return;
        };
        self.scl_pull = !quarter.scl;
        self.sda_pull = !quarter.sda;

        // Clock stretching: a released SCL held low by the design pauses the controller.
        if quarter.scl && design_holds_scl {
            return;
        }

        ctl.remaining -= 1;
        if ctl.remaining > 0 {
            return;
        }
        ctl.program.pop_front();
        ctl.remaining = ctl.divisor;
        if quarter.mark == Mark::CheckAck && sda {
            // NACK: finish the ACK clock, then go straight to the tail.
            let falling = ctl.program.pop_front();
            while ctl.program.front().is_some_and(|q| q.mark != Mark::Tail) {
                ctl.program.pop_front();
            }
            if let Some(falling) = falling {
                ctl.program.push_front(falling);
            }
        }
        if ctl.program.is_empty() {
            ctl.active = false;
        }
    }

    pub fn finish(&mut self, timestamp: Timestamp, events: &mut EventBuffer) {
        self.report_missing_stop(timestamp, events);
    }
}
