// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::event::EventBuffer;
use crate::signals::{DesignIn, DesignOut, PinSpace, Width};
use crate::{SimResult, SimulationError, Timestamp};
use padring_config::{InputCommand, SpiConfig};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
enum SpiEvent {
    Select,
    Deselect {
        transfers: u32,
    },
    Transfer {
        width: u8,
        copi: u32,
        cipo: u32,
        continuation: bool,
    },
    TransferError {
        reason: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        bits: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<bool>,
    },
}

/// Data the responder shifts out for one logical transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SpiResponse {
    pub value: u32,
    #[serde(default)]
    pub width: Option<u8>,
    /// When set, the transfer must (or must not) follow another one in the
    /// same chip-select assertion.
    #[serde(default)]
    pub continuation: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpiCommand {
    Respond(SpiResponse),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
enum SpiRequest {
    Respond(SpiResponse),
}

#[derive(Debug, Clone, Copy)]
struct Transfer {
    width: u8,
    tx: u32,
    rx: u32,
    bits_in: u8,
    bits_out: u8,
}

impl Transfer {
    fn bit(&self, index: u8) -> bool {
        (self.tx >> (self.width - 1 - index)) & 1 == 1
    }
}

#[derive(Debug, Clone, Copy)]
enum Selection {
    Idle,
    Active { transfers: u32, current: Transfer },
    /// A protocol error occurred; ignore the bus until chip-select releases.
    Faulted { transfers: u32 },
}

/// Generic full-duplex shift-register responder, MSB first.
#[derive(Debug)]
pub struct SpiTarget {
    name: String,
    sck: DesignOut,
    csn: DesignOut,
    copi: DesignOut,
    cipo: DesignIn,
    cs_active_low: bool,
    cpol: bool,
    cpha: bool,
    word_width: u8,
    responses: VecDeque<SpiResponse>,
    selection: Selection,
    last_sck: bool,
}

impl SpiTarget {
    pub fn new(name: &str, config: &SpiConfig, pins: &mut PinSpace) -> SimResult<Self> {
        if config.mode > 3 || config.word_width == 0 || config.word_width > 32 {
            return Err(SimulationError::InvalidModel {
                model: name.to_string(),
                reason: format!(
                    "invalid SPI mode {} / word width {}",
                    config.mode, config.word_width
                ),
            });
        }
        let cpol = config.mode & 0b10 != 0;
        Ok(Self {
            name: name.to_string(),
            sck: pins.observe(&config.pins.sck, Width::W1)?,
            csn: pins.observe(&config.pins.csn, Width::W1)?,
            copi: pins.observe(&config.pins.copi, Width::W1)?,
            cipo: pins.claim(&config.pins.cipo, Width::W1, name, 0)?,
            cs_active_low: config.cs_active_low,
            cpol,
            cpha: config.mode & 0b01 != 0,
            word_width: config.word_width,
            responses: VecDeque::new(),
            selection: Selection::Idle,
            last_sck: cpol,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse_command(&self, command: &InputCommand) -> Result<SpiCommand, String> {
        let SpiRequest::Respond(response) = super::decode_request::<SpiRequest>(command)?;
        let width = response.width.unwrap_or(self.word_width);
        if width == 0 || width > 32 {
            return Err(format!("transfer width {} is outside 1-32", width));
        }
        if width < 32 && response.value >> width != 0 {
            return Err(format!(
                "value {:#x} does not fit in {} bits",
                response.value, width
            ));
        }
        Ok(SpiCommand::Respond(response))
    }

    pub fn apply(&mut self, command: &SpiCommand) {
        match command {
            SpiCommand::Respond(response) => self.responses.push_back(*response),
        }
    }

    /// Starts the next logical transfer, or faults if the scripted chaining disagrees.
    fn begin_transfer(
        &mut self,
        timestamp: Timestamp,
        transfers: u32,
        events: &mut EventBuffer,
    ) -> Selection {
        let response = self.responses.pop_front().unwrap_or(SpiResponse {
            value: 0,
            width: None,
            continuation: None,
        });
        if let Some(expected) = response.continuation {
            if expected != (transfers > 0) {
                tracing::warn!("{}: transfer chaining mismatch", self.name);
                events.emit(
                    timestamp,
                    &self.name,
                    &SpiEvent::TransferError {
                        reason: "chain_mismatch",
                        bits: None,
                        expected: Some(expected),
                    },
                );
                return Selection::Faulted { transfers };
            }
        }
        Selection::Active {
            transfers,
            current: Transfer {
                width: response.width.unwrap_or(self.word_width),
                tx: response.value,
                rx: 0,
                bits_in: 0,
                bits_out: 0,
            },
        }
    }

    fn shift_out(&self, pins: &mut PinSpace, transfer: &mut Transfer) {
        if transfer.bits_out < transfer.width {
            self.cipo.set(pins, transfer.bit(transfer.bits_out) as u8);
            transfer.bits_out += 1;
        }
    }

    pub fn step(&mut self, timestamp: Timestamp, pins: &mut PinSpace, events: &mut EventBuffer) {
        let cs_active = self.csn.bit(pins, 0) != self.cs_active_low;
        let sck = self.sck.bit(pins, 0);
        let edge = sck != self.last_sck;
        self.last_sck = sck;

        let selection = self.selection;
        match selection {
            Selection::Idle if cs_active => {
                events.emit(timestamp, &self.name, &SpiEvent::Select);
                self.selection = self.begin_transfer(timestamp, 0, events);
                if let Selection::Active {
                    transfers,
                    mut current,
                } = self.selection
                {
                    if !self.cpha {
                        self.shift_out(pins, &mut current);
                    }
                    self.selection = Selection::Active { transfers, current };
                }
            }
            Selection::Idle => {}
            Selection::Active { transfers, current } if !cs_active => {
                if current.bits_in > 0 {
                    events.emit(
                        timestamp,
                        &self.name,
                        &SpiEvent::TransferError {
                            reason: "partial_transfer",
                            bits: Some(current.bits_in),
                            expected: None,
                        },
                    );
                }
                self.deselect(timestamp, transfers, pins, events);
            }
            Selection::Faulted { transfers } if !cs_active => {
                self.deselect(timestamp, transfers, pins, events);
            }
            Selection::Active {
                transfers,
                mut current,
            } if edge => {
                let leading = sck != self.cpol;
                if leading != self.cpha {
                    current.rx = (current.rx << 1) | self.copi.bit(pins, 0) as u32;
                    current.bits_in += 1;
                    if current.bits_in == current.width {
                        let mask = if current.width == 32 {
                            u32::MAX
                        } else {
                            (1u32 << current.width) - 1
                        };
                        events.emit(
                            timestamp,
                            &self.name,
                            &SpiEvent::Transfer {
                                width: current.width,
                                copi: current.rx,
                                cipo: current.tx & mask,
                                continuation: transfers > 0,
                            },
                        );
                        self.selection = self.begin_transfer(timestamp, transfers + 1, events);
                        return;
                    }
                } else {
                    self.shift_out(pins, &mut current);
                }
                self.selection = Selection::Active { transfers, current };
            }
            Selection::Active { .. } | Selection::Faulted { .. } => {}
        }
    }

    fn deselect(
        &mut self,
        timestamp: Timestamp,
        transfers: u32,
        pins: &mut PinSpace,
        events: &mut EventBuffer,
    ) {
        events.emit(timestamp, &self.name, &SpiEvent::Deselect { transfers });
        self.cipo.release(pins);
        self.selection = Selection::Idle;
    }
}
