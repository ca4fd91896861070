// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::event::EventBuffer;
use crate::signals::{DesignIn, DesignOut, DigitalLevel, PinSpace, Width};
use crate::{SimResult, SimulationError, Timestamp, STEPS_PER_CYCLE};
use padring_config::{InputCommand, UartConfig};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
enum UartEvent {
    ByteReceived {
        byte: u8,
    },
    ByteSent {
        byte: u8,
    },
    FramingError {
        reason: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        byte: Option<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UartCommand {
    Send(Vec<u8>),
}

#[derive(Debug, Deserialize)]
struct SendArgs {
    #[serde(default)]
    byte: Option<u8>,
    #[serde(default)]
    bytes: Option<Vec<u8>>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
enum UartRequest {
    Send(SendArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    /// `index` 0 is the start bit, 1..=8 data bits, 9 the stop bit.
    Receiving {
        next_sample: Timestamp,
        index: u8,
        byte: u8,
    },
    /// Stop bit was low; wait for the line to return high.
    Break,
}

#[derive(Debug, Clone, Copy)]
struct TxFrame {
    byte: u8,
    start: Timestamp,
}

/// Asynchronous serial line: samples the design's TX and drives its RX.
#[derive(Debug)]
pub struct Uart {
    name: String,
    tx: DesignOut,
    rx: DesignIn,
    /// Timestamps per bit.
    bit_period: u64,
    last_level: DigitalLevel,
    rx_state: RxState,
    tx_queue: VecDeque<u8>,
    tx_frame: Option<TxFrame>,
    echo: bool,
    line: Vec<u8>,
}

impl Uart {
    pub fn new(name: &str, config: &UartConfig, pins: &mut PinSpace) -> SimResult<Self> {
        if config.baud_divisor == 0 {
            return Err(SimulationError::InvalidModel {
                model: name.to_string(),
                reason: "baud divisor must be greater than zero".to_string(),
            });
        }
        let tx = pins.observe(&config.pins.tx, Width::W1)?;
        let rx = pins.claim(&config.pins.rx, Width::W1, name, 1)?;
        Ok(Self {
            name: name.to_string(),
            tx,
            rx,
            bit_period: config.baud_divisor as u64 * STEPS_PER_CYCLE,
            last_level: DigitalLevel::High,
            rx_state: RxState::Idle,
            tx_queue: VecDeque::new(),
            tx_frame: None,
            echo: config.echo,
            line: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse_command(command: &InputCommand) -> Result<UartCommand, String> {
        match super::decode_request::<UartRequest>(command)? {
            UartRequest::Send(args) => {
                let mut bytes = Vec::new();
                if let Some(byte) = args.byte {
                    bytes.push(byte);
                }
                if let Some(more) = args.bytes {
                    bytes.extend(more);
                }
                if let Some(text) = args.text {
                    bytes.extend(text.into_bytes());
                }
                if bytes.is_empty() {
                    return Err("'send' needs one of 'byte', 'bytes' or 'text'".to_string());
                }
                Ok(UartCommand::Send(bytes))
            }
        }
    }

    pub fn apply(&mut self, command: &UartCommand) {
        match command {
            UartCommand::Send(bytes) => self.tx_queue.extend(bytes.iter().copied()),
        }
    }

    pub fn step(&mut self, timestamp: Timestamp, pins: &mut PinSpace, events: &mut EventBuffer) {
        self.sample(timestamp, pins, events);
        self.drive(timestamp, pins, events);
    }

    fn sample(&mut self, timestamp: Timestamp, pins: &PinSpace, events: &mut EventBuffer) {
        let level = self.tx.level(pins);
        let high = level == DigitalLevel::High;

        let state = self.rx_state;
        self.rx_state = match state {
            RxState::Idle if self.last_level == DigitalLevel::High && !high => {
                RxState::Receiving {
                    next_sample: timestamp + self.bit_period / 2,
                    index: 0,
                    byte: 0,
                }
            }
            RxState::Receiving {
                next_sample,
                index,
                byte,
            } if timestamp >= next_sample => match index {
                0 if high => {
                    events.emit(
                        timestamp,
                        &self.name,
                        &UartEvent::FramingError {
                            reason: "glitch",
                            byte: None,
                        },
                    );
                    RxState::Idle
                }
                1..=8 => RxState::Receiving {
                    next_sample: next_sample + self.bit_period,
                    index: index + 1,
                    byte: byte | ((high as u8) << (index - 1)),
                },
                9 if high => {
                    events.emit(timestamp, &self.name, &UartEvent::ByteReceived { byte });
                    self.record(byte);
                    RxState::Idle
                }
                9 => {
                    tracing::warn!("{}: framing error on byte {:#04x}", self.name, byte);
                    events.emit(
                        timestamp,
                        &self.name,
                        &UartEvent::FramingError {
                            reason: "stop_bit",
                            byte: Some(byte),
                        },
                    );
                    RxState::Break
                }
                _ => RxState::Receiving {
                    next_sample: next_sample + self.bit_period,
                    index: index + 1,
                    byte,
                },
            },
            RxState::Break if high => RxState::Idle,
            other => other,
        };

        self.last_level = level;
    }

    fn drive(&mut self, timestamp: Timestamp, pins: &mut PinSpace, events: &mut EventBuffer) {
        if let Some(frame) = self.tx_frame {
            if (timestamp - frame.start) / self.bit_period >= 10 {
                events.emit(
                    timestamp,
                    &self.name,
                    &UartEvent::ByteSent { byte: frame.byte },
                );
                self.tx_frame = None;
            }
        }

        if self.tx_frame.is_none() {
            if let Some(byte) = self.tx_queue.pop_front() {
                self.tx_frame = Some(TxFrame {
                    byte,
                    start: timestamp,
                });
            }
        }

        let level = match self.tx_frame {
            None => true,
            Some(frame) => match (timestamp - frame.start) / self.bit_period {
                0 => false,
                bit @ 1..=8 => (frame.byte >> (bit - 1)) & 1 == 1,
                _ => true,
            },
        };
        self.rx.set_level(pins, level.into());
    }

    fn record(&mut self, byte: u8) {
        if !self.echo {
            return;
        }
        if byte == b'\n' {
            self.flush_line();
        } else if byte != b'\r' {
            self.line.push(byte);
        }
    }

    fn flush_line(&mut self) {
        tracing::info!("{}: {}", self.name, String::from_utf8_lossy(&self.line));
        self.line.clear();
    }

    pub fn finish(&mut self, _timestamp: Timestamp, _events: &mut EventBuffer) {
        if self.echo && !self.line.is_empty() {
            self.flush_line();
        }
        if !self.tx_queue.is_empty() || self.tx_frame.is_some() {
            tracing::debug!(
                "{}: run ended with {} bytes still queued",
                self.name,
                self.tx_queue.len() + self.tx_frame.is_some() as usize
            );
        }
    }
}
