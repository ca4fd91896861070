// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Serial NOR flash with single, dual, quad and QPI transfers.

use crate::event::EventBuffer;
use crate::signals::{DesignOut, PinSpace, TriState, Width};
use crate::{SimResult, SimulationError, Timestamp};
use bitflags::bitflags;
use padring_config::{parse_size, FlashConfig};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

const READ: u8 = 0x03;
const FAST_READ: u8 = 0x0B;
const DUAL_OUTPUT_READ: u8 = 0x3B;
const QUAD_OUTPUT_READ: u8 = 0x6B;
const DUAL_IO_READ: u8 = 0xBB;
const QUAD_IO_READ: u8 = 0xEB;
const READ_ID: u8 = 0x9F;
const READ_STATUS1: u8 = 0x05;
const READ_STATUS2: u8 = 0x35;
const WRITE_ENABLE: u8 = 0x06;
const WRITE_DISABLE: u8 = 0x04;
const WRITE_STATUS: u8 = 0x01;
const WRITE_STATUS2: u8 = 0x31;
const ENTER_QPI: u8 = 0x38;
const EXIT_QPI: u8 = 0xFF;
const RELEASE_POWER_DOWN: u8 = 0xAB;
const ENABLE_RESET: u8 = 0x66;
const RESET: u8 = 0x99;

bitflags! {
    /// Status registers 1 (low byte) and 2 (high byte).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u16 {
        const BUSY = 1 << 0;
        const WEL = 1 << 1;
        const QE = 1 << 9;
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
enum FlashEvent {
    ReadId {
        id: Vec<u8>,
    },
    Read {
        opcode: u8,
        address: u32,
        length: usize,
    },
    Qspi {
        enabled: bool,
    },
    QuadMode {
        enabled: bool,
    },
    PowerUp,
    Reset,
    CommandError {
        reason: &'static str,
        opcode: u8,
    },
    AddressError {
        address: u32,
    },
    TransactionAborted {
        #[serde(skip_serializing_if = "Option::is_none")]
        opcode: Option<u8>,
        phase: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Command,
    Address,
    Mode,
    Dummy { clocks: u8 },
    DataOut,
    DataIn,
    /// Rest of the transaction is discarded.
    Ignore,
}

impl Phase {
    /// Name reported when chip-select interrupts this phase.
    fn abort_name(self) -> Option<&'static str> {
        match self {
            Phase::Command => Some("command"),
            Phase::Address => Some("address"),
            Phase::Mode => Some("mode"),
            Phase::Dummy { .. } => Some("dummy"),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Transaction {
    phase: Phase,
    opcode: Option<u8>,
    shift: u32,
    bits: u8,
    address: u32,
    out_byte: u8,
    out_bits: u8,
    bytes_loaded: usize,
    out_clocks: usize,
    data_in: Vec<u8>,
    /// Opened from continuous read mode; cleared by the first clock that
    /// is not all ones.
    continued: bool,
}

impl Transaction {
    fn new(phase: Phase, opcode: Option<u8>) -> Self {
        Self {
            phase,
            opcode,
            shift: 0,
            bits: 0,
            address: 0,
            out_byte: 0,
            out_bits: 0,
            bytes_loaded: 0,
            out_clocks: 0,
            data_in: Vec::new(),
            continued: false,
        }
    }

    fn resumed(opcode: u8) -> Self {
        Self {
            continued: true,
            ..Self::new(Phase::Address, Some(opcode))
        }
    }
}

fn lane_mask(lines: u8) -> u8 {
    ((1u16 << lines) - 1) as u8
}

#[derive(Debug)]
pub struct SpiFlash {
    name: String,
    clk: DesignOut,
    csn: DesignOut,
    data: TriState,
    memory: Vec<u8>,
    image_sha256: Option<String>,
    jedec_id: Vec<u8>,
    log_reads: bool,
    status: Status,
    qpi: bool,
    /// Opcode replayed at the next chip-select after an `0xAx` mode byte.
    continuous: Option<u8>,
    reset_armed: bool,
    txn: Transaction,
    last_clk: bool,
    drive: u8,
    drive_mask: u8,
}

impl SpiFlash {
    pub fn new(name: &str, config: &FlashConfig, pins: &mut PinSpace) -> SimResult<Self> {
        let size = parse_size(&config.size).map_err(|e| SimulationError::InvalidModel {
            model: name.to_string(),
            reason: format!("{:#}", e),
        })?;
        if size == 0 || size > u32::MAX as u64 || config.jedec_id.is_empty() {
            return Err(SimulationError::InvalidModel {
                model: name.to_string(),
                reason: "flash size must be non-zero and fit 32-bit addressing, with a JEDEC ID"
                    .to_string(),
            });
        }
        let data = TriState::bind(
            pins,
            &config.pins.d_o,
            &config.pins.d_oe,
            &config.pins.d_i,
            Width::W4,
            name,
            0,
        )?;
        Ok(Self {
            name: name.to_string(),
            clk: pins.observe(&config.pins.clk, Width::W1)?,
            csn: pins.observe(&config.pins.csn, Width::W1)?,
            data,
            memory: vec![0xFF; size as usize],
            image_sha256: None,
            jedec_id: config.jedec_id.clone(),
            log_reads: config.log_reads,
            status: Status::empty(),
            qpi: false,
            continuous: None,
            reset_armed: false,
            txn: Transaction::new(Phase::Idle, None),
            last_clk: false,
            drive: 0,
            drive_mask: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.memory.len() as u64
    }

    pub fn load_image(&mut self, path: &Path, offset: u64) -> SimResult<()> {
        let bytes = std::fs::read(path).map_err(|source| SimulationError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        tracing::info!(
            "{}: loading {} bytes from {:?} at {:#x} (sha256 {})",
            self.name,
            bytes.len(),
            path,
            offset,
            digest
        );
        self.load_bytes(offset, &bytes)?;
        self.image_sha256 = Some(digest);
        Ok(())
    }

    /// Digest of the last image loaded from a file.
    pub fn image_sha256(&self) -> Option<&str> {
        self.image_sha256.as_deref()
    }

    pub fn load_bytes(&mut self, offset: u64, bytes: &[u8]) -> SimResult<()> {
        let size = self.size();
        let end = offset.checked_add(bytes.len() as u64);
        match end {
            Some(end) if end <= size => {
                let start = offset as usize;
                self.memory[start..start + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(SimulationError::ImageOutOfRange {
                len: bytes.len(),
                offset,
                size,
            }),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Number of IO lines used by `phase` of the current transaction.
    fn lines(&self, phase: Phase) -> u8 {
        if self.qpi {
            return 4;
        }
        let opcode = self.txn.opcode;
        match phase {
            Phase::Address | Phase::Mode => match opcode {
                Some(DUAL_IO_READ) => 2,
                Some(QUAD_IO_READ) => 4,
                _ => 1,
            },
            Phase::DataOut => match opcode {
                Some(DUAL_OUTPUT_READ) | Some(DUAL_IO_READ) => 2,
                Some(QUAD_OUTPUT_READ) | Some(QUAD_IO_READ) => 4,
                _ => 1,
            },
            _ => 1,
        }
    }

    fn shift_in(&mut self, io: u8, lines: u8, width: u8) -> Option<u32> {
        let txn = &mut self.txn;
        txn.shift = (txn.shift << lines) | (io & lane_mask(lines)) as u32;
        txn.bits += lines;
        if txn.bits < width {
            return None;
        }
        let value = txn.shift;
        txn.shift = 0;
        txn.bits = 0;
        Some(value)
    }

    fn error(&mut self, timestamp: Timestamp, reason: &'static str, opcode: u8, events: &mut EventBuffer) {
        tracing::warn!("{}: {} for opcode {:#04x}", self.name, reason, opcode);
        events.emit(
            timestamp,
            &self.name,
            &FlashEvent::CommandError { reason, opcode },
        );
        self.txn.phase = Phase::Ignore;
    }

    fn decode_opcode(&mut self, timestamp: Timestamp, opcode: u8, events: &mut EventBuffer) {
        self.txn.opcode = Some(opcode);
        let reset_armed = std::mem::replace(&mut self.reset_armed, false);
        let quad_enabled = self.status.contains(Status::QE);

        self.txn.phase = match opcode {
            READ | FAST_READ | DUAL_OUTPUT_READ | DUAL_IO_READ => Phase::Address,
            QUAD_OUTPUT_READ if quad_enabled => Phase::Address,
            QUAD_IO_READ if quad_enabled || self.qpi => Phase::Address,
            QUAD_OUTPUT_READ | QUAD_IO_READ => {
                return self.error(timestamp, "quad_not_enabled", opcode, events);
            }
            READ_ID | READ_STATUS1 | READ_STATUS2 => Phase::DataOut,
            WRITE_ENABLE => {
                self.status.insert(Status::WEL);
                Phase::Ignore
            }
            WRITE_DISABLE => {
                self.status.remove(Status::WEL);
                Phase::Ignore
            }
            WRITE_STATUS | WRITE_STATUS2 => {
                if !self.status.contains(Status::WEL) {
                    return self.error(timestamp, "write_not_enabled", opcode, events);
                }
                Phase::DataIn
            }
            ENTER_QPI => {
                if !quad_enabled {
                    return self.error(timestamp, "quad_not_enabled", opcode, events);
                }
                if !self.qpi {
                    self.qpi = true;
                    events.emit(timestamp, &self.name, &FlashEvent::QuadMode { enabled: true });
                }
                Phase::Ignore
            }
            EXIT_QPI => {
                if self.qpi {
                    self.qpi = false;
                    events.emit(timestamp, &self.name, &FlashEvent::QuadMode { enabled: false });
                }
                Phase::Ignore
            }
            RELEASE_POWER_DOWN => {
                events.emit(timestamp, &self.name, &FlashEvent::PowerUp);
                Phase::Ignore
            }
            ENABLE_RESET => {
                self.reset_armed = true;
                Phase::Ignore
            }
            RESET => {
                if reset_armed {
                    // QE is non-volatile and survives a software reset.
                    self.status &= Status::QE;
                    self.qpi = false;
                    self.continuous = None;
                    events.emit(timestamp, &self.name, &FlashEvent::Reset);
                }
                Phase::Ignore
            }
            _ => return self.error(timestamp, "unknown_command", opcode, events),
        };
    }

    fn after_address(&self, opcode: Option<u8>) -> Phase {
        match opcode {
            Some(FAST_READ) | Some(DUAL_OUTPUT_READ) | Some(QUAD_OUTPUT_READ) => {
                Phase::Dummy { clocks: 8 }
            }
            Some(DUAL_IO_READ) | Some(QUAD_IO_READ) => Phase::Mode,
            _ => Phase::DataOut,
        }
    }

    /// Rising clock edge: sample the design's lines.
    fn sample(&mut self, timestamp: Timestamp, io: u8, events: &mut EventBuffer) {
        let phase = self.txn.phase;
        let lines = self.lines(phase);
        match phase {
            Phase::Command => {
                if let Some(opcode) = self.shift_in(io, lines, 8) {
                    self.decode_opcode(timestamp, opcode as u8, events);
                }
            }
            Phase::Address => {
                if self.txn.continued {
                    let mask = lane_mask(lines);
                    if io & mask != mask {
                        self.txn.continued = false;
                    } else if self.txn.bits + lines >= 8 {
                        // A full byte of ones is the mode bit reset, not an address.
                        tracing::debug!("{}: continuous read mode reset", self.name);
                        self.continuous = None;
                        self.txn.phase = Phase::Ignore;
                        return;
                    }
                }
                if let Some(address) = self.shift_in(io, lines, 24) {
                    let address = address & 0x00FF_FFFF;
                    if address as u64 >= self.size() {
                        tracing::warn!("{}: address {:#x} out of range", self.name, address);
                        events.emit(timestamp, &self.name, &FlashEvent::AddressError { address });
                        self.txn.phase = Phase::Ignore;
                    } else {
                        self.txn.address = address;
                        self.txn.phase = self.after_address(self.txn.opcode);
                    }
                }
            }
            Phase::Mode => {
                if let Some(mode) = self.shift_in(io, lines, 8) {
                    self.continuous = if mode & 0xF0 == 0xA0 {
                        self.txn.opcode
                    } else {
                        None
                    };
                    self.txn.phase = match self.txn.opcode {
                        Some(QUAD_IO_READ) => Phase::Dummy { clocks: 4 },
                        _ => Phase::DataOut,
                    };
                }
            }
            Phase::Dummy { clocks } => {
                self.txn.phase = if clocks <= 1 {
                    Phase::DataOut
                } else {
                    Phase::Dummy { clocks: clocks - 1 }
                };
            }
            Phase::DataOut => self.txn.out_clocks += 1,
            Phase::DataIn => {
                if let Some(byte) = self.shift_in(io, lines, 8) {
                    self.txn.data_in.push(byte as u8);
                }
            }
            Phase::Idle | Phase::Ignore => {}
        }
    }

    fn next_out_byte(&mut self) -> u8 {
        let index = self.txn.bytes_loaded;
        self.txn.bytes_loaded += 1;
        match self.txn.opcode {
            Some(READ_ID) => self.jedec_id[index % self.jedec_id.len()],
            Some(READ_STATUS1) => self.status.bits() as u8,
            Some(READ_STATUS2) => (self.status.bits() >> 8) as u8,
            _ => {
                let address = (self.txn.address as usize + index) % self.memory.len();
                self.memory[address]
            }
        }
    }

    /// Falling clock edge: present the next output bits.
    fn shift_out(&mut self) {
        if self.txn.phase != Phase::DataOut {
            return;
        }
        let lines = self.lines(Phase::DataOut);
        if self.txn.out_bits == 0 {
            self.txn.out_byte = self.next_out_byte();
            self.txn.out_bits = 8;
        }
        self.txn.out_bits -= lines;
        let bits = (self.txn.out_byte >> self.txn.out_bits) & lane_mask(lines);
        if lines == 1 {
            // Single-line transfers answer on IO1.
            self.drive = bits << 1;
            self.drive_mask = 0b0010;
        } else {
            self.drive = bits;
            self.drive_mask = lane_mask(lines);
        }
    }

    fn write_status(&mut self, timestamp: Timestamp, opcode: u8, bytes: &[u8], events: &mut EventBuffer) {
        let before = self.status;
        let mut bits = before.bits();
        let volatile = (Status::BUSY | Status::WEL).bits();
        match (opcode, bytes) {
            (WRITE_STATUS, [sr1]) => bits = (bits & 0xFF00) | (*sr1 as u16 & !volatile),
            (WRITE_STATUS, [sr1, sr2, ..]) => bits = ((*sr2 as u16) << 8) | (*sr1 as u16 & !volatile),
            (WRITE_STATUS2, [sr2, ..]) => bits = (bits & 0x00FF) | ((*sr2 as u16) << 8),
            _ => return,
        }
        self.status = Status::from_bits_retain(bits);
        self.status.remove(Status::WEL);
        let enabled = self.status.contains(Status::QE);
        if enabled != before.contains(Status::QE) {
            tracing::info!("{}: quad enable {}", self.name, enabled);
            events.emit(timestamp, &self.name, &FlashEvent::Qspi { enabled });
        }
    }

    fn end_transaction(&mut self, timestamp: Timestamp, events: &mut EventBuffer) {
        let txn = std::mem::replace(&mut self.txn, Transaction::new(Phase::Idle, None));
        self.drive = 0;
        self.drive_mask = 0;

        let interrupted = match txn.phase {
            Phase::Command => txn.bits > 0,
            phase => phase.abort_name().is_some(),
        };
        if interrupted {
            if let Some(phase) = txn.phase.abort_name() {
                tracing::debug!("{}: transaction aborted in {} phase", self.name, phase);
                events.emit(
                    timestamp,
                    &self.name,
                    &FlashEvent::TransactionAborted {
                        opcode: txn.opcode,
                        phase,
                    },
                );
            }
            return;
        }

        let Some(opcode) = txn.opcode else {
            return;
        };
        let lines = if self.qpi { 4 } else {
            match opcode {
                DUAL_OUTPUT_READ | DUAL_IO_READ => 2,
                QUAD_OUTPUT_READ | QUAD_IO_READ => 4,
                _ => 1,
            }
        };
        let length = txn.out_clocks * lines / 8;
        match opcode {
            READ_ID if txn.phase == Phase::DataOut && length > 0 => {
                let id = (0..length)
                    .map(|i| self.jedec_id[i % self.jedec_id.len()])
                    .collect();
                events.emit(timestamp, &self.name, &FlashEvent::ReadId { id });
            }
            READ | FAST_READ | DUAL_OUTPUT_READ | QUAD_OUTPUT_READ | DUAL_IO_READ
            | QUAD_IO_READ
                if self.log_reads && txn.phase == Phase::DataOut && length > 0 =>
            {
                events.emit(
                    timestamp,
                    &self.name,
                    &FlashEvent::Read {
                        opcode,
                        address: txn.address,
                        length,
                    },
                );
            }
            WRITE_STATUS | WRITE_STATUS2 if txn.phase == Phase::DataIn => {
                self.write_status(timestamp, opcode, &txn.data_in, events);
            }
            _ => {}
        }
    }

    pub fn step(&mut self, timestamp: Timestamp, pins: &mut PinSpace, events: &mut EventBuffer) {
        let selected = !self.csn.bit(pins, 0);
        let clk = self.clk.bit(pins, 0);

        if !selected {
            if self.txn.phase != Phase::Idle {
                self.end_transaction(timestamp, events);
            }
        } else {
            if self.txn.phase == Phase::Idle {
                self.txn = match self.continuous {
                    Some(opcode) => Transaction::resumed(opcode),
                    None => Transaction::new(Phase::Command, None),
                };
            }
            if clk && !self.last_clk {
                let io = self.data.design_driven(pins);
                self.sample(timestamp, io, events);
            } else if !clk && self.last_clk {
                self.shift_out();
            }
        }

        self.last_clk = clk;
        self.data.write(pins, self.drive, self.drive_mask);
    }
}
