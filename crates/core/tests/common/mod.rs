// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![allow(dead_code)]

use padring_config::{BenchManifest, InputScript};
use padring_core::event::parse_log;
use padring_core::{Design, Event, EventLog, Harness, PinId, PinSpace, RunSummary, SimResult, SimulationError};
use std::collections::HashMap;
use std::path::Path;

pub const SOC: &str = r#"
name: soc
design: { library: libsoc.so }
clock: clk
reset: { pin: rst }
cycles: 100
models:
  - name: flash
    type: flash
    size: 64KiB
    log_reads: true
    pins: { clk: flash_clk, csn: flash_csn, d_o: flash_d_o, d_oe: flash_d_oe, d_i: flash_d_i }
  - name: uart_0
    type: uart
    baud_divisor: 2
    pins: { tx: uart_tx, rx: uart_rx }
  - name: gpio_0
    type: gpio
    pins: { o: gpio_o, oe: gpio_oe, i: gpio_i }
  - name: i2c_0
    type: i2c
    address: 80
    pins: { sda_oe: i2c_sda_oe, sda_i: i2c_sda_i, scl_oe: i2c_scl_oe, scl_i: i2c_scl_i }
  - name: spi_0
    type: spi
    pins: { sck: spi_sck, csn: spi_csn, copi: spi_copi, cipo: spi_cipo }
"#;

/// Levels every output returns to between transactions.
const IDLE: [(&str, u8); 8] = [
    ("uart_tx", 1),
    ("flash_csn", 1),
    ("flash_clk", 0),
    ("gpio_o", 0),
    ("gpio_oe", 0),
    ("i2c_sda_oe", 0),
    ("i2c_scl_oe", 0),
    ("spi_csn", 1),
];

/// Bus activity on every output: a start bit, a selected flash with a rising
/// clock, driven GPIOs, an I2C START and a selected SPI target.
const BUSY: [(&str, u8); 8] = [
    ("uart_tx", 0),
    ("flash_csn", 0),
    ("flash_clk", 1),
    ("gpio_o", 0xA5),
    ("gpio_oe", 0xFF),
    ("i2c_sda_oe", 1),
    ("i2c_scl_oe", 0),
    ("spi_csn", 0),
];

/// Output values applied by the design on one rising clock edge.
pub type Row = Vec<(&'static str, u8)>;

/// Behavioural stand-in for a compiled design: replays one row of output
/// values per rising clock edge once reset is released.
#[derive(Debug)]
pub struct Pattern {
    initial: Row,
    rows: Vec<Row>,
    watch: Option<&'static str>,
    loopback: Option<(&'static str, &'static str)>,
    reset_noise: bool,
    reset_steps: usize,
    ports: HashMap<&'static str, PinId>,
    clk: Option<PinId>,
    rst: Option<PinId>,
    last_clk: u8,
    started: bool,
    cursor: usize,
    /// Watched pin, sampled on every rising edge before the row is applied.
    pub samples: Vec<u8>,
}

impl Pattern {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            initial: vec![("uart_tx", 1), ("flash_csn", 1), ("spi_csn", 1)],
            rows,
            watch: None,
            loopback: None,
            reset_noise: false,
            reset_steps: 0,
            ports: HashMap::new(),
            clk: None,
            rst: None,
            last_clk: 0,
            started: false,
            cursor: 0,
            samples: Vec::new(),
        }
    }

    pub fn watching(mut self, pin: &'static str) -> Self {
        self.watch = Some(pin);
        self
    }

    /// Alternates every output between idle and busy levels on each step
    /// while reset is asserted, ending idle when reset is released.
    pub fn toggling_in_reset(mut self) -> Self {
        self.reset_noise = true;
        self
    }

    /// Copies `from` to `to` on every step.
    pub fn with_loopback(mut self, from: &'static str, to: &'static str) -> Self {
        self.loopback = Some((from, to));
        self
    }

    fn port(&self, name: &str) -> Option<PinId> {
        self.ports.get(name).copied()
    }

    fn apply(&self, pins: &mut PinSpace, row: &Row) {
        for (name, value) in row {
            if let Some(id) = self.port(name) {
                pins.publish(id, *value);
            }
        }
    }
}

impl Design for Pattern {
    fn bind(&mut self, pins: &PinSpace) -> SimResult<()> {
        let mut names: Vec<&'static str> = vec!["clk", "rst"];
        names.extend(self.initial.iter().map(|(n, _)| *n));
        names.extend(self.rows.iter().flatten().map(|(n, _)| *n));
        names.extend(self.watch);
        if self.reset_noise {
            names.extend(IDLE.iter().map(|(n, _)| *n));
        }
        if let Some((from, to)) = self.loopback {
            names.push(from);
            names.push(to);
        }
        for name in names {
            let id = pins
                .find(name)
                .ok_or_else(|| SimulationError::DesignBinding(format!("no port '{}'", name)))?;
            self.ports.insert(name, id);
        }
        self.clk = self.port("clk");
        self.rst = self.port("rst");
        Ok(())
    }

    fn step(&mut self, pins: &mut PinSpace) {
        let (Some(clk), Some(rst)) = (self.clk, self.rst) else {
            return;
        };
        if !self.started {
            let initial = self.initial.clone();
            self.apply(pins, &initial);
            self.started = true;
        }

        let level = pins.read(clk);
        let rising = level == 1 && self.last_clk == 0;
        self.last_clk = level;

        let in_reset = pins.read(rst) == 1;
        if in_reset && self.reset_noise {
            let levels = if self.reset_steps % 2 == 1 { BUSY } else { IDLE };
            self.apply(pins, &levels.to_vec());
            self.reset_steps += 1;
        }

        if rising && !in_reset {
            if let Some(id) = self.watch.and_then(|w| self.port(w)) {
                self.samples.push(pins.read(id));
            }
            if let Some(row) = self.rows.get(self.cursor).cloned() {
                self.apply(pins, &row);
                self.cursor += 1;
            }
        }

        if let Some((from, to)) = self.loopback {
            if let (Some(from), Some(to)) = (self.port(from), self.port(to)) {
                let level = pins.read(from);
                pins.publish(to, level);
            }
        }
    }
}

pub fn manifest(cycles: u64) -> BenchManifest {
    let mut manifest = BenchManifest::from_yaml(SOC).unwrap();
    manifest.cycles = cycles;
    manifest
}

pub struct Outcome {
    pub events: Vec<Event>,
    pub summary: RunSummary,
    pub log: Vec<u8>,
    pub samples: Vec<u8>,
}

pub fn run_with(manifest: &BenchManifest, design: Pattern, script: Option<&str>) -> Outcome {
    let mut harness = Harness::new(design, manifest, Path::new(".")).unwrap();
    if let Some(json) = script {
        harness
            .load_script(&InputScript::from_json(json).unwrap())
            .unwrap();
    }
    let (log, summary) = harness
        .run(manifest.cycles, EventLog::new(Vec::new()).unwrap())
        .unwrap();
    let events = parse_log(std::str::from_utf8(&log).unwrap()).unwrap();
    Outcome {
        events,
        summary,
        log,
        samples: harness.design().samples.clone(),
    }
}

pub fn run(cycles: u64, design: Pattern, script: Option<&str>) -> Outcome {
    run_with(&manifest(cycles), design, script)
}

pub fn of_kind<'a>(events: &'a [Event], kind: &str) -> Vec<&'a Event> {
    events.iter().filter(|e| e.kind == kind).collect()
}

/// Single-line SPI byte on the flash pins, MSB first: two rows per bit.
pub fn flash_byte(byte: u8) -> Vec<Row> {
    (0..8)
        .rev()
        .flat_map(|i| {
            [
                vec![
                    ("flash_d_o", (byte >> i) & 1),
                    ("flash_d_oe", 1),
                    ("flash_clk", 0),
                ],
                vec![("flash_clk", 1)],
            ]
        })
        .collect()
}

/// `bits` read clocks; the flash output is valid in the sample taken before
/// the second row of each pair.
/// One quad-lane clock with the design driving `nibble` on all four lines.
pub fn flash_quad_nibble(nibble: u8) -> Vec<Row> {
    vec![
        vec![("flash_d_o", nibble), ("flash_d_oe", 0xF), ("flash_clk", 0)],
        vec![("flash_clk", 1)],
    ]
}

/// One chip-selected single-line flash command with its payload bytes.
pub fn flash_command(bytes: &[u8]) -> Vec<Row> {
    let mut rows = vec![vec![("flash_csn", 0)]];
    for byte in bytes {
        rows.extend(flash_byte(*byte));
    }
    rows.push(vec![("flash_d_oe", 0), ("flash_csn", 1)]);
    rows
}

pub fn flash_read_clocks(bits: usize) -> Vec<Row> {
    (0..bits)
        .flat_map(|_| {
            [
                vec![("flash_d_oe", 0), ("flash_clk", 0)],
                vec![("flash_clk", 1)],
            ]
        })
        .collect()
}

/// Reassembles bytes from samples of `flash_d_i` taken during read clocks
/// whose first row is at `first_row`.
pub fn flash_bytes_from_samples(samples: &[u8], first_row: usize, count: usize) -> Vec<u8> {
    (0..count)
        .map(|byte| {
            (0..8).fold(0u8, |acc, bit| {
                let index = first_row + 2 * (byte * 8 + bit) + 1;
                (acc << 1) | ((samples[index] >> 1) & 1)
            })
        })
        .collect()
}

/// Mode 0 SPI word on `spi_copi`, MSB first: two rows per bit.
pub fn spi_word(value: u32, width: u8) -> Vec<Row> {
    (0..width)
        .rev()
        .flat_map(|i| {
            [
                vec![("spi_copi", ((value >> i) & 1) as u8), ("spi_sck", 0)],
                vec![("spi_sck", 1)],
            ]
        })
        .collect()
}

/// Design-side I2C controller rows: a set OE pulls the line low.
pub fn i2c_start() -> Vec<Row> {
    vec![vec![("i2c_sda_oe", 1)], vec![("i2c_scl_oe", 1)]]
}

pub fn i2c_bit(level: bool) -> Vec<Row> {
    vec![
        vec![("i2c_sda_oe", !level as u8)],
        vec![("i2c_scl_oe", 0)],
        vec![("i2c_scl_oe", 1)],
    ]
}

pub fn i2c_byte(byte: u8) -> Vec<Row> {
    let mut rows: Vec<Row> = (0..8).rev().flat_map(|i| i2c_bit((byte >> i) & 1 == 1)).collect();
    // Release SDA for the target's ACK.
    rows.extend(i2c_bit(true));
    rows
}

pub fn i2c_stop() -> Vec<Row> {
    vec![
        vec![("i2c_sda_oe", 1)],
        vec![("i2c_scl_oe", 0)],
        vec![("i2c_sda_oe", 0)],
    ]
}

pub fn i2c_write(address: u8, data: &[u8], stop: bool) -> Vec<Row> {
    let mut rows = i2c_start();
    rows.extend(i2c_byte(address << 1));
    for byte in data {
        rows.extend(i2c_byte(*byte));
    }
    if stop {
        rows.extend(i2c_stop());
    }
    rows
}
