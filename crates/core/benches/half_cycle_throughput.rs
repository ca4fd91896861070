// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Harness throughput with every model kind attached.
//!
//! Run with: `cargo bench --bench half_cycle_throughput`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use padring_config::{BenchManifest, InputScript};
use padring_core::{Design, EventLog, Harness, PinId, PinSpace, SimResult};
use std::path::Path;

const BENCH: &str = r#"
name: bench
design: { library: libbench.so }
clock: clk
reset: { pin: rst }
cycles: 1000
models:
  - name: flash
    type: flash
    size: 1MiB
    pins: { clk: flash_clk, csn: flash_csn, d_o: flash_d_o, d_oe: flash_d_oe, d_i: flash_d_i }
  - name: uart_0
    type: uart
    baud_divisor: 4
    pins: { tx: uart_tx, rx: uart_rx }
  - name: gpio_0
    type: gpio
    pins: { o: gpio_o, oe: gpio_oe, i: gpio_i }
  - name: spi_0
    type: spi
    pins: { sck: spi_sck, csn: spi_csn, copi: spi_copi, cipo: spi_cipo }
  - name: i2c_0
    type: i2c
    pins: { sda_oe: i2c_sda_oe, sda_i: i2c_sda_i, scl_oe: i2c_scl_oe, scl_i: i2c_scl_i }
"#;

/// Echoes UART RX to TX and counts GPIO outputs up on every rising edge.
#[derive(Debug, Default)]
struct Echo {
    clk: Option<PinId>,
    rx: Option<PinId>,
    tx: Option<PinId>,
    gpio_o: Option<PinId>,
    gpio_oe: Option<PinId>,
    last_clk: u8,
    counter: u8,
}

impl Design for Echo {
    fn bind(&mut self, pins: &PinSpace) -> SimResult<()> {
        self.clk = pins.find("clk");
        self.rx = pins.find("uart_rx");
        self.tx = pins.find("uart_tx");
        self.gpio_o = pins.find("gpio_o");
        self.gpio_oe = pins.find("gpio_oe");
        Ok(())
    }

    fn step(&mut self, pins: &mut PinSpace) {
        if let (Some(rx), Some(tx)) = (self.rx, self.tx) {
            let level = pins.read(rx);
            pins.publish(tx, level);
        }
        let Some(clk) = self.clk else { return };
        let level = pins.read(clk);
        if level == 1 && self.last_clk == 0 {
            self.counter = self.counter.wrapping_add(1);
            if let (Some(o), Some(oe)) = (self.gpio_o, self.gpio_oe) {
                pins.publish(oe, 0xFF);
                pins.publish(o, self.counter >> 4);
            }
        }
        self.last_clk = level;
    }
}

fn run_cycles(manifest: &BenchManifest, script: &InputScript, cycles: u64) -> u64 {
    let mut harness = Harness::new(Echo::default(), manifest, Path::new(".")).unwrap();
    harness.load_script(script).unwrap();
    let (_, summary) = harness
        .run(cycles, EventLog::new(std::io::sink()).unwrap())
        .unwrap();
    summary.events
}

fn bench_idle_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("idle_models");
    let manifest = BenchManifest::from_yaml(BENCH).unwrap();
    let script = InputScript::default();

    for cycles in [1_000u64, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*cycles * 2));
        group.bench_with_input(BenchmarkId::new("cycles", cycles), cycles, |b, &cycles| {
            b.iter(|| black_box(run_cycles(&manifest, &script, cycles)));
        });
    }

    group.finish();
}

fn bench_uart_traffic(c: &mut Criterion) {
    let mut group = c.benchmark_group("uart_traffic");
    let manifest = BenchManifest::from_yaml(BENCH).unwrap();

    for bytes in [16usize, 128].iter() {
        let text: String = "0123456789abcdef".chars().cycle().take(*bytes).collect();
        let json = format!(
            r#"[{{"timestamp": 4, "target": "uart_0", "command": "send", "args": {{"text": "{}"}}}}]"#,
            text
        );
        let script = InputScript::from_json(&json).unwrap();
        // Ten bits at divisor 4 is 80 steps, or 40 cycles, per byte.
        let cycles = (*bytes as u64 + 2) * 40;
        group.throughput(Throughput::Elements(*bytes as u64));
        group.bench_with_input(BenchmarkId::new("bytes", bytes), &cycles, |b, &cycles| {
            b.iter(|| black_box(run_cycles(&manifest, &script, cycles)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_idle_models, bench_uart_traffic);
criterion_main!(benches);
