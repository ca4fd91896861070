// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

mod input;

pub use input::{load_input_script, InputCommand, InputScript};

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_toplevel_symbol() -> String {
    "cxxrtl_design_create".to_string()
}

fn default_image_offset() -> u64 {
    0x0010_0000
}

fn default_flash_size() -> String {
    "16MiB".to_string()
}

fn default_jedec_id() -> Vec<u8> {
    vec![0xCA, 0x7C, 0xA7, 0xFF]
}

fn default_gpio_width() -> u8 {
    8
}

fn default_word_width() -> u8 {
    8
}

fn default_i2c_divisor() -> u32 {
    4
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DesignConfig {
    /// Shared library holding the compiled design.
    pub library: String,
    /// Hierarchical path of the toplevel inside the design, if not the root.
    #[serde(default)]
    pub top_path: Option<String>,
    #[serde(default = "default_toplevel_symbol")]
    pub toplevel_symbol: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResetConfig {
    pub pin: String,
    #[serde(default)]
    pub active_low: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FlashPins {
    pub clk: String,
    pub csn: String,
    pub d_o: String,
    pub d_oe: String,
    pub d_i: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FlashConfig {
    pub pins: FlashPins,
    /// Flat binary copied into the array at `image_offset`.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_image_offset")]
    pub image_offset: u64,
    #[serde(default = "default_flash_size")]
    pub size: String, // e.g. "16MiB"
    #[serde(default = "default_jedec_id")]
    pub jedec_id: Vec<u8>,
    /// Emit a `read` event for every completed read transaction.
    #[serde(default)]
    pub log_reads: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UartPins {
    pub tx: String,
    pub rx: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UartConfig {
    pub pins: UartPins,
    /// Clock cycles per bit.
    pub baud_divisor: u32,
    #[serde(default)]
    pub echo: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GpioPins {
    pub o: String,
    pub oe: String,
    pub i: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GpioConfig {
    pub pins: GpioPins,
    #[serde(default = "default_gpio_width")]
    pub width: u8,
    /// Initial scripted input value.
    #[serde(default)]
    pub input: u8,
    /// Level of bits nobody drives.
    #[serde(default)]
    pub pull: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SpiPins {
    pub sck: String,
    pub csn: String,
    pub copi: String,
    pub cipo: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SpiConfig {
    pub pins: SpiPins,
    #[serde(default = "default_true")]
    pub cs_active_low: bool,
    /// SPI mode 0-3, CPOL in bit 1 and CPHA in bit 0.
    #[serde(default)]
    pub mode: u8,
    #[serde(default = "default_word_width")]
    pub word_width: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct I2cPins {
    pub sda_oe: String,
    pub sda_i: String,
    pub scl_oe: String,
    pub scl_i: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct I2cConfig {
    pub pins: I2cPins,
    /// 7-bit target address this model answers to.
    #[serde(default)]
    pub address: Option<u8>,
    /// Timestamps per quarter bit when the model acts as controller.
    #[serde(default = "default_i2c_divisor")]
    pub clock_divisor: u32,
    /// Cycles of bus inactivity after which an open transaction is reported.
    #[serde(default)]
    pub stop_timeout_cycles: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    Flash(FlashConfig),
    Uart(UartConfig),
    Gpio(GpioConfig),
    Spi(SpiConfig),
    I2c(I2cConfig),
}

impl ModelKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ModelKind::Flash(_) => "flash",
            ModelKind::Uart(_) => "uart",
            ModelKind::Gpio(_) => "gpio",
            ModelKind::Spi(_) => "spi",
            ModelKind::I2c(_) => "i2c",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ModelKind,
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Model name cannot be empty");
        }
        match &self.kind {
            ModelKind::Flash(flash) => {
                let size = parse_size(&flash.size)
                    .with_context(|| format!("Model '{}': invalid flash size", self.name))?;
                if size == 0 {
                    anyhow::bail!("Model '{}': flash size must be greater than zero", self.name);
                }
                if flash.jedec_id.is_empty() {
                    anyhow::bail!("Model '{}': 'jedec_id' cannot be empty", self.name);
                }
            }
            ModelKind::Uart(uart) => {
                if uart.baud_divisor == 0 {
                    anyhow::bail!(
                        "Model '{}': 'baud_divisor' must be greater than zero",
                        self.name
                    );
                }
            }
            ModelKind::Gpio(gpio) => {
                if !matches!(gpio.width, 1 | 4 | 8) {
                    anyhow::bail!(
                        "Model '{}': unsupported GPIO width {} (expected 1, 4 or 8)",
                        self.name,
                        gpio.width
                    );
                }
            }
            ModelKind::Spi(spi) => {
                if spi.mode > 3 {
                    anyhow::bail!("Model '{}': SPI mode must be 0-3, got {}", self.name, spi.mode);
                }
                if spi.word_width == 0 || spi.word_width > 32 {
                    anyhow::bail!(
                        "Model '{}': 'word_width' must be 1-32, got {}",
                        self.name,
                        spi.word_width
                    );
                }
            }
            ModelKind::I2c(i2c) => {
                if let Some(address) = i2c.address {
                    if address > 0x7F {
                        anyhow::bail!(
                            "Model '{}': I2C address {:#x} does not fit in 7 bits",
                            self.name,
                            address
                        );
                    }
                }
                if i2c.clock_divisor == 0 {
                    anyhow::bail!(
                        "Model '{}': 'clock_divisor' must be greater than zero",
                        self.name
                    );
                }
                if i2c.stop_timeout_cycles == Some(0) {
                    anyhow::bail!(
                        "Model '{}': 'stop_timeout_cycles' must be greater than zero",
                        self.name
                    );
                }
            }
        }
        Ok(())
    }
}

/// A complete test bench: the design, its clock and reset, and the models around it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BenchManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub name: Option<String>,
    pub design: DesignConfig,
    pub clock: String,
    pub reset: ResetConfig,
    /// Clock cycles to run after the reset cycle.
    pub cycles: u64,
    #[serde(default)]
    pub event_log: Option<String>,
    #[serde(default)]
    pub input_commands: Option<String>,
    #[serde(default)]
    pub vcd: Option<String>,
    /// Address for the inspection endpoint, e.g. "127.0.0.1:0".
    #[serde(default)]
    pub inspect: Option<String>,
    pub models: Vec<ModelConfig>,
}

impl BenchManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open bench manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse Bench Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Bench Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.design.library.trim().is_empty() {
            anyhow::bail!("Design 'library' path cannot be empty");
        }

        if self.clock.trim().is_empty() || self.reset.pin.trim().is_empty() {
            anyhow::bail!("Clock and reset pin names cannot be empty");
        }

        if self.cycles == 0 {
            anyhow::bail!("'cycles' must be greater than zero");
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            model.validate()?;
            if !seen.insert(model.name.as_str()) {
                anyhow::bail!("Duplicate model name '{}'", model.name);
            }
        }

        Ok(())
    }
}

/// Resolves `path` against the directory holding `manifest_path`.
pub fn resolve_relative(manifest_path: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(candidate)
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BENCH: &str = r#"
schema_version: "1.0"
design:
  library: build/libsim_soc.so
clock: clk
reset:
  pin: rst_n
  active_low: true
cycles: 1000
models:
  - name: flash
    type: flash
    pins: { clk: flash__clk__o, csn: flash__csn__o, d_o: flash__d__o, d_oe: flash__d__oe, d_i: flash__d__i }
    image: software.bin
  - name: uart_0
    type: uart
    pins: { tx: uart_0__tx__o, rx: uart_0__rx__i }
    baud_divisor: 217
"#;

    #[test]
    fn test_valid_manifest() {
        let manifest = BenchManifest::from_yaml(BENCH).unwrap();
        assert_eq!(manifest.models.len(), 2);
        assert_eq!(manifest.design.toplevel_symbol, "cxxrtl_design_create");
        assert!(manifest.reset.active_low);

        let ModelKind::Flash(flash) = &manifest.models[0].kind else {
            panic!("expected flash model");
        };
        assert_eq!(flash.image_offset, 0x0010_0000);
        assert_eq!(flash.jedec_id, vec![0xCA, 0x7C, 0xA7, 0xFF]);
        assert_eq!(parse_size(&flash.size).unwrap(), 16 * 1024 * 1024);
        assert_eq!(manifest.models[1].kind.type_name(), "uart");
    }

    #[test]
    fn test_zero_divisor_rejected() {
        let yaml = BENCH.replace("baud_divisor: 217", "baud_divisor: 0");
        let err = BenchManifest::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("baud_divisor"));
    }

    #[test]
    fn test_duplicate_model_rejected() {
        let yaml = BENCH.replace("name: uart_0", "name: flash");
        let err = BenchManifest::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate model name 'flash'"));
    }

    #[test]
    fn test_zero_cycles_rejected() {
        let yaml = BENCH.replace("cycles: 1000", "cycles: 0");
        let err = BenchManifest::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("cycles"));
    }

    #[test]
    fn test_resolve_relative() {
        let manifest = Path::new("/benches/soc/bench.yaml");
        assert_eq!(
            resolve_relative(manifest, "software.bin"),
            PathBuf::from("/benches/soc/software.bin")
        );
        assert_eq!(
            resolve_relative(manifest, "/abs/image.bin"),
            PathBuf::from("/abs/image.bin")
        );
    }
}
