// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Behavioural peripheral models attached to the design's pads.

pub mod flash;
pub mod gpio;
pub mod i2c;
pub mod spi;
pub mod uart;

pub use flash::SpiFlash;
pub use gpio::{Gpio, GpioCommand};
pub use i2c::{I2cBus, I2cCommand};
pub use spi::{SpiCommand, SpiTarget};
pub use uart::{Uart, UartCommand};

use crate::event::EventBuffer;
use crate::signals::PinSpace;
use crate::{SimResult, Timestamp};
use padring_config::{InputCommand, ModelConfig, ModelKind};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;

/// Decodes `{command, args}` into a model's adjacently tagged request enum.
pub(crate) fn decode_request<T: DeserializeOwned>(command: &InputCommand) -> Result<T, String> {
    let args = if command.args.is_null() {
        json!({})
    } else {
        command.args.clone()
    };
    serde_json::from_value(json!({"command": command.command, "args": args}))
        .map_err(|e| e.to_string())
}

#[derive(Debug)]
pub enum Model {
    Flash(SpiFlash),
    Uart(Uart),
    Gpio(Gpio),
    Spi(SpiTarget),
    I2c(I2cBus),
}

/// A parsed input command, typed for the model it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCommand {
    Uart(UartCommand),
    Gpio(GpioCommand),
    Spi(SpiCommand),
    I2c(I2cCommand),
}

impl Model {
    /// Builds a model and binds its pins. Relative image paths resolve
    /// against `base_dir`.
    pub fn from_config(
        config: &ModelConfig,
        pins: &mut PinSpace,
        base_dir: &Path,
    ) -> SimResult<Self> {
        let name = config.name.as_str();
        let model = match &config.kind {
            ModelKind::Flash(flash) => {
                let mut model = SpiFlash::new(name, flash, pins)?;
                if let Some(image) = &flash.image {
                    model.load_image(&base_dir.join(image), flash.image_offset)?;
                }
                Model::Flash(model)
            }
            ModelKind::Uart(uart) => Model::Uart(Uart::new(name, uart, pins)?),
            ModelKind::Gpio(gpio) => Model::Gpio(Gpio::new(name, gpio, pins)?),
            ModelKind::Spi(spi) => Model::Spi(SpiTarget::new(name, spi, pins)?),
            ModelKind::I2c(i2c) => Model::I2c(I2cBus::new(name, i2c, pins)?),
        };
        tracing::debug!("Model '{}' ({}) bound", name, model.kind());
        Ok(model)
    }

    pub fn name(&self) -> &str {
        match self {
            Model::Flash(m) => m.name(),
            Model::Uart(m) => m.name(),
            Model::Gpio(m) => m.name(),
            Model::Spi(m) => m.name(),
            Model::I2c(m) => m.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Model::Flash(_) => "flash",
            Model::Uart(_) => "uart",
            Model::Gpio(_) => "gpio",
            Model::Spi(_) => "spi",
            Model::I2c(_) => "i2c",
        }
    }

    pub fn step(&mut self, timestamp: Timestamp, pins: &mut PinSpace, events: &mut EventBuffer) {
        match self {
            Model::Flash(m) => m.step(timestamp, pins, events),
            Model::Uart(m) => m.step(timestamp, pins, events),
            Model::Gpio(m) => m.step(timestamp, pins, events),
            Model::Spi(m) => m.step(timestamp, pins, events),
            Model::I2c(m) => m.step(timestamp, pins, events),
        }
    }

    pub fn parse_command(&self, command: &InputCommand) -> Result<ModelCommand, String> {
        match self {
            Model::Flash(_) => Err(format!(
                "flash models accept no input commands (got '{}')",
                command.command
            )),
            Model::Uart(_) => Uart::parse_command(command).map(ModelCommand::Uart),
            Model::Gpio(m) => m.parse_command(command).map(ModelCommand::Gpio),
            Model::Spi(m) => m.parse_command(command).map(ModelCommand::Spi),
            Model::I2c(_) => I2cBus::parse_command(command).map(ModelCommand::I2c),
        }
    }

    pub fn apply(&mut self, timestamp: Timestamp, command: &ModelCommand) {
        tracing::trace!("@{} {} <- {:?}", timestamp, self.name(), command);
        match (self, command) {
            (Model::Uart(m), ModelCommand::Uart(c)) => m.apply(c),
            (Model::Gpio(m), ModelCommand::Gpio(c)) => m.apply(c),
            (Model::Spi(m), ModelCommand::Spi(c)) => m.apply(c),
            (Model::I2c(m), ModelCommand::I2c(c)) => m.apply(c),
            (model, command) => {
                tracing::warn!(
                    "Dropping {:?}: not a command for {} model '{}'",
                    command,
                    model.kind(),
                    model.name()
                );
            }
        }
    }

    /// Runs once after the last cycle.
    pub fn finish(&mut self, timestamp: Timestamp, events: &mut EventBuffer) {
        match self {
            Model::Uart(m) => m.finish(timestamp, events),
            Model::I2c(m) => m.finish(timestamp, events),
            Model::Flash(_) | Model::Gpio(_) | Model::Spi(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use padring_config::{BenchManifest, InputCommand};

    const BENCH: &str = r#"
design: { library: libdesign.so }
clock: clk
reset: { pin: rst }
cycles: 10
models:
  - name: uart_0
    type: uart
    pins: { tx: uart_tx, rx: uart_rx }
    baud_divisor: 4
  - name: flash
    type: flash
    size: 4KiB
    pins: { clk: f_clk, csn: f_csn, d_o: f_o, d_oe: f_oe, d_i: f_i }
"#;

    fn command(target: &str, command: &str, args: serde_json::Value) -> InputCommand {
        InputCommand {
            timestamp: 0,
            target: target.to_string(),
            command: command.to_string(),
            args,
        }
    }

    #[test]
    fn test_models_built_in_manifest_order() {
        let manifest = BenchManifest::from_yaml(BENCH).unwrap();
        let mut pins = PinSpace::new();
        let models: Vec<Model> = manifest
            .models
            .iter()
            .map(|m| Model::from_config(m, &mut pins, Path::new(".")).unwrap())
            .collect();
        assert_eq!(models[0].name(), "uart_0");
        assert_eq!(models[0].kind(), "uart");
        assert_eq!(models[1].kind(), "flash");
        assert!(pins.find("f_i").is_some());
    }

    #[test]
    fn test_commands_parsed_per_model() {
        let manifest = BenchManifest::from_yaml(BENCH).unwrap();
        let mut pins = PinSpace::new();
        let uart = Model::from_config(&manifest.models[0], &mut pins, Path::new(".")).unwrap();
        let flash = Model::from_config(&manifest.models[1], &mut pins, Path::new(".")).unwrap();

        let parsed = uart
            .parse_command(&command("uart_0", "send", serde_json::json!({"text": "hi"})))
            .unwrap();
        assert_eq!(parsed, ModelCommand::Uart(UartCommand::Send(b"hi".to_vec())));
        assert!(uart
            .parse_command(&command("uart_0", "launch", serde_json::Value::Null))
            .is_err());
        assert!(flash
            .parse_command(&command("flash", "send", serde_json::Value::Null))
            .is_err());
    }

    #[test]
    fn test_missing_image_is_config_error() {
        let yaml = BENCH.replace("size: 4KiB", "size: 4KiB\n    image: missing.bin");
        let manifest = BenchManifest::from_yaml(&yaml).unwrap();
        let mut pins = PinSpace::new();
        let err = Model::from_config(&manifest.models[1], &mut pins, Path::new("/nonexistent"))
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("missing.bin"));
    }
}
