// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::event::EventBuffer;
use crate::signals::{PinSpace, TriState, Width};
use crate::{SimResult, Timestamp};
use padring_config::{GpioConfig, InputCommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
enum GpioEvent {
    Change { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpioCommand {
    /// Scripted input: `mask` selects the bits the model drives.
    Set { value: u8, mask: u8 },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GpioValue {
    Number(u64),
    Bits(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
enum GpioRequest {
    Set { value: GpioValue },
}

/// Bank of bidirectional pins with per-bit output enable.
#[derive(Debug)]
pub struct Gpio {
    name: String,
    line: TriState,
    width: Width,
    input: u8,
    input_mask: u8,
    /// Last observed (value, enable) pair driven by the design.
    last: Option<(u8, u8)>,
}

impl Gpio {
    pub fn new(name: &str, config: &GpioConfig, pins: &mut PinSpace) -> SimResult<Self> {
        let width = Width::from_bits(config.width)?;
        let line = TriState::bind(
            pins,
            &config.pins.o,
            &config.pins.oe,
            &config.pins.i,
            width,
            name,
            config.pull,
        )?;
        Ok(Self {
            name: name.to_string(),
            line,
            width,
            input: config.input & width.mask(),
            input_mask: width.mask(),
            last: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse_command(&self, command: &InputCommand) -> Result<GpioCommand, String> {
        let GpioRequest::Set { value } = super::decode_request::<GpioRequest>(command)?;
        let bits = self.width.bits();
        match value {
            GpioValue::Number(n) => {
                if n > self.width.mask() as u64 {
                    return Err(format!("value {:#x} does not fit in {} bits", n, bits));
                }
                Ok(GpioCommand::Set {
                    value: n as u8,
                    mask: self.width.mask(),
                })
            }
            GpioValue::Bits(text) => {
                if text.chars().count() != bits as usize {
                    return Err(format!(
                        "bit string '{}' must have exactly {} characters",
                        text, bits
                    ));
                }
                let mut value = 0u8;
                let mut mask = 0u8;
                for (i, c) in text.chars().enumerate() {
                    let bit = 1u8 << (bits as usize - 1 - i);
                    match c {
                        '0' => mask |= bit,
                        '1' => {
                            mask |= bit;
                            value |= bit;
                        }
                        'z' | 'Z' => {}
                        other => return Err(format!("invalid bit '{}' in '{}'", other, text)),
                    }
                }
                Ok(GpioCommand::Set { value, mask })
            }
        }
    }

    pub fn apply(&mut self, command: &GpioCommand) {
        match *command {
            GpioCommand::Set { value, mask } => {
                tracing::debug!("{}: input {:#04x} mask {:#04x}", self.name, value, mask);
                self.input = value;
                self.input_mask = mask;
            }
        }
    }

    /// MSB-first rendering with `Z` for bits the design does not drive.
    fn render(&self, value: u8, oe: u8) -> String {
        (0..self.width.bits())
            .rev()
            .map(|bit| match ((oe >> bit) & 1, (value >> bit) & 1) {
                (0, _) => 'Z',
                (_, 0) => '0',
                _ => '1',
            })
            .collect()
    }

    pub fn step(&mut self, timestamp: Timestamp, pins: &mut PinSpace, events: &mut EventBuffer) {
        let oe = self.line.get_oe(pins);
        let observed = (self.line.design_driven(pins), oe);

        if self.last != Some(observed) {
            if self.last.is_some() {
                let value = self.render(observed.0, observed.1);
                events.emit(timestamp, &self.name, &GpioEvent::Change { value });
            }
            self.last = Some(observed);
        }

        self.line.write(pins, self.input, self.input_mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::signals::PinId;
    use padring_config::GpioPins;
    use serde_json::json;

    struct Bench {
        gpio: Gpio,
        pins: PinSpace,
        o: PinId,
        oe: PinId,
        i: PinId,
    }

    fn setup(width: u8, pull: u8) -> Bench {
        let mut pins = PinSpace::new();
        let config = GpioConfig {
            pins: GpioPins {
                o: "gpio_o".to_string(),
                oe: "gpio_oe".to_string(),
                i: "gpio_i".to_string(),
            },
            width,
            input: 0,
            pull,
        };
        let gpio = Gpio::new("gpio_0", &config, &mut pins).unwrap();
        Bench {
            o: pins.find("gpio_o").unwrap(),
            oe: pins.find("gpio_oe").unwrap(),
            i: pins.find("gpio_i").unwrap(),
            gpio,
            pins,
        }
    }

    fn command(args: serde_json::Value) -> InputCommand {
        InputCommand {
            timestamp: 0,
            target: "gpio_0".to_string(),
            command: "set".to_string(),
            args,
        }
    }

    #[test]
    fn test_first_observation_primes_silently() {
        let mut b = setup(8, 0);
        let mut events = EventBuffer::new();
        b.pins.publish(b.o, 0xAA);
        b.pins.publish(b.oe, 0xFF);
        b.gpio.step(0, &mut b.pins, &mut events);
        b.gpio.step(1, &mut b.pins, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_changes_logged_in_order_with_z() {
        let mut b = setup(8, 0);
        let mut events = EventBuffer::new();
        b.gpio.step(0, &mut b.pins, &mut events);

        b.pins.publish(b.oe, 0x0F);
        b.pins.publish(b.o, 0x05);
        b.gpio.step(1, &mut b.pins, &mut events);
        b.gpio.step(2, &mut b.pins, &mut events);
        b.pins.publish(b.o, 0xF6);
        b.gpio.step(3, &mut b.pins, &mut events);

        let events: Vec<Event> = events.drain().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, 1);
        assert_eq!(events[0].payload, json!({"value": "ZZZZ0101"}));
        // High nibble is not enabled, so only the low nibble changes.
        assert_eq!(events[1].timestamp, 3);
        assert_eq!(events[1].payload, json!({"value": "ZZZZ0110"}));
    }

    #[test]
    fn test_scripted_input_respects_output_enable() {
        let mut b = setup(4, 0);
        let mut events = EventBuffer::new();
        let cmd = b.gpio.parse_command(&command(json!({"value": 0b1111}))).unwrap();
        b.gpio.apply(&cmd);

        b.pins.publish(b.oe, 0b0011);
        b.pins.publish(b.o, 0b0000);
        b.gpio.step(0, &mut b.pins, &mut events);
        assert_eq!(b.pins.read(b.i), 0b1100);
    }

    #[test]
    fn test_released_bits_float_to_pull() {
        let mut b = setup(4, 0b1010);
        let mut events = EventBuffer::new();
        let cmd = b.gpio.parse_command(&command(json!({"value": "ZZ01"}))).unwrap();
        assert_eq!(
            cmd,
            GpioCommand::Set {
                value: 0b0001,
                mask: 0b0011
            }
        );
        b.gpio.apply(&cmd);
        b.gpio.step(0, &mut b.pins, &mut events);
        assert_eq!(b.pins.read(b.i), 0b1001);
    }

    #[test]
    fn test_bad_set_values_rejected() {
        let b = setup(4, 0);
        assert!(b.gpio.parse_command(&command(json!({"value": 16}))).is_err());
        assert!(b.gpio.parse_command(&command(json!({"value": "01"}))).is_err());
        assert!(b.gpio.parse_command(&command(json!({"value": "01x1"}))).is_err());
    }
}
