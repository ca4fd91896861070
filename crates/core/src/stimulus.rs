// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Time-triggered delivery of scripted input commands.

use crate::models::{Model, ModelCommand};
use crate::{SimResult, SimulationError, Timestamp};
use padring_config::InputScript;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCommand {
    /// Position in the input script.
    pub index: usize,
    pub timestamp: Timestamp,
    /// Index of the target model in manifest order.
    pub target: usize,
    pub command: ModelCommand,
}

/// Replays an input script against the models. Every command is parsed up
/// front, so a bad target or argument fails before the first clock edge.
#[derive(Debug, Default)]
pub struct CommandPlayer {
    queue: Vec<ScheduledCommand>,
    cursor: usize,
}

impl CommandPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(script: &InputScript, models: &[Model]) -> SimResult<Self> {
        let mut queue = Vec::with_capacity(script.commands.len());
        let mut last: Timestamp = 0;

        for (index, input) in script.commands.iter().enumerate() {
            if input.timestamp < last {
                return Err(SimulationError::BadCommand {
                    index,
                    target: input.target.clone(),
                    reason: format!(
                        "timestamp {} precedes the previous command at {}",
                        input.timestamp, last
                    ),
                });
            }
            last = input.timestamp;

            let target = models
                .iter()
                .position(|m| m.name() == input.target)
                .ok_or_else(|| SimulationError::UnknownTarget {
                    index,
                    target: input.target.clone(),
                })?;
            let command = models[target].parse_command(input).map_err(|reason| {
                SimulationError::BadCommand {
                    index,
                    target: input.target.clone(),
                    reason,
                }
            })?;
            queue.push(ScheduledCommand {
                index,
                timestamp: input.timestamp,
                target,
                command,
            });
        }

        tracing::debug!("Scheduled {} input commands", queue.len());
        Ok(Self { queue, cursor: 0 })
    }

    /// Commands due at or before `now` that have not been delivered yet,
    /// in script order. They are consumed by this call.
    pub fn due(&mut self, now: Timestamp) -> &[ScheduledCommand] {
        let start = self.cursor;
        while self
            .queue
            .get(self.cursor)
            .is_some_and(|c| c.timestamp <= now)
        {
            self.cursor += 1;
        }
        &self.queue[start..self.cursor]
    }

    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::PinSpace;
    use padring_config::BenchManifest;
    use std::path::Path;

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
  - name: gpio_0
    type: gpio
    width: 4
    pins: { o: gpio_o, oe: gpio_oe, i: gpio_i }
"#;

    fn models() -> Vec<Model> {
        let manifest = BenchManifest::from_yaml(BENCH).unwrap();
        let mut pins = PinSpace::new();
        manifest
            .models
            .iter()
            .map(|m| Model::from_config(m, &mut pins, Path::new(".")).unwrap())
            .collect()
    }

    #[test]
    fn test_same_timestamp_in_file_order_and_late_commands_next_step() {
        let script = InputScript::from_json(
            r#"[
            {"timestamp": 4, "target": "gpio_0", "command": "set", "args": {"value": 1}},
            {"timestamp": 4, "target": "uart_0", "command": "send", "args": {"byte": 65}},
            {"timestamp": 7, "target": "gpio_0", "command": "set", "args": {"value": 2}}
        ]"#,
        )
        .unwrap();
        let mut player = CommandPlayer::load(&script, &models()).unwrap();
        assert_eq!(player.len(), 3);

        assert!(player.due(3).is_empty());
        let due: Vec<(usize, usize)> = player.due(4).iter().map(|c| (c.index, c.target)).collect();
        assert_eq!(due, vec![(0, 1), (1, 0)]);
        assert!(player.due(4).is_empty());

        // A command between two queries is delivered by the later one.
        assert!(player.due(6).is_empty());
        assert_eq!(player.due(8).len(), 1);
        assert_eq!(player.remaining(), 0);
    }

    #[test]
    fn test_unknown_target_rejected() {
        let script = InputScript::from_json(
            r#"[{"timestamp": 0, "target": "spi_9", "command": "respond", "args": {"value": 1}}]"#,
        )
        .unwrap();
        let err = CommandPlayer::load(&script, &models()).unwrap_err();
        assert!(matches!(err, SimulationError::UnknownTarget { index: 0, .. }));
        assert!(err.is_config());
    }

    #[test]
    fn test_bad_arguments_rejected() {
        let script = InputScript::from_json(
            r#"[{"timestamp": 0, "target": "gpio_0", "command": "set", "args": {"value": 99}}]"#,
        )
        .unwrap();
        let err = CommandPlayer::load(&script, &models()).unwrap_err();
        assert!(matches!(err, SimulationError::BadCommand { .. }));
    }

    #[test]
    fn test_out_of_order_script_rejected() {
        let mut script = InputScript::from_json(
            r#"[{"timestamp": 9, "target": "uart_0", "command": "send", "args": {"byte": 1}}]"#,
        )
        .unwrap();
        let mut earlier = script.commands[0].clone();
        earlier.timestamp = 2;
        script.commands.push(earlier);
        let err = CommandPlayer::load(&script, &models()).unwrap_err();
        assert!(err.to_string().contains("precedes"));
    }
}
