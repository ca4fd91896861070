// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One scripted stimulus: at `timestamp`, deliver `command` with `args` to the model named `target`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InputCommand {
    pub timestamp: u64,
    pub target: String,
    pub command: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputScriptFile {
    Wrapped { commands: Vec<InputCommand> },
    Bare(Vec<InputCommand>),
}

/// Ordered stimulus sequence, validated to be non-decreasing in time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct InputScript {
    pub commands: Vec<InputCommand>,
}

impl InputScript {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: InputScriptFile =
            serde_json::from_str(json).context("Failed to parse input command JSON")?;
        let commands = match file {
            InputScriptFile::Wrapped { commands } => commands,
            InputScriptFile::Bare(commands) => commands,
        };
        let script = Self { commands };
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        for (index, pair) in self.commands.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                anyhow::bail!(
                    "Input command #{} at timestamp {} precedes the previous command at {}",
                    index + 1,
                    pair[1].timestamp,
                    pair[0].timestamp
                );
            }
        }
        for (index, cmd) in self.commands.iter().enumerate() {
            if cmd.target.trim().is_empty() || cmd.command.trim().is_empty() {
                anyhow::bail!("Input command #{} needs both 'target' and 'command'", index);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

pub fn load_input_script<P: AsRef<Path>>(path: P) -> Result<InputScript> {
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read input commands at {:?}", path.as_ref()))?;
    let script = InputScript::from_json(&contents)
        .with_context(|| format!("Invalid input commands in {:?}", path.as_ref()))?;
    tracing::debug!("Loaded {} input commands", script.len());
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_and_wrapped_forms() {
        let bare = r#"[{"timestamp": 10, "target": "uart_0", "command": "send", "args": {"text": "hi"}}]"#;
        let wrapped = r#"{"commands": [{"timestamp": 10, "target": "uart_0", "command": "send", "args": {"text": "hi"}}]}"#;
        let a = InputScript::from_json(bare).unwrap();
        let b = InputScript::from_json(wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.commands[0].args["text"], "hi");
    }

    #[test]
    fn test_missing_args_defaults_to_null() {
        let script =
            InputScript::from_json(r#"[{"timestamp": 0, "target": "i2c_0", "command": "nack"}]"#)
                .unwrap();
        assert!(script.commands[0].args.is_null());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let json = r#"[
            {"timestamp": 20, "target": "gpio_0", "command": "set", "args": {"value": 1}},
            {"timestamp": 10, "target": "gpio_0", "command": "set", "args": {"value": 2}}
        ]"#;
        let err = InputScript::from_json(json).unwrap_err();
        assert!(err.to_string().contains("precedes"));
    }

    #[test]
    fn test_equal_timestamps_allowed() {
        let json = r#"[
            {"timestamp": 5, "target": "gpio_0", "command": "set", "args": {"value": 1}},
            {"timestamp": 5, "target": "gpio_0", "command": "set", "args": {"value": 2}}
        ]"#;
        assert_eq!(InputScript::from_json(json).unwrap().len(), 2);
    }
}
