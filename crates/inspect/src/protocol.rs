// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use padring_core::signals::PinView;
use padring_core::{Direction, Event, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Status,
    /// Stop the run at the next clock edge.
    Pause,
    Resume,
    /// Pause once the run reaches `timestamp`.
    Break { timestamp: Timestamp },
    ClearBreak,
    /// Pin values, only while paused.
    Pins,
    /// The most recent events.
    Events,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Waiting,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSnapshot {
    pub name: String,
    pub width: u8,
    pub direction: String,
    pub value: u8,
}

impl From<PinView<'_>> for PinSnapshot {
    fn from(pin: PinView<'_>) -> Self {
        let direction = match pin.direction {
            Direction::FromDesign => "from_design",
            Direction::ToDesign => "to_design",
        };
        Self {
            name: pin.name.to_string(),
            width: pin.width.bits(),
            direction: direction.to_string(),
            value: pin.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Status {
        state: RunState,
        timestamp: Timestamp,
        breakpoint: Option<Timestamp>,
    },
    Ok,
    Pins {
        timestamp: Timestamp,
        pins: Vec<PinSnapshot>,
    },
    Events {
        events: Vec<Event>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req: Request = serde_json::from_value(json!({"command": "break", "timestamp": 40})).unwrap();
        assert_eq!(req, Request::Break { timestamp: 40 });
        let req: Request = serde_json::from_value(json!({"command": "clear_break"})).unwrap();
        assert_eq!(req, Request::ClearBreak);
        assert!(serde_json::from_value::<Request>(json!({"command": "poke"})).is_err());
    }

    #[test]
    fn test_status_wire_format() {
        let resp = Response::Status {
            state: RunState::Paused,
            timestamp: 8,
            breakpoint: None,
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"type": "status", "state": "paused", "timestamp": 8, "breakpoint": null})
        );
    }
}
