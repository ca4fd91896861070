// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Events emitted by models and the append-only log they are written to.

use crate::{SimResult, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub source: String,
    pub kind: String,
    pub payload: Value,
}

impl Event {
    /// Identity of an event with its timestamp left out.
    fn signature(&self) -> String {
        format!("{}/{}/{}", self.source, self.kind, self.payload)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{} {} {} {}",
            self.timestamp, self.source, self.kind, self.payload
        )
    }
}

/// Collects events emitted by models during one step.
///
/// Model event enums are serialized with `#[serde(tag = "kind", content = "payload")]`;
/// the tag becomes the event kind and the content its payload.
#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: Vec<Event>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit<E: Serialize>(&mut self, timestamp: Timestamp, source: &str, event: &E) {
        let (kind, payload) = match serde_json::to_value(event) {
            Ok(Value::Object(mut map)) => {
                let kind = match map.remove("kind") {
                    Some(Value::String(kind)) => kind,
                    _ => "unknown".to_string(),
                };
                let payload = map
                    .remove("payload")
                    .unwrap_or_else(|| Value::Object(Default::default()));
                (kind, payload)
            }
            Ok(other) => {
                tracing::error!("{}: malformed event {}", source, other);
                ("unknown".to_string(), other)
            }
            Err(e) => {
                tracing::error!("{}: failed to encode event: {}", source, e);
                ("unknown".to_string(), Value::Null)
            }
        };
        self.push(Event {
            timestamp,
            source: source.to_string(),
            kind,
            payload,
        });
    }

    pub fn push(&mut self, event: Event) {
        self.pending.push(event);
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Event> {
        self.pending.drain(..)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub events: u64,
    pub sha256: String,
}

/// Append-only JSON event log: `{"events":[ ... ]}`, one event per line.
///
/// Opened once by construction and closed once by [`EventLog::close`],
/// which consumes the log.
pub struct EventLog<W: Write> {
    writer: W,
    events: u64,
    hasher: Sha256,
}

impl EventLog<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> EventLog<W> {
    pub fn new(writer: W) -> SimResult<Self> {
        let mut log = Self {
            writer,
            events: 0,
            hasher: Sha256::new(),
        };
        log.write_raw(b"{\"events\":[")?;
        Ok(log)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> SimResult<()> {
        self.hasher.update(bytes);
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn append(&mut self, event: &Event) -> SimResult<()> {
        let mut record = Vec::with_capacity(128);
        let separator: &[u8] = if self.events == 0 { b"\n" } else { b",\n" };
        record.extend_from_slice(separator);
        serde_json::to_writer(&mut record, event)?;
        self.write_raw(&record)?;
        self.events += 1;
        Ok(())
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn close(mut self) -> SimResult<(W, LogSummary)> {
        self.write_raw(b"\n]}\n")?;
        self.writer.flush()?;
        let summary = LogSummary {
            events: self.events,
            sha256: format!("{:x}", self.hasher.finalize()),
        };
        Ok((self.writer, summary))
    }
}

impl<W: Write> fmt::Debug for EventLog<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventLog({} events)", self.events)
    }
}

#[derive(Deserialize)]
struct LogDocument {
    events: Vec<Event>,
}

pub fn parse_log(json: &str) -> SimResult<Vec<Event>> {
    let doc: LogDocument = serde_json::from_str(json)?;
    Ok(doc.events)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    Length {
        reference: usize,
        candidate: usize,
    },
    Event {
        index: usize,
        reference: Box<Event>,
        candidate: Box<Event>,
    },
    Count {
        signature: String,
        reference: usize,
        candidate: usize,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Length {
                reference,
                candidate,
            } => write!(
                f,
                "event count differs: reference has {}, candidate has {}",
                reference, candidate
            ),
            Mismatch::Event {
                index,
                reference,
                candidate,
            } => write!(
                f,
                "event #{} differs: expected {}, got {}",
                index, reference, candidate
            ),
            Mismatch::Count {
                signature,
                reference,
                candidate,
            } => write!(
                f,
                "{} occurs {} times in reference, {} in candidate",
                signature, reference, candidate
            ),
        }
    }
}

/// Compares two logs ignoring timestamps. Ordered comparison reports the
/// first differing event; unordered comparison reports every event whose
/// occurrence count differs.
pub fn compare_events(reference: &[Event], candidate: &[Event], ordered: bool) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    if ordered {
        if reference.len() != candidate.len() {
            mismatches.push(Mismatch::Length {
                reference: reference.len(),
                candidate: candidate.len(),
            });
        }
        let first_diff = reference
            .iter()
            .zip(candidate)
            .enumerate()
            .find(|(_, (r, c))| r.signature() != c.signature());
        if let Some((index, (r, c))) = first_diff {
            mismatches.push(Mismatch::Event {
                index,
                reference: Box::new(r.clone()),
                candidate: Box::new(c.clone()),
            });
        }
        return mismatches;
    }

    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for event in reference {
        counts.entry(event.signature()).or_default().0 += 1;
    }
    for event in candidate {
        counts.entry(event.signature()).or_default().1 += 1;
    }
    for (signature, (r, c)) in counts {
        if r != c {
            mismatches.push(Mismatch::Count {
                signature,
                reference: r,
                candidate: c,
            });
        }
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
    enum Sample {
        ByteReceived { byte: u8 },
        Select,
    }

    fn event(ts: Timestamp, kind: &str, payload: Value) -> Event {
        Event {
            timestamp: ts,
            source: "uart_0".to_string(),
            kind: kind.to_string(),
            payload,
        }
    }

    #[test]
    fn test_emit_splits_kind_and_payload() {
        let mut buffer = EventBuffer::new();
        buffer.emit(7, "uart_0", &Sample::ByteReceived { byte: 0x48 });
        buffer.emit(8, "spi_0", &Sample::Select);
        let events: Vec<Event> = buffer.drain().collect();
        assert_eq!(events[0].kind, "byte_received");
        assert_eq!(events[0].payload, json!({"byte": 72}));
        assert_eq!(events[1].kind, "select");
        assert_eq!(events[1].payload, json!({}));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_log_document_format() {
        let mut log = EventLog::new(Vec::new()).unwrap();
        log.append(&event(3, "byte_received", json!({"byte": 65})))
            .unwrap();
        log.append(&event(9, "byte_sent", json!({"byte": 66}))).unwrap();
        let (bytes, summary) = log.close().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "{\"events\":[\n\
             {\"timestamp\":3,\"source\":\"uart_0\",\"kind\":\"byte_received\",\"payload\":{\"byte\":65}},\n\
             {\"timestamp\":9,\"source\":\"uart_0\",\"kind\":\"byte_sent\",\"payload\":{\"byte\":66}}\n\
             ]}\n"
        );
        assert_eq!(summary.events, 2);
        assert_eq!(summary.sha256.len(), 64);

        let parsed = parse_log(&text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].payload["byte"], 66);
    }

    #[test]
    fn test_empty_log_is_valid_json() {
        let log = EventLog::new(Vec::new()).unwrap();
        let (bytes, summary) = log.close().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"events": []}));
        assert_eq!(summary.events, 0);
    }

    #[test]
    fn test_identical_logs_hash_identically() {
        let run = || {
            let mut log = EventLog::new(Vec::new()).unwrap();
            log.append(&event(1, "change", json!({"value": "0101ZZZZ"})))
                .unwrap();
            log.close().unwrap().1
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_compare_ignores_timestamps() {
        let a = vec![event(1, "byte_received", json!({"byte": 1}))];
        let b = vec![event(99, "byte_received", json!({"byte": 1}))];
        assert!(compare_events(&a, &b, true).is_empty());
    }

    #[test]
    fn test_compare_ordered_reports_first_difference() {
        let a = vec![
            event(1, "byte_received", json!({"byte": 1})),
            event(2, "byte_received", json!({"byte": 2})),
        ];
        let b = vec![
            event(1, "byte_received", json!({"byte": 2})),
            event(2, "byte_received", json!({"byte": 1})),
        ];
        let mismatches = compare_events(&a, &b, true);
        assert_eq!(mismatches.len(), 1);
        assert!(matches!(mismatches[0], Mismatch::Event { index: 0, .. }));
        assert!(compare_events(&a, &b, false).is_empty());
    }

    #[test]
    fn test_compare_unordered_counts() {
        let a = vec![event(1, "byte_received", json!({"byte": 1}))];
        let b = vec![
            event(1, "byte_received", json!({"byte": 1})),
            event(2, "byte_received", json!({"byte": 1})),
        ];
        let mismatches = compare_events(&a, &b, false);
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].to_string().contains("1 times in reference, 2"));
    }
}
