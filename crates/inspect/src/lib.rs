// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Optional inspection endpoint for a running harness.
//!
//! The endpoint listens on its own thread and talks to the simulation only
//! through [`HarnessObserver`]: a client can pause the run (the simulation
//! thread then blocks inside `on_half_cycle`), set a breakpoint timestamp and
//! read pin values and recent events. It never alters pins or events.
//! Disconnecting resumes a paused run.

pub mod protocol;
pub mod transport;

use padring_core::{Event, HarnessObserver, PinSpace, Timestamp};
use protocol::{PinSnapshot, Request, Response, RunState};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use transport::{Connection, Server};

/// Events kept for the `events` request.
pub const EVENT_HISTORY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("inspection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed inspection message: {0}")]
    Json(#[from] serde_json::Error),
}

pub type InspectResult<T> = Result<T, InspectError>;

#[derive(Debug)]
struct State {
    run: RunState,
    timestamp: Timestamp,
    connected: bool,
    pause_requested: bool,
    breakpoint: Option<Timestamp>,
    /// Captured on entering a pause.
    pins: Vec<PinSnapshot>,
    recent: VecDeque<Event>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, request: Request) -> Response {
        let mut state = self.lock();
        match request {
            Request::Status => Response::Status {
                state: state.run,
                timestamp: state.timestamp,
                breakpoint: state.breakpoint,
            },
            Request::Pause => {
                state.pause_requested = true;
                Response::Ok
            }
            Request::Resume => {
                state.pause_requested = false;
                self.changed.notify_all();
                Response::Ok
            }
            Request::Break { timestamp } => {
                if timestamp <= state.timestamp && state.run != RunState::Waiting {
                    return Response::Error {
                        message: format!(
                            "timestamp {} is not after the current timestamp {}",
                            timestamp, state.timestamp
                        ),
                    };
                }
                state.breakpoint = Some(timestamp);
                Response::Ok
            }
            Request::ClearBreak => {
                state.breakpoint = None;
                Response::Ok
            }
            Request::Pins => {
                if state.run != RunState::Paused {
                    return Response::Error {
                        message: "pins are only available while paused".to_string(),
                    };
                }
                Response::Pins {
                    timestamp: state.timestamp,
                    pins: state.pins.clone(),
                }
            }
            Request::Events => Response::Events {
                events: state.recent.iter().cloned().collect(),
            },
        }
    }

    fn set_connected(&self, connected: bool) {
        let mut state = self.lock();
        state.connected = connected;
        if !connected {
            state.pause_requested = false;
            state.breakpoint = None;
            self.changed.notify_all();
        }
    }
}

/// Observer that serves the inspection protocol. Attach it to a harness
/// with `Harness::add_observer`.
#[derive(Debug)]
pub struct Inspector {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
}

impl Inspector {
    /// Starts listening on `addr` (e.g. `127.0.0.1:0`) and serves clients
    /// one at a time on a background thread.
    pub fn bind(addr: &str) -> InspectResult<Arc<Self>> {
        let server = Server::bind(addr).map_err(|e| match e {
            InspectError::Io(source) => InspectError::Bind {
                addr: addr.to_string(),
                source,
            },
            other => other,
        })?;
        let local_addr = server.local_addr()?;
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                run: RunState::Waiting,
                timestamp: 0,
                connected: false,
                pause_requested: false,
                breakpoint: None,
                pins: Vec::new(),
                recent: VecDeque::with_capacity(EVENT_HISTORY),
            }),
            changed: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("padring-inspect".to_string())
            .spawn(move || serve(server, worker))?;

        tracing::info!("Inspection endpoint listening on {}", local_addr);
        Ok(Arc::new(Self { shared, local_addr }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().run
    }
}

fn serve(server: Server, shared: Arc<Shared>) {
    loop {
        let (mut conn, peer) = match server.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Inspection endpoint stopped accepting: {}", e);
                return;
            }
        };
        tracing::info!("Inspection client connected from {}", peer);
        shared.set_connected(true);
        if let Err(e) = session(&mut conn, &shared) {
            tracing::warn!("Inspection client {} dropped: {}", peer, e);
        }
        shared.set_connected(false);
        tracing::info!("Inspection client {} disconnected", peer);
    }
}

fn session(conn: &mut Connection, shared: &Shared) -> InspectResult<()> {
    loop {
        let line: Option<serde_json::Value> = conn.read_message()?;
        let Some(value) = line else {
            return Ok(());
        };
        let response = match serde_json::from_value::<Request>(value) {
            Ok(request) => {
                tracing::debug!("Inspection request {:?}", request);
                shared.handle(request)
            }
            Err(e) => Response::Error {
                message: format!("unknown request: {}", e),
            },
        };
        conn.send_message(&response)?;
    }
}

impl HarnessObserver for Inspector {
    fn on_run_start(&self, _pins: &PinSpace) {
        let mut state = self.shared.lock();
        state.run = RunState::Running;
        state.timestamp = 0;
        state.recent.clear();
    }

    fn on_half_cycle(&self, timestamp: Timestamp, pins: &PinSpace) {
        let mut state = self.shared.lock();
        state.timestamp = timestamp;
        if state.breakpoint.is_some_and(|b| timestamp >= b) {
            state.breakpoint = None;
            state.pause_requested = true;
            tracing::info!("Breakpoint reached at timestamp {}", timestamp);
        }
        if !state.pause_requested {
            return;
        }
        if !state.connected {
            state.pause_requested = false;
            return;
        }

        state.pins = pins.iter().map(PinSnapshot::from).collect();
        state.run = RunState::Paused;
        tracing::info!("Run paused at timestamp {}", timestamp);
        while state.pause_requested && state.connected {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.run = RunState::Running;
        state.pins.clear();
        tracing::info!("Run resumed at timestamp {}", timestamp);
    }

    fn on_event(&self, event: &Event) {
        let mut state = self.shared.lock();
        if state.recent.len() == EVENT_HISTORY {
            state.recent.pop_front();
        }
        state.recent.push_back(event.clone());
    }

    fn on_run_end(&self, timestamp: Timestamp) {
        let mut state = self.shared.lock();
        state.run = RunState::Finished;
        state.timestamp = timestamp;
    }
}
