// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Newline-delimited JSON over a TCP stream. One client at a time.

use crate::InspectResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> InspectResult<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self { reader, writer })
    }

    pub fn connect(addr: SocketAddr) -> InspectResult<Self> {
        Self::new(TcpStream::connect(addr)?)
    }

    /// Next message, or `None` once the peer has closed the stream.
    /// Blank lines are skipped.
    pub fn read_message<T: DeserializeOwned>(&mut self) -> InspectResult<Option<T>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                return Ok(Some(serde_json::from_str(line.trim())?));
            }
        }
    }

    pub fn send_message<T: Serialize>(&mut self, message: &T) -> InspectResult<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub fn bind(addr: &str) -> InspectResult<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener })
    }

    /// Blocks until a client connects.
    pub fn accept(&self) -> InspectResult<(Connection, SocketAddr)> {
        let (stream, peer) = self.listener.accept()?;
        Ok((Connection::new(stream)?, peer))
    }

    pub fn local_addr(&self) -> InspectResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::io::Write as _;
    use std::thread;

    #[test]
    fn test_roundtrip_message() {
        let server = Server::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut conn = Connection::connect(addr).unwrap();
            conn.send_message(&json!({"command": "status"})).unwrap();
            let reply: Value = conn.read_message().unwrap().unwrap();
            assert_eq!(reply["timestamp"], 12);
        });

        let (mut conn, _) = server.accept().unwrap();
        let msg: Value = conn.read_message().unwrap().unwrap();
        assert_eq!(msg["command"], "status");
        conn.send_message(&json!({"timestamp": 12})).unwrap();
        client.join().unwrap();
    }

    #[test]
    fn test_blank_lines_skipped_and_eof_is_none() {
        let server = Server::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"\n  \n{\"command\":\"pins\"}\n").unwrap();
        });

        let (mut conn, _) = server.accept().unwrap();
        let msg: Value = conn.read_message().unwrap().unwrap();
        assert_eq!(msg["command"], "pins");
        client.join().unwrap();
        assert!(conn.read_message::<Value>().unwrap().is_none());
    }
}
