//! Connection Handler
//!
//! Handles individual client connections. Each connection owns the cursors
//! its GET commands opened, addressed by token; they are dropped with it.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::cursor::MutableCursor;
use crate::engine::{Engine, GetOptions};
use crate::protocol::{
    encode_cursor, encode_entry, read_command, write_response, Command, ProtocolError,
    ProtocolResult, Response,
};
use crate::value::Value;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Reference to the storage engine
    engine: Arc<Engine>,

    /// Open cursors by token
    cursors: HashMap<u64, MutableCursor>,
    next_token: u64,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and configures timeouts
    pub fn new(stream: TcpStream, engine: Arc<Engine>) -> ProtocolResult<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            engine,
            cursors: HashMap::new(),
            next_token: 1,
            peer_addr,
        })
    }

    /// Configure connection timeouts; zero leaves a direction unbounded
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> ProtocolResult<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses.
    /// Returns when the client disconnects or an error occurs.
    pub fn handle(&mut self) -> ProtocolResult<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(ProtocolError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(ProtocolError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    // Send error response if possible
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);

            let response = self.execute_command(command);

            if let Err(e) = self.send_response(response) {
                if let ProtocolError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a command and return a response
    fn execute_command(&mut self, command: Command) -> Response {
        match self.dispatch(command) {
            Ok(response) => response,
            Err(e) => Response::error(&e.to_string()),
        }
    }

    fn dispatch(&mut self, command: Command) -> ProtocolResult<Response> {
        match command {
            Command::Get { keys } => {
                let cursor = self.engine.get_mutable(keys, GetOptions::default()).wait()?;
                let length = cursor.len() as u32;
                let token = self.next_token;
                self.next_token += 1;
                self.cursors.insert(token, cursor);
                Ok(Response::ok(Some(encode_cursor(token, length))))
            }
            Command::Put { keys, value } => {
                self.engine.put(keys, value).wait()?;
                Ok(Response::done())
            }
            Command::Del { keys } => {
                self.engine.del(keys).wait()?;
                Ok(Response::done())
            }
            Command::Next { token } => self.next_pair(token),
            Command::Length { token } => {
                let remaining = self.cursor(token)?.len() as u32;
                Ok(Response::length(remaining))
            }
            Command::ToArray { token } => {
                let cursor = self
                    .cursors
                    .remove(&token)
                    .ok_or_else(|| unknown_cursor(token))?;
                let pairs = cursor.to_array().wait()?;
                let array = Value::Array(
                    pairs
                        .into_iter()
                        .map(|(key, value)| Value::Array(vec![Value::String(key), value]))
                        .collect(),
                );
                let bytes = crate::value::encode(&array)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                Ok(Response::ok(Some(bytes)))
            }
            Command::Release { token } => {
                self.cursors.remove(&token);
                Ok(Response::done())
            }
            Command::Ping => Ok(Response::pong()),
        }
    }

    /// Yield the next live pair; an exhausted cursor is released
    fn next_pair(&mut self, token: u64) -> ProtocolResult<Response> {
        loop {
            let next = self.cursor(token)?.next();
            let pending = match next {
                Some(pending) => pending,
                None => {
                    self.cursors.remove(&token);
                    return Ok(Response::not_found());
                }
            };
            // A record deleted since the lookup is skipped
            if let (key, Some(value)) = pending.wait()? {
                return Ok(Response::ok(Some(encode_entry(&key, &value)?)));
            }
        }
    }

    fn cursor(&mut self, token: u64) -> ProtocolResult<&mut MutableCursor> {
        self.cursors
            .get_mut(&token)
            .ok_or_else(|| unknown_cursor(token))
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> ProtocolResult<()> {
        write_response(&mut self.writer, &response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Cursors currently open on this connection
    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }
}

fn unknown_cursor(token: u64) -> ProtocolError {
    ProtocolError::Malformed(format!("unknown cursor token {}", token))
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
