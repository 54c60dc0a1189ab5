//! Blocking TCP client
//!
//! One request in flight at a time; cursors opened by [`Client::get`] live
//! on the server until drained or released.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::engine::Keys;
use crate::protocol::{
    decode_cursor, decode_entry, read_response, write_command, Command, ProtocolError,
    ProtocolResult, Response, Status,
};
use crate::value::{self, Value};

/// Server-side cursor opened by GET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteCursor {
    pub token: u64,
    pub length: u32,
}

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> ProtocolResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Bound how long a single response may take
    pub fn set_timeout(&self, timeout: Option<Duration>) -> ProtocolResult<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.writer.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    fn call(&mut self, command: &Command) -> ProtocolResult<Response> {
        write_command(&mut self.writer, command)?;
        let response = read_response(&mut self.reader)?;
        if let Some(message) = response.error_text() {
            return Err(ProtocolError::Remote(message));
        }
        Ok(response)
    }

    pub fn ping(&mut self) -> ProtocolResult<()> {
        self.call(&Command::Ping).map(|_| ())
    }

    pub fn put(&mut self, keys: impl Into<Keys>, value: impl Into<Value>) -> ProtocolResult<()> {
        let command = Command::Put {
            keys: keys.into().into_vec(),
            value: value.into(),
        };
        self.call(&command).map(|_| ())
    }

    pub fn del(&mut self, keys: impl Into<Keys>) -> ProtocolResult<()> {
        let command = Command::Del {
            keys: keys.into().into_vec(),
        };
        self.call(&command).map(|_| ())
    }

    /// Open a cursor over the keys' values
    pub fn get(&mut self, keys: impl Into<Keys>) -> ProtocolResult<RemoteCursor> {
        let command = Command::Get {
            keys: keys.into().into_vec(),
        };
        let response = self.call(&command)?;
        let (token, length) = decode_cursor(response.body())?;
        Ok(RemoteCursor { token, length })
    }

    /// Next pair, or `None` once the cursor is exhausted (and released)
    pub fn next(&mut self, cursor: RemoteCursor) -> ProtocolResult<Option<(String, Value)>> {
        let response = self.call(&Command::Next {
            token: cursor.token,
        })?;
        match response.status {
            Status::NotFound => Ok(None),
            _ => decode_entry(response.body()).map(Some),
        }
    }

    /// Pairs not yet consumed
    pub fn length(&mut self, cursor: RemoteCursor) -> ProtocolResult<u32> {
        let response = self.call(&Command::Length {
            token: cursor.token,
        })?;
        let body = response.body();
        if body.len() != 4 {
            return Err(ProtocolError::Malformed(format!(
                "LENGTH response: expected 4 bytes, got {}",
                body.len()
            )));
        }
        Ok(u32::from_be_bytes([body[0], body[1], body[2], body[3]]))
    }

    /// Drain the cursor in one round trip
    pub fn to_array(&mut self, cursor: RemoteCursor) -> ProtocolResult<Vec<(String, Value)>> {
        let response = self.call(&Command::ToArray {
            token: cursor.token,
        })?;
        let array = value::decode(response.body())
            .map_err(|e| ProtocolError::Malformed(format!("TO_ARRAY response: {}", e)))?;
        let items = match array {
            Value::Array(items) => items,
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "TO_ARRAY response: expected array, got {}",
                    other.kind()
                )))
            }
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Array(mut pair) if pair.len() == 2 => {
                    let value = pair.pop().unwrap_or(Value::Null);
                    match pair.pop() {
                        Some(Value::String(key)) => Ok((key, value)),
                        _ => Err(ProtocolError::Malformed(
                            "TO_ARRAY response: pair key is not a string".to_string(),
                        )),
                    }
                }
                other => Err(ProtocolError::Malformed(format!(
                    "TO_ARRAY response: expected [key, value], got {}",
                    other.kind()
                ))),
            })
            .collect()
    }

    pub fn release(&mut self, cursor: RemoteCursor) -> ProtocolResult<()> {
        self.call(&Command::Release {
            token: cursor.token,
        })
        .map(|_| ())
    }

    /// GET followed by TO_ARRAY
    pub fn fetch(&mut self, keys: impl Into<Keys>) -> ProtocolResult<Vec<(String, Value)>> {
        let cursor = self.get(keys)?;
        self.to_array(cursor)
    }
}
