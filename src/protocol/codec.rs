//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Response Payloads
//! - GET:      token (8) + length (4)
//! - NEXT:     key_len (4) + key + encoded value
//! - LENGTH:   remaining (4)
//! - TO_ARRAY: encoded array of `[key, value]` pairs
//!
//! All integers are big-endian.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use super::{Command, CommandType, Response, Status};
use crate::error::BurrowError;
use crate::value::{self, Value};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("{0}")]
    Engine(#[from] BurrowError),

    /// ERROR response from the server
    #[error("Server error: {0}")]
    Remote(String),
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

fn malformed(message: impl Into<String>) -> ProtocolError {
    ProtocolError::Malformed(message.into())
}

// =============================================================================
// Frames
// =============================================================================

fn frame(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(kind);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);
    message.to_vec()
}

/// Split a complete frame into its type byte and payload
fn split_frame(bytes: &[u8]) -> ProtocolResult<(u8, &[u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(malformed(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let kind = header.get_u8();
    let payload_len = header.get_u32();
    check_payload_len(payload_len)?;

    let total_len = HEADER_SIZE + payload_len as usize;
    if bytes.len() < total_len {
        return Err(malformed(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }
    Ok((kind, &bytes[HEADER_SIZE..total_len]))
}

fn check_payload_len(len: u32) -> ProtocolResult<()> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(malformed(format!(
            "Payload too large: {} bytes (max {})",
            len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(())
}

/// Read one frame (header + payload) from a stream
fn read_frame<R: Read>(reader: &mut R) -> ProtocolResult<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    check_payload_len(payload_len)?;

    let mut message = vec![0u8; HEADER_SIZE + payload_len as usize];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }
    Ok(message)
}

// =============================================================================
// Payload Fields
// =============================================================================

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_keys(buf: &mut BytesMut, keys: &[String]) {
    buf.put_u32(keys.len() as u32);
    for key in keys {
        put_str(buf, key);
    }
}

fn take_u32(payload: &mut &[u8], what: &str) -> ProtocolResult<u32> {
    if payload.remaining() < 4 {
        return Err(malformed(format!("{}: truncated length", what)));
    }
    Ok(payload.get_u32())
}

fn take_token(payload: &mut &[u8], what: &str) -> ProtocolResult<u64> {
    if payload.remaining() < 8 {
        return Err(malformed(format!("{}: missing cursor token", what)));
    }
    Ok(payload.get_u64())
}

fn take_str(payload: &mut &[u8], what: &str) -> ProtocolResult<String> {
    let len = take_u32(payload, what)? as usize;
    if payload.remaining() < len {
        return Err(malformed(format!(
            "{}: incomplete key (expected {}, got {})",
            what,
            len,
            payload.remaining()
        )));
    }
    let key = std::str::from_utf8(&payload[..len])
        .map_err(|e| malformed(format!("{}: key is not UTF-8: {}", what, e)))?
        .to_string();
    payload.advance(len);
    Ok(key)
}

fn take_keys(payload: &mut &[u8], what: &str) -> ProtocolResult<Vec<String>> {
    let count = take_u32(payload, what)? as usize;
    // Every key costs at least its length prefix
    if count > payload.remaining() / 4 {
        return Err(malformed(format!("{}: key count {} exceeds payload", what, count)));
    }
    (0..count).map(|_| take_str(payload, what)).collect()
}

fn expect_empty(payload: &[u8], what: &str) -> ProtocolResult<()> {
    if !payload.is_empty() {
        return Err(malformed(format!(
            "{}: unexpected {} trailing bytes",
            what,
            payload.len()
        )));
    }
    Ok(())
}

fn encode_value(value: &Value) -> ProtocolResult<Vec<u8>> {
    value::encode(value).map_err(|e| malformed(format!("Value encoding failed: {}", e)))
}

fn decode_value(bytes: &[u8], what: &str) -> ProtocolResult<Value> {
    value::decode(bytes).map_err(|e| malformed(format!("{}: undecodable value: {}", what, e)))
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> ProtocolResult<Vec<u8>> {
    let mut payload = BytesMut::new();
    match command {
        Command::Get { keys } | Command::Del { keys } => put_keys(&mut payload, keys),
        Command::Put { keys, value } => {
            put_keys(&mut payload, keys);
            payload.put_slice(&encode_value(value)?);
        }
        Command::Next { token }
        | Command::Length { token }
        | Command::ToArray { token }
        | Command::Release { token } => payload.put_u64(*token),
        Command::Ping => {}
    }
    Ok(frame(command.command_type() as u8, &payload))
}

/// Decode a command from a complete frame
pub fn decode_command(bytes: &[u8]) -> ProtocolResult<Command> {
    let (kind, mut payload) = split_frame(bytes)?;
    let command_type = CommandType::from_byte(kind)
        .ok_or_else(|| malformed(format!("Unknown command type: 0x{:02x}", kind)))?;
    let payload = &mut payload;

    let command = match command_type {
        CommandType::Get => Command::Get {
            keys: take_keys(payload, "GET")?,
        },
        CommandType::Put => {
            let keys = take_keys(payload, "PUT")?;
            let value = decode_value(payload, "PUT")?;
            *payload = &[];
            Command::Put { keys, value }
        }
        CommandType::Del => Command::Del {
            keys: take_keys(payload, "DEL")?,
        },
        CommandType::Next => Command::Next {
            token: take_token(payload, "NEXT")?,
        },
        CommandType::Length => Command::Length {
            token: take_token(payload, "LENGTH")?,
        },
        CommandType::ToArray => Command::ToArray {
            token: take_token(payload, "TO_ARRAY")?,
        },
        CommandType::Release => Command::Release {
            token: take_token(payload, "RELEASE")?,
        },
        CommandType::Ping => Command::Ping,
    };
    expect_empty(payload, &format!("{:?}", command_type))?;
    Ok(command)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    frame(response.status as u8, response.body())
}

/// Decode a response from a complete frame
pub fn decode_response(bytes: &[u8]) -> ProtocolResult<Response> {
    let (status_byte, payload) = split_frame(bytes)?;

    let status = Status::from_byte(status_byte).ok_or_else(|| {
        malformed(format!("Unknown response status: 0x{:02x}", status_byte))
    })?;

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };
    Ok(Response { status, payload })
}

/// GET answer: cursor token and its length
pub fn encode_cursor(token: u64, length: u32) -> Vec<u8> {
    let mut payload = BytesMut::with_capacity(12);
    payload.put_u64(token);
    payload.put_u32(length);
    payload.to_vec()
}

pub fn decode_cursor(payload: &[u8]) -> ProtocolResult<(u64, u32)> {
    let mut payload = payload;
    let token = take_token(&mut payload, "GET response")?;
    let length = take_u32(&mut payload, "GET response")?;
    expect_empty(payload, "GET response")?;
    Ok((token, length))
}

/// NEXT answer: one key with its value
pub fn encode_entry(key: &str, value: &Value) -> ProtocolResult<Vec<u8>> {
    let mut payload = BytesMut::new();
    put_str(&mut payload, key);
    payload.put_slice(&encode_value(value)?);
    Ok(payload.to_vec())
}

pub fn decode_entry(payload: &[u8]) -> ProtocolResult<(String, Value)> {
    let mut payload = payload;
    let key = take_str(&mut payload, "NEXT response")?;
    let value = decode_value(payload, "NEXT response")?;
    Ok((key, value))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> ProtocolResult<Command> {
    decode_command(&read_frame(reader)?)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> ProtocolResult<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> ProtocolResult<Response> {
    decode_response(&read_frame(reader)?)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> ProtocolResult<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
