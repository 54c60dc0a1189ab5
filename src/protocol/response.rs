//! Response definitions
//!
//! Every command is answered by exactly one response frame. What the payload
//! carries depends on the command:
//!
//! | Command      | Status    | Payload                                   |
//! |--------------|-----------|-------------------------------------------|
//! | GET          | OK        | cursor handle: token u64 + length u32     |
//! | NEXT         | OK        | entry: key (u32 len + utf8) + value       |
//! | NEXT         | NOT_FOUND | none; the cursor is exhausted and dropped |
//! | LENGTH       | OK        | pairs left, u32                           |
//! | TO_ARRAY     | OK        | value: array of `[key, value]` pairs      |
//! | PUT/DEL/RELEASE | OK     | none                                      |
//! | PING         | OK        | `PONG`                                    |
//! | any          | ERROR     | utf8 error text                           |
//!
//! Integers are big-endian; values use the value codec.

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::NotFound),
            0x02 => Some(Status::Error),
            _ => None,
        }
    }
}

/// One response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,

    /// Command-specific payload, `None` when the frame carries no body
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// OK with an optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// OK without a body (PUT, DEL, RELEASE)
    pub fn done() -> Self {
        Self::ok(None)
    }

    /// Pairs left on a cursor (LENGTH)
    pub fn length(remaining: u32) -> Self {
        Self::ok(Some(remaining.to_be_bytes().to_vec()))
    }

    pub fn pong() -> Self {
        Self::ok(Some(b"PONG".to_vec()))
    }

    /// Cursor exhausted (NEXT)
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Payload bytes, empty when absent
    pub fn body(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }

    /// Error text of an ERROR response
    pub fn error_text(&self) -> Option<String> {
        match self.status {
            Status::Error => Some(String::from_utf8_lossy(self.body()).into_owned()),
            _ => None,
        }
    }
}
