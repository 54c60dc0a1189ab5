//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Type (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: GET      - Payload: key list
//! - 0x02: PUT      - Payload: key list + encoded value
//! - 0x03: DEL      - Payload: key list
//! - 0x04: NEXT     - Payload: token (8)
//! - 0x05: LENGTH   - Payload: token (8)
//! - 0x06: TO_ARRAY - Payload: token (8)
//! - 0x07: RELEASE  - Payload: token (8)
//! - 0x08: PING     - Payload: empty
//!
//! A key list is `count (4)` followed by `len (4) + utf8` per key.
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND (NEXT on an exhausted cursor)
//! - 0x02: ERROR (payload is the error text)

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_cursor, decode_entry, decode_response, encode_command, encode_cursor,
    encode_entry, encode_response, read_command, read_response, write_command, write_response,
    ProtocolError, ProtocolResult, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
