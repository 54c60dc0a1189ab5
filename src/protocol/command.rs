//! Command definitions
//!
//! Represents requests from clients.

use crate::value::Value;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Put = 0x02,
    Del = 0x03,
    Next = 0x04,
    Length = 0x05,
    ToArray = 0x06,
    Release = 0x07,
    Ping = 0x08,
}

impl CommandType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandType::Get),
            0x02 => Some(CommandType::Put),
            0x03 => Some(CommandType::Del),
            0x04 => Some(CommandType::Next),
            0x05 => Some(CommandType::Length),
            0x06 => Some(CommandType::ToArray),
            0x07 => Some(CommandType::Release),
            0x08 => Some(CommandType::Ping),
            _ => None,
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Look up keys; answers with a cursor token
    Get { keys: Vec<String> },

    /// Store one value under every key
    Put { keys: Vec<String>, value: Value },

    /// Remove keys
    Del { keys: Vec<String> },

    /// Advance a cursor by one pair
    Next { token: u64 },

    /// Pairs left in a cursor
    Length { token: u64 },

    /// Drain a cursor into one array
    ToArray { token: u64 },

    /// Drop a cursor without draining it
    Release { token: u64 },

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Put { .. } => CommandType::Put,
            Command::Del { .. } => CommandType::Del,
            Command::Next { .. } => CommandType::Next,
            Command::Length { .. } => CommandType::Length,
            Command::ToArray { .. } => CommandType::ToArray,
            Command::Release { .. } => CommandType::Release,
            Command::Ping => CommandType::Ping,
        }
    }
}
