//! Newline-delimited JSON framing.
//!
//! Each message occupies exactly one line. serde_json never emits raw
//! newlines inside a value, so a line boundary is always a message boundary.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Maximum accepted line length in bytes, newline excluded.
pub const MAX_LINE_SIZE: usize = 4 * 1024 * 1024;

/// Encodes a message as a single line, trailing newline included.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one line into a message.
///
/// Surrounding whitespace, including the line terminator, is ignored.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyLine);
    }
    if trimmed.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLarge {
            size: trimmed.len(),
            max: MAX_LINE_SIZE,
        });
    }
    Ok(serde_json::from_str(trimmed)?)
}
