//! Reply interpretation.

use serde_json::Value;

use crate::wire::{WireError, ERROR_MARKER};

/// Interpret raw reply lines as success output or a remote error.
///
/// A reply whose first line equals the error marker is a companion-side
/// failure; the remaining lines are the error detail.
///
/// # Errors
///
/// Returns [`WireError::Remote`] carrying the detail lines joined by
/// newline.
pub fn parse_reply(lines: Vec<String>) -> Result<Vec<String>, WireError> {
    match lines.first() {
        Some(first) if first == ERROR_MARKER => Err(WireError::Remote(lines[1..].join("\n"))),
        _ => Ok(lines),
    }
}

/// Decode a reply that must carry exactly one JSON value.
///
/// # Errors
///
/// Returns [`WireError::Remote`] if the reply is an error reply,
/// [`WireError::EmptyReply`] if no output arrived, or [`WireError::Decode`]
/// if the output is not valid JSON.
pub fn decode_value(lines: Vec<String>) -> Result<Value, WireError> {
    let lines = parse_reply(lines)?;
    let text = lines.first().ok_or(WireError::EmptyReply)?;
    Ok(serde_json::from_str(text)?)
}
