//! Inbound frame handling for the CogServer JSON shell.
//!
//! The shell appends its prompt to every reply, so the last six characters of
//! a text frame are dropped when they contain `json`. Whatever remains is the
//! JSON payload.

use serde_json::Value;

/// Width of the trailing prompt marker.
pub const MARKER_LEN: usize = 6;

/// A decoded inbound frame, queued for whichever command is waiting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    Reply(Value),
    Malformed(String),
}

/// Strip the trailing prompt marker if the last [`MARKER_LEN`] characters
/// contain `"json"`. A frame shorter than the marker is all suffix.
pub fn trim_trailing_marker(frame: &str) -> &str {
    let start = frame
        .char_indices()
        .rev()
        .nth(MARKER_LEN - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    if frame[start..].contains("json") {
        &frame[..start]
    } else {
        frame
    }
}

pub(crate) fn decode_frame(text: &str) -> Inbound {
    let trimmed = trim_trailing_marker(text);
    if trimmed.len() != text.len() {
        tracing::trace!(marker = &text[trimmed.len()..], "trimmed trailing marker");
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Inbound::Reply(value),
        Err(e) => Inbound::Malformed(format!("{e}: {}", preview(trimmed))),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
