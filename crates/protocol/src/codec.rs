use thiserror::Error;

use crate::{MessageKind, TerminalMessage, WindowSize};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed terminal message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected a resize message, got {0:?}")]
    NotResize(MessageKind),

    #[error("window size must be non-zero, got {rows}x{cols}")]
    EmptyWindow { rows: u32, cols: u32 },
}

/// Serialize a message into its JSON text frame.
pub fn encode(msg: &TerminalMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Parse a JSON text frame into a message.
pub fn decode(frame: &str) -> Result<TerminalMessage, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

/// Extract the `{rows, cols}` pair from a `resize` message.
///
/// Non-numeric or zero dimensions are rejected so the caller can drop the
/// message without touching the remote session.
pub fn decode_window_size(msg: &TerminalMessage) -> Result<WindowSize, CodecError> {
    if msg.kind != MessageKind::Resize {
        return Err(CodecError::NotResize(msg.kind));
    }
    let size: WindowSize = serde_json::from_str(&msg.data)?;
    if size.rows == 0 || size.cols == 0 {
        return Err(CodecError::EmptyWindow {
            rows: size.rows,
            cols: size.cols,
        });
    }
    Ok(size)
}
