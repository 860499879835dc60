//! Wire protocol spoken between a terminal client and the terminal bridge.
//!
//! Every frame is a JSON object `{"type": ..., "data": ...}`:
//!
//! | type        | direction        | data                              |
//! |-------------|------------------|-----------------------------------|
//! | `data`      | server -> client | raw terminal output               |
//! | `input`     | client -> server | raw keystrokes                    |
//! | `resize`    | client -> server | JSON text `{"rows":N,"cols":N}`   |
//! | `connected` | server -> client | empty or a human readable note    |
//! | `error`     | server -> client | human readable message            |

pub mod codec;

pub use codec::{decode, decode_window_size, encode, CodecError};

use serde::{Deserialize, Deserializer, Serialize};

/// Terminal size used until the client sends its first `resize`.
pub const DEFAULT_COLS: u32 = 120;
pub const DEFAULT_ROWS: u32 = 30;

/// The `type` field of a terminal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum MessageKind {
    Data,
    Input,
    Resize,
    Connected,
    Error,
    /// Anything else a client sends. Ignored by the bridge.
    Unknown,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Input => "input",
            Self::Resize => "resize",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "data" => Self::Data,
            "input" => Self::Input,
            "resize" => Self::Resize,
            "connected" => Self::Connected,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl From<MessageKind> for &'static str {
    fn from(kind: MessageKind) -> Self {
        kind.as_str()
    }
}

/// One frame on the terminal message channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "string_or_json")]
    pub data: String,
}

impl TerminalMessage {
    pub fn new(kind: MessageKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn data(data: impl Into<String>) -> Self {
        Self::new(MessageKind::Data, data)
    }

    pub fn input(data: impl Into<String>) -> Self {
        Self::new(MessageKind::Input, data)
    }

    pub fn connected(note: impl Into<String>) -> Self {
        Self::new(MessageKind::Connected, note)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, message)
    }

    pub fn resize(size: WindowSize) -> Self {
        // Serializing two integers cannot fail.
        let data = serde_json::to_string(&size).unwrap_or_default();
        Self::new(MessageKind::Resize, data)
    }
}

/// Terminal dimensions carried by a `resize` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub rows: u32,
    pub cols: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

/// Accept `data` either as a string or as an inline JSON value.
///
/// Browsers send `resize` data as a stringified object; some clients send the
/// object itself. Both end up as the same JSON text.
fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
