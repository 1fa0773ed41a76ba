//! Duet wire protocol.
//!
//! Two kinds of message travel over the channel:
//!
//! - **Control messages** are JSON text messages tagged by `"event"`:
//!
//! ```text
//! {"event":"info","fileinfo":{"name":"a.txt","size":5,"type":"text/plain"}}
//! {"event":"ready"}
//! {"event":"cancel","direction":"down"}
//! {"event":"end"}
//! {"event":"text","body":"hello"}
//! ```
//!
//! - **Chunk frames** are binary messages, see [`frame`].
//!
//! The receiver tells the two apart by the channel message kind, never by
//! sniffing content.

pub mod frame;

pub use frame::{pack, unpack, ChunkFrame, INDEX_SIZE};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::file::FileDescriptor;

/// A message as carried by the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Textual message (control)
    Text(String),
    /// Binary message (chunk frame)
    Binary(Bytes),
}

impl Message {
    /// Size of the message body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transfer direction, relative to the peer that names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sending a file
    Up,
    /// Receiving a file
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => f.write_str("upload"),
            Self::Down => f.write_str("download"),
        }
    }
}

/// Control events exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Sender proposes a transfer
    #[serde(rename = "info")]
    Offer {
        /// File being offered
        #[serde(rename = "fileinfo")]
        file: FileDescriptor,
    },
    /// Receiver accepts the offer
    Ready,
    /// Either peer aborts one direction, named from its own point of view
    Cancel {
        /// Direction being aborted by the sender of this message
        direction: Direction,
    },
    /// Receiver assembled the complete file
    End,
    /// Short chat message, independent of transfers
    Text {
        /// Message body
        body: String,
    },
}

impl ControlMessage {
    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Ready => "ready",
            Self::Cancel { .. } => "cancel",
            Self::End => "end",
            Self::Text { .. } => "text",
        }
    }
}

/// Encode a control message as a text channel message.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(message: &ControlMessage) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(message)?))
}

/// Decode a control message from the body of a text channel message.
///
/// # Errors
///
/// Returns `Error::Serialization` if the text is not a known control message.
pub fn decode(text: &str) -> Result<ControlMessage> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn text_of(message: &ControlMessage) -> String {
        match encode(message).expect("encode") {
            Message::Text(text) => text,
            Message::Binary(_) => panic!("control messages must encode as text"),
        }
    }

    #[test]
    fn test_offer_wire_format() {
        let offer = ControlMessage::Offer {
            file: FileDescriptor::new("a.txt", 5, "text/plain"),
        };

        assert_eq!(
            text_of(&offer),
            r#"{"event":"info","fileinfo":{"name":"a.txt","size":5,"type":"text/plain"}}"#
        );
    }

    #[test]
    fn test_unit_variants_wire_format() {
        assert_eq!(text_of(&ControlMessage::Ready), r#"{"event":"ready"}"#);
        assert_eq!(text_of(&ControlMessage::End), r#"{"event":"end"}"#);
    }

    #[test]
    fn test_cancel_wire_format() {
        let cancel = ControlMessage::Cancel {
            direction: Direction::Down,
        };
        assert_eq!(text_of(&cancel), r#"{"event":"cancel","direction":"down"}"#);
    }

    #[test]
    fn test_decode_all_variants() {
        let messages = [
            ControlMessage::Offer {
                file: FileDescriptor::new("b.bin", 0, "application/octet-stream"),
            },
            ControlMessage::Ready,
            ControlMessage::Cancel {
                direction: Direction::Up,
            },
            ControlMessage::End,
            ControlMessage::Text {
                body: "hi there".to_string(),
            },
        ];

        for message in messages {
            let decoded = decode(&text_of(&message)).expect("decode");
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_decode_browser_offer() {
        let text = r#"{"event":"info","fileinfo":{"name":"clip.mp4","size":1048576,"type":"video/mp4"}}"#;

        match decode(text).expect("decode") {
            ControlMessage::Offer { file } => {
                assert_eq!(file.name, "clip.mp4");
                assert_eq!(file.size, 1_048_576);
                assert_eq!(file.mime_type, "video/mp4");
            }
            other => panic!("Expected Offer, got: {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_is_serialization_error() {
        for text in ["", "not json", r#"{"event":"launch"}"#, r#"{"event":"cancel"}"#] {
            let err = decode(text).unwrap_err();
            assert!(matches!(err, Error::Serialization(_)), "{text:?} gave {err:?}");
        }
    }

    #[test]
    fn test_message_len() {
        assert_eq!(Message::Text("abc".to_string()).len(), 3);
        assert!(Message::Binary(Bytes::new()).is_empty());
    }
}
