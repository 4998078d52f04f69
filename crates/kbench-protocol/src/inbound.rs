//! Inbound kernel channel frames.
//!
//! The driver never acts on what the kernel sends back; frames are counted,
//! classified by shape and logged. Decoding is best-effort.

use serde::Deserialize;

/// Header of an inbound message. All fields are optional because replies
/// on some channels carry partial or empty headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InboundHeader {
    #[serde(default)]
    pub msg_id: Option<String>,
    #[serde(default)]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// JSON message received on a kernel channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub header: InboundHeader,
    #[serde(default)]
    pub parent_header: InboundHeader,
    #[serde(default)]
    pub msg_id: Option<String>,
    #[serde(default)]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub buffers: Vec<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub channel: Option<String>,
}

impl InboundMessage {
    /// Message type from the top level, falling back to the header.
    pub fn kind(&self) -> Option<&str> {
        self.msg_type
            .as_deref()
            .or(self.header.msg_type.as_deref())
    }

    /// `msg_id` of the request this message answers, if any.
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.msg_id.as_deref()
    }
}

/// Lightweight shape of a data frame.
#[derive(Debug, Clone)]
pub enum FrameShape {
    /// Text frame that decoded as a kernel message
    Json(Box<InboundMessage>),
    /// Text frame that did not decode; carries the decode error
    Text { len: usize, error: String },
    /// Binary frame (buffers protocol); only the length is kept
    Binary { len: usize },
}

impl FrameShape {
    /// Classifies a text frame, attempting a structured decode.
    pub fn classify_text(text: &str) -> Self {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(msg) => Self::Json(Box::new(msg)),
            Err(e) => Self::Text {
                len: text.len(),
                error: e.to_string(),
            },
        }
    }

    pub fn classify_binary(data: &[u8]) -> Self {
        Self::Binary { len: data.len() }
    }}
