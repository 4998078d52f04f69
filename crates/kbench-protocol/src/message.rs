//! Outbound `execute_request` messages.
//!
//! One message is built per tick and written to the kernel channel as a
//! JSON text frame. Nothing here is reused across ticks: every message gets
//! a fresh `msg_id` and `cell_id`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kbench_core::SessionId;

use crate::version::MessagingVersion;

/// Channel that carries execution requests.
pub const SHELL_CHANNEL: &str = "shell";

/// Message type of every outbound request.
pub const EXECUTE_REQUEST: &str = "execute_request";

/// Code executed when none is configured.
pub const DEFAULT_CODE: &str = "2+2";

/// Request body of an `execute_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteContent {
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: serde_json::Map<String, serde_json::Value>,
    pub allow_stdin: bool,
    pub stop_on_error: bool,
    pub code: String,
}

impl ExecuteContent {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            silent: false,
            store_history: true,
            user_expressions: serde_json::Map::new(),
            allow_stdin: true,
            stop_on_error: true,
            code: code.into(),
        }
    }
}

/// Message header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// RFC 3339 creation time
    pub date: String,
    pub msg_id: String,
    pub msg_type: String,
    pub session: SessionId,
    pub username: String,
    pub version: MessagingVersion,
}

/// Per-cell metadata attached to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMetadata {
    pub deleted_cells: Vec<serde_json::Value>,
    pub record_timing: bool,
    pub cell_id: String,
    pub trusted: bool,
}

/// Requests start a new exchange, so their parent header is always `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyParent {}

/// A complete `execute_request` as written to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub channel: String,
    pub content: ExecuteContent,
    pub header: Header,
    pub metadata: CellMetadata,
    pub parent_header: EmptyParent,
}

impl ExecuteRequest {
    /// Builds a request for `session` stamped with the current time and
    /// fresh unique ids.
    pub fn new(session: &SessionId, username: &str, code: &str) -> Self {
        Self {
            channel: SHELL_CHANNEL.to_string(),
            content: ExecuteContent::new(code),
            header: Header {
                date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                msg_id: Uuid::new_v4().to_string(),
                msg_type: EXECUTE_REQUEST.to_string(),
                session: session.clone(),
                username: username.to_string(),
                version: MessagingVersion::CURRENT,
            },
            metadata: CellMetadata {
                deleted_cells: Vec::new(),
                record_timing: false,
                cell_id: Uuid::new_v4().to_string(),
                trusted: true,
            },
            parent_header: EmptyParent {},
        }
    }

    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }

    /// Serializes to the JSON text written on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExecuteRequest {
        ExecuteRequest::new(&SessionId::new("session-1"), "tester", DEFAULT_CODE)
    }

    #[test]
    fn test_wire_shape() {
        let value: serde_json::Value = serde_json::from_str(&request().to_json().unwrap()).unwrap();

        assert_eq!(value["channel"], "shell");

        let content = &value["content"];
        assert_eq!(content["silent"], false);
        assert_eq!(content["store_history"], true);
        assert_eq!(content["user_expressions"], serde_json::json!({}));
        assert_eq!(content["allow_stdin"], true);
        assert_eq!(content["stop_on_error"], true);
        assert_eq!(content["code"], "2+2");

        let header = &value["header"];
        assert_eq!(header["msg_type"], "execute_request");
        assert_eq!(header["session"], "session-1");
        assert_eq!(header["username"], "tester");
        assert_eq!(header["version"], "5.2");

        let metadata = &value["metadata"];
        assert_eq!(metadata["deleted_cells"], serde_json::json!([]));
        assert_eq!(metadata["record_timing"], false);
        assert_eq!(metadata["trusted"], true);

        assert_eq!(value["parent_header"], serde_json::json!({}));
    }

    #[test]
    fn test_header_date_is_rfc3339() {
        let req = request();
        assert!(chrono::DateTime::parse_from_rfc3339(&req.header.date).is_ok());
        assert!(req.header.date.ends_with('Z'));
    }

    #[test]
    fn test_ids_are_unique_uuids() {
        let a = request();
        let b = request();

        assert_ne!(a.msg_id(), b.msg_id());
        assert_ne!(a.metadata.cell_id, b.metadata.cell_id);
        assert_ne!(a.msg_id(), a.metadata.cell_id);
        assert!(Uuid::parse_str(a.msg_id()).is_ok());
        assert!(Uuid::parse_str(&a.metadata.cell_id).is_ok());
    }

    #[test]
    fn test_custom_code() {
        let req = ExecuteRequest::new(&SessionId::new("s"), "u", "import time");
        assert_eq!(req.content.code, "import time");
    }
}
