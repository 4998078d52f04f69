//! Session-creation request and response bodies.
//!
//! `POST <base>/api/sessions` with a [`CreateSessionRequest`] answers
//! `201 Created` with a [`SessionModel`]. Only `id` and `kernel.id` are
//! needed; every other field is optional so that both Jupyter and Zasper
//! responses decode.

use kbench_core::{KernelId, Session, SessionId};
use serde::{Deserialize, Serialize};

/// Session type requested for every benchmark session.
pub const NOTEBOOK_TYPE: &str = "notebook";

/// Kernel spec started for every benchmark session.
pub const DEFAULT_KERNEL_NAME: &str = "python3";

/// Kernel selection inside a creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub name: String,
}

/// Body of the session-creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub kernel: KernelSpec,
}

impl CreateSessionRequest {
    /// Builds the request for the session with ordinal `index`.
    ///
    /// Path and name are both the derived notebook name.
    pub fn for_index(index: usize) -> Self {
        let name = Session::display_name(index);
        Self {
            path: name.clone(),
            name,
            kind: NOTEBOOK_TYPE.to_string(),
            kernel: KernelSpec {
                name: DEFAULT_KERNEL_NAME.to_string(),
            },
        }
    }
}

/// Kernel as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KernelModel {
    pub id: KernelId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub execution_state: Option<String>,
    #[serde(default)]
    pub connections: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotebookModel {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Session as reported by the backend after creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionModel {
    pub id: SessionId,
    pub kernel: KernelModel,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub notebook: Option<NotebookModel>,
}

impl SessionModel {
    /// Converts the backend's answer into a [`Session`] for ordinal `index`.
    pub fn into_session(self, index: usize) -> Session {
        Session::new(index, self.kernel.id, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_shape() {
        let value = serde_json::to_value(CreateSessionRequest::for_index(4)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "path": "Untitled-4.ipynb",
                "name": "Untitled-4.ipynb",
                "type": "notebook",
                "kernel": { "name": "python3" }
            })
        );
    }

    #[test]
    fn test_decode_jupyter_response() {
        let body = r#"{
            "id": "e1f3c1b2-0000-4000-8000-000000000001",
            "path": "Untitled-0.ipynb",
            "name": "Untitled-0.ipynb",
            "type": "notebook",
            "kernel": {
                "id": "7a9c0d8e-0000-4000-8000-000000000002",
                "name": "python3",
                "last_activity": "2024-01-01T00:00:00.000000Z",
                "execution_state": "starting",
                "connections": 0
            },
            "notebook": { "path": "Untitled-0.ipynb", "name": "Untitled-0.ipynb" }
        }"#;

        let model: SessionModel = serde_json::from_str(body).unwrap();
        assert_eq!(model.id.as_str(), "e1f3c1b2-0000-4000-8000-000000000001");
        assert_eq!(model.kernel.id.as_str(), "7a9c0d8e-0000-4000-8000-000000000002");
        assert_eq!(model.kernel.connections, Some(0));

        let session = model.into_session(0);
        assert_eq!(session.name, "Untitled-0.ipynb");
        assert_eq!(session.session_id.as_str(), "e1f3c1b2-0000-4000-8000-000000000001");
    }

    #[test]
    fn test_decode_minimal_response() {
        let model: SessionModel =
            serde_json::from_str(r#"{"id":"s","kernel":{"id":"k"}}"#).unwrap();
        assert_eq!(model.kernel.id.as_str(), "k");
        assert!(model.notebook.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_kernel() {
        let result: Result<SessionModel, _> = serde_json::from_str(r#"{"id":"s"}"#);
        assert!(result.is_err());
    }
}
