//! Session creation over the backend's REST API.
//!
//! One `POST` per session. A successful call yields the backend-assigned
//! kernel and session ids; the opener fills them into the channel URL
//! template and launches exactly one worker. Any failure launches nothing
//! and is never retried.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use kbench_core::{Endpoints, Session};
use kbench_protocol::{CreateSessionRequest, SessionModel};

use crate::config::{Credentials, XSRF_HEADER};
use crate::worker::WorkerPool;

/// Upper bound on one session-creation call. Kernel startup dominates it.
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors creating one session. Local to that session.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Session {index}: request failed: {source}")]
    Transport {
        index: usize,
        source: reqwest::Error,
    },

    #[error("Session {index}: expected 201 Created, got {status}")]
    UnexpectedStatus {
        index: usize,
        status: StatusCode,
        body: String,
    },

    #[error("Session {index}: failed to decode response: {source}")]
    Decode {
        index: usize,
        source: serde_json::Error,
    },
}

impl OpenError {
    /// HTTP status of the failed call, if the backend answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status(),
            Self::Client(_) | Self::Decode { .. } => None,
        }
    }
}

/// Creates sessions and hands them to the worker pool.
pub struct SessionOpener {
    client: Client,
    endpoints: Endpoints,
    credentials: Credentials,
}

impl SessionOpener {
    pub fn new(endpoints: Endpoints, credentials: Credentials) -> Result<Self, OpenError> {
        let client = Client::builder()
            .timeout(CREATE_TIMEOUT)
            .build()
            .map_err(OpenError::Client)?;

        Ok(Self {
            client,
            endpoints,
            credentials,
        })
    }

    /// Issues the creation call for ordinal `index`.
    pub async fn create(&self, index: usize) -> Result<Session, OpenError> {
        let body = CreateSessionRequest::for_index(index);
        debug!(index, url = %self.endpoints.sessions_url, name = %body.name, "Creating session");

        let response = self
            .client
            .post(&self.endpoints.sessions_url)
            .bearer_auth(&self.credentials.token)
            .header(XSRF_HEADER, &self.credentials.xsrf_token)
            .json(&body)
            .send()
            .await
            .map_err(|source| OpenError::Transport { index, source })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| OpenError::Transport { index, source })?;

        if status != StatusCode::CREATED {
            return Err(OpenError::UnexpectedStatus {
                index,
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let model: SessionModel =
            serde_json::from_slice(&bytes).map_err(|source| OpenError::Decode { index, source })?;

        Ok(model.into_session(index))
    }

    /// Creates session `index` and launches its worker.
    ///
    /// Returns the HTTP status on success. The worker dials in the
    /// background; this returns as soon as it is launched.
    pub async fn open(&self, index: usize, pool: &mut WorkerPool) -> Result<StatusCode, OpenError> {
        let session = self.create(index).await?;
        let url = self
            .endpoints
            .channels_template
            .fill(&session.kernel_id, &session.session_id);

        info!(
            index,
            session_id = %session.session_id,
            kernel_id = %session.kernel_id,
            "Session created"
        );

        pool.launch(session, url);
        Ok(StatusCode::CREATED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn refused_endpoints() -> Endpoints {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        Endpoints::from_base_url(&format!("http://127.0.0.1:{port}")).unwrap()
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let opener = SessionOpener::new(refused_endpoints(), Credentials::default()).unwrap();
        let err = opener.create(7).await.unwrap_err();

        assert!(matches!(err, OpenError::Transport { index: 7, .. }));
        assert_eq!(err.status(), None);
        assert!(err.to_string().starts_with("Session 7:"));
    }

    #[test]
    fn test_unexpected_status_reports_code() {
        let err = OpenError::UnexpectedStatus {
            index: 2,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            err.to_string(),
            "Session 2: expected 201 Created, got 500 Internal Server Error"
        );
    }
}
