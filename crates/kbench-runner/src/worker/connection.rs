//! One kernel channel and the two duties that drive it.
//!
//! A [`ConnectionWorker`] dials the channel, reports readiness, then runs a
//! receive duty and a send duty concurrently on the same task:
//!
//! - The receive duty counts every data frame, classifies it and logs it.
//!   A read failure ends the whole worker.
//! - The send duty waits for the start signal, then sends one execute
//!   request per tick until the run budget elapses or the run is cancelled.
//!   Cancellation is checked at tick boundaries, never mid-send.
//!
//! Once the send duty ends the worker sends a close frame and keeps the
//! receive duty running for a short grace period, so replies already in
//! flight are still counted.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Send failures are logged and the loop continues
//! - Channel closure (start signal, readiness) is handled gracefully

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{
    HeaderName, HeaderValue, InvalidHeaderValue, AUTHORIZATION,
};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use kbench_core::{Session, WorkerState};
use kbench_protocol::{ExecuteRequest, FrameShape};

use super::{ExitReason, Readiness, WorkerConfig, WorkerReport};
use crate::config::{Credentials, XSRF_HEADER};
use crate::metrics::MetricsHandle;

/// A dialed kernel channel.
pub type KernelChannel = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors establishing a kernel channel.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("Invalid channel URL {url}: {source}")]
    Request {
        url: String,
        source: tungstenite::Error,
    },

    #[error("Invalid credential header: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("Handshake with {url} failed: {source}")]
    Handshake {
        url: String,
        source: tungstenite::Error,
    },

    #[error("Handshake with {url} did not complete within {}ms", after.as_millis())]
    Timeout { url: String, after: Duration },

    #[error("Cancelled before the channel was established")]
    Cancelled,
}

/// Dials a kernel channel, giving up after `limit`.
///
/// A backend can accept the TCP connection and never answer the upgrade;
/// without the bound the worker would stay in `connecting` for good.
pub async fn dial_within(
    url: &str,
    credentials: &Credentials,
    limit: Duration,
) -> Result<KernelChannel, DialError> {
    timeout(limit, dial(url, credentials))
        .await
        .unwrap_or_else(|_| {
            Err(DialError::Timeout {
                url: url.to_string(),
                after: limit,
            })
        })
}

/// Dials a kernel channel with the bearer and XSRF headers.
pub async fn dial(url: &str, credentials: &Credentials) -> Result<KernelChannel, DialError> {
    let mut request = url
        .into_client_request()
        .map_err(|source| DialError::Request {
            url: url.to_string(),
            source,
        })?;

    let headers = request.headers_mut();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&credentials.authorization())?,
    );
    headers.insert(
        HeaderName::from_static(XSRF_HEADER),
        HeaderValue::from_str(&credentials.xsrf_token)?,
    );

    let (channel, _response) = connect_async(request)
        .await
        .map_err(|source| DialError::Handshake {
            url: url.to_string(),
            source,
        })?;

    Ok(channel)
}

// ============================================================================
// Worker
// ============================================================================

/// Owns one session's channel from dial to close.
pub struct ConnectionWorker {
    url: String,
    start: watch::Receiver<bool>,
    ready: oneshot::Sender<Readiness>,
    driver: ChannelDriver,
}

impl ConnectionWorker {
    pub fn new(
        session: Session,
        url: String,
        config: Arc<WorkerConfig>,
        metrics: MetricsHandle,
        start: watch::Receiver<bool>,
        ready: oneshot::Sender<Readiness>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            url,
            start,
            ready,
            driver: ChannelDriver {
                session,
                config,
                metrics,
                cancel,
            },
        }
    }

    /// Runs the worker to completion. Never fails; the outcome is in the
    /// returned report.
    pub async fn run(self) -> WorkerReport {
        let Self {
            url,
            start,
            ready,
            driver,
        } = self;
        let session = &driver.session;

        debug!(
            index = session.index,
            session_id = %session.session_id,
            kernel_id = %session.kernel_id,
            url = %url,
            "Dialing kernel channel"
        );

        let dialed = tokio::select! {
            biased;

            _ = driver.cancel.cancelled() => Err(DialError::Cancelled),

            result = dial_within(&url, &driver.config.credentials, driver.config.dial_timeout) => result,
        };

        let channel = match dialed {
            Ok(channel) => channel,
            Err(e) => {
                warn!(
                    index = session.index,
                    session_id = %session.session_id,
                    kernel_id = %session.kernel_id,
                    error = %e,
                    "Failed to connect kernel channel"
                );
                let _ = ready.send(Readiness::DialFailed);
                let exit = match e {
                    DialError::Cancelled => ExitReason::Cancelled,
                    other => ExitReason::DialFailed(other.to_string()),
                };
                return WorkerReport::dial_failed(driver.session, exit);
            }
        };

        info!(
            index = session.index,
            session_id = %session.session_id,
            kernel_id = %session.kernel_id,
            "Kernel channel connected"
        );

        // The pool may have stopped waiting; the worker still runs.
        let _ = ready.send(Readiness::Connected);

        let (sink, stream) = channel.split();
        driver.drive(sink, stream, start).await
    }
}

// ============================================================================
// Duties
// ============================================================================

/// How the receive duty ended.
#[derive(Debug)]
enum ReceiveEnd {
    Ended,
    Lost(String),
}

/// Runs the receive and send duties over an established channel.
///
/// Generic over the sink and stream so the duties can be driven without a
/// socket.
pub(crate) struct ChannelDriver {
    pub(crate) session: Session,
    pub(crate) config: Arc<WorkerConfig>,
    pub(crate) metrics: MetricsHandle,
    pub(crate) cancel: CancellationToken,
}

impl ChannelDriver {
    pub(crate) async fn drive<Si, St, E>(
        self,
        mut sink: Si,
        stream: St,
        mut start: watch::Receiver<bool>,
    ) -> WorkerReport
    where
        Si: Sink<Message> + Unpin,
        Si::Error: Display,
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        // The channel is up by the time the driver runs.
        let mut state = WorkerState::Connecting;
        self.transition(&mut state, WorkerState::Idle);
        let mut sent = 0u64;
        let mut received = 0u64;

        let exit = {
            let receive = self.receive(stream, &mut received);
            tokio::pin!(receive);

            let finished_sending = {
                let send = self.send(&mut sink, &mut start, &mut state, &mut sent);
                tokio::pin!(send);

                tokio::select! {
                    end = &mut receive => Err(end),
                    exit = &mut send => Ok(exit),
                }
            };

            match finished_sending {
                Ok(exit) => {
                    if let Err(e) = sink.close().await {
                        debug!(session_id = %self.session.session_id, error = %e, "Close frame not sent");
                    }
                    match timeout(self.config.close_grace, &mut receive).await {
                        Ok(_) => debug!(session_id = %self.session.session_id, "Close handshake complete"),
                        Err(_) => debug!(session_id = %self.session.session_id, "Close grace period expired"),
                    }
                    exit
                }
                Err(ReceiveEnd::Ended) => ExitReason::PeerClosed,
                Err(ReceiveEnd::Lost(e)) => ExitReason::ConnectionLost(e),
            }
        };

        let entered_sending = state == WorkerState::Sending;
        self.transition(&mut state, WorkerState::Closed);

        let report = WorkerReport {
            session: self.session,
            final_state: state,
            exit,
            entered_sending,
            sent,
            received,
        };

        if report.exit.is_failure() {
            warn!(
                index = report.session.index,
                session_id = %report.session.session_id,
                kernel_id = %report.session.kernel_id,
                exit = %report.exit,
                sent = report.sent,
                received = report.received,
                "Worker closed"
            );
        } else {
            info!(
                index = report.session.index,
                session_id = %report.session.session_id,
                exit = %report.exit,
                sent = report.sent,
                received = report.received,
                "Worker closed"
            );
        }

        report
    }

    async fn receive<St, E>(&self, mut stream: St, received: &mut u64) -> ReceiveEnd
    where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        while let Some(frame) = stream.next().await {
            let shape = match frame {
                Ok(Message::Text(text)) => FrameShape::classify_text(&text),
                Ok(Message::Binary(data)) => FrameShape::classify_binary(&data),
                Ok(Message::Close(frame)) => {
                    debug!(
                        session_id = %self.session.session_id,
                        reason = frame.as_ref().map(|f| f.reason.to_string()).unwrap_or_default(),
                        "Peer sent close frame"
                    );
                    continue;
                }
                // Control frames are answered by tungstenite and not counted.
                Ok(_) => continue,
                Err(e) => {
                    return ReceiveEnd::Lost(e.to_string());
                }
            };

            *received += 1;
            self.metrics.record_received();
            self.log_frame(&shape);
        }

        ReceiveEnd::Ended
    }

    fn log_frame(&self, shape: &FrameShape) {
        match shape {
            FrameShape::Json(msg) => trace!(
                session_id = %self.session.session_id,
                msg_type = msg.kind().unwrap_or("unknown"),
                parent_msg_id = msg.parent_msg_id().unwrap_or(""),
                "Received message"
            ),
            FrameShape::Text { len, error } => debug!(
                session_id = %self.session.session_id,
                len,
                error = %error,
                "Received undecodable text frame"
            ),
            FrameShape::Binary { len } => trace!(
                session_id = %self.session.session_id,
                len,
                "Received binary frame"
            ),
        }
    }

    async fn send<Si>(
        &self,
        sink: &mut Si,
        start: &mut watch::Receiver<bool>,
        state: &mut WorkerState,
        sent: &mut u64,
    ) -> ExitReason
    where
        Si: Sink<Message> + Unpin,
        Si::Error: Display,
    {
        let fired = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => return ExitReason::Cancelled,

            fired = wait_for_start(start) => fired,
        };
        if !fired {
            return ExitReason::NeverStarted;
        }

        self.transition(state, WorkerState::Sending);

        let started = Instant::now();
        let deadline = sleep_until(started + self.config.run_budget);
        tokio::pin!(deadline);

        let mut ticks = interval_at(started + self.config.tick, self.config.tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return ExitReason::Cancelled,

                _ = &mut deadline => return ExitReason::Deadline,

                _ = ticks.tick() => self.send_one(sink, sent).await,
            }
        }
    }

    async fn send_one<Si>(&self, sink: &mut Si, sent: &mut u64)
    where
        Si: Sink<Message> + Unpin,
        Si::Error: Display,
    {
        let request = ExecuteRequest::new(
            &self.session.session_id,
            &self.config.username,
            &self.config.code,
        );
        let text = match request.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %self.session.session_id, error = %e, "Failed to encode execute request");
                return;
            }
        };

        match sink.send(Message::Text(text)).await {
            Ok(()) => {
                *sent += 1;
                self.metrics.record_sent();
                trace!(
                    session_id = %self.session.session_id,
                    msg_id = request.msg_id(),
                    "Sent execute request"
                );
            }
            Err(e) => {
                warn!(
                    session_id = %self.session.session_id,
                    kernel_id = %self.session.kernel_id,
                    error = %e,
                    "Failed to send execute request"
                );
            }
        }
    }

    fn transition(&self, state: &mut WorkerState, next: WorkerState) {
        if state.can_transition_to(next) {
            debug!(
                session_id = %self.session.session_id,
                from = %state,
                to = %next,
                "Worker state changed"
            );
            *state = next;
        } else {
            warn!(
                session_id = %self.session.session_id,
                from = %state,
                to = %next,
                "Ignoring invalid worker state transition"
            );
        }
    }
}

/// Resolves once the start signal fires. False if the signal was withdrawn.
async fn wait_for_start(start: &mut watch::Receiver<bool>) -> bool {
    start.wait_for(|fired| *fired).await.is_ok()
}
