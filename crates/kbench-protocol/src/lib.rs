//! kbench Protocol - Kernel session wire shapes
//!
//! This crate provides the request and response bodies exchanged with a
//! Jupyter-style kernel server: the REST session-creation call and the
//! JSON messages sent and received on a kernel's WebSocket channel.

pub mod inbound;
pub mod message;
pub mod session;
pub mod version;

pub use inbound::{FrameShape, InboundHeader, InboundMessage};
pub use message::{ExecuteContent, ExecuteRequest, DEFAULT_CODE};
pub use session::{CreateSessionRequest, KernelModel, SessionModel};
pub use version::MessagingVersion;
