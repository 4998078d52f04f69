//! kbench Core - Shared types for kernel session benchmarking
//!
//! This crate provides the domain types shared between the wire
//! protocol (`kbench-protocol`) and the session driver (`kbench-runner`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod sample;
pub mod session;
pub mod target;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use sample::{ResourceSummary, Sample};
pub use session::{KernelId, Session, SessionId, WorkerState};
pub use target::{Endpoints, Target, UrlTemplate};
