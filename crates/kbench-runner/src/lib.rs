//! kbench Runner - Concurrent kernel session driver
//!
//! This crate provides the moving parts of a benchmark run:
//! - `opener` - session creation over the REST API
//! - `worker` - one task per kernel channel, paced sends under a deadline
//! - `metrics` - sent/received counters shared by every worker
//! - `sampler` - periodic CPU/memory/throughput samples of the backend
//! - `snapshot` - periodic persistence of the sample history
//! - `orchestrator` - sequencing of all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  SessionOpener ──(×N, spaced)──▶ WorkerPool                  │
//! │                                     │ start signal (watch)   │
//! │                                     ▼                        │
//! │                    ConnectionWorker ×N (send + receive)      │
//! │                                     │ record_sent/received   │
//! │                                     ▼                        │
//! │  ResourceSampler ◀── drain ── MetricsRegistry                │
//! │        │ push                                                │
//! │        ▼                                                     │
//! │  SampleHistory ── copy ──▶ SnapshotWriter ──▶ JSON file      │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod history;
pub mod inspector;
pub mod metrics;
pub mod opener;
pub mod orchestrator;
pub mod sampler;
pub mod snapshot;
pub mod summary;
pub mod worker;

pub use config::{BenchmarkConfig, BenchmarkSettings, ConfigError, Credentials, Timing};
pub use inspector::{ProcessInspector, SysinfoInspector};
pub use orchestrator::Orchestrator;
pub use summary::RunSummary;
