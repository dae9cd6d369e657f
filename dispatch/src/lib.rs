#![forbid(unsafe_code)]
//! Off-thread parse dispatch for simkernel.
//!
//! [`DispatchClient`] posts JSON and vector payload parsing to a background
//! [`ParseWorker`] over correlated request/response messages and falls back to
//! parsing on the calling thread whenever the worker path fails.

pub mod client;
pub mod config;
mod env_utils;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod worker;

pub use client::{ClientOptions, DispatchClient, DispatchStats, RequestOptions};
pub use config::DispatchConfig;
pub use error::{DispatchError, Result};
pub use parse::ParseFailure;
pub use protocol::{
    BatchRequest, BenchmarkRequest, BenchmarkResult, InboundKind, InboundMessage, OutboundKind,
    OutboundMessage, ParseRequest, VectorData, WorkerStats,
};
pub use worker::{ParseWorker, WorkerEndpoint, WorkerEvent, WorkerHandle};
