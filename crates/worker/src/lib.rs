//! simfarm worker library.
//!
//! A worker polls the dispatcher over RPC, runs each fetched job as an
//! external command in a scratch directory, and pushes the finished job
//! back. A side task reports liveness with periodic heartbeats.

pub mod client;
pub mod config;
pub mod runner;
pub mod worker;

pub use client::{ClientError, RpcClient};
pub use config::WorkerConfig;
pub use runner::{JobRunner, RunError};
pub use worker::Worker;
