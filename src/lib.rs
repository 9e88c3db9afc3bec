//! Model-availability detection engine: probes upstream AI gateways across
//! a closed set of endpoint families, coordinates work across a worker
//! pool, and exposes progress and scheduling over HTTP (§1, §2).
//!
//! Exposed as a library so integration tests can drive C1-C9 directly
//! rather than only through the HTTP surface.

pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod gate;
pub mod http;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod recorder;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod sync;
pub mod telemetry;

pub use config::EngineConfig;
pub use error::{DetectError, Result};
