//! Failure isolation, timeout enforcement, and rolling statistics for
//! fallible, latency-bounded operations.
//!
//! A [`breaker::Breaker`] wraps a single operation with a deadline, a
//! rolling window of outcome statistics, and a closed/open/healing state
//! machine (`circuit::Circuit` and `breaker::Breaker` do the actual work;
//! `stats::Stats` and `bucket::Bucket` hold the rolling window). Breakers
//! constructed with `register_global: true` show up in the process-wide
//! [`registry::GlobalRegistry`].

#![forbid(unsafe_code)]

pub mod adapters;
pub mod breaker;
pub mod bucket;
pub mod circuit;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod stats;
pub mod timer;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use breaker::{Breaker, BreakerBuilder, HealthCheck};
pub use circuit::{BoxFuture, Circuit, ExecOutcome, IsFailure, Operation};
pub use config::BreakerConfig;
pub use error::{BreakerError, CircuitOpenError, ExecError, Result, TimeoutError};
pub use events::{BreakerEvent, StatsEvent};
pub use registry::GlobalRegistry;
pub use stats::{Stats, TotalStats};
