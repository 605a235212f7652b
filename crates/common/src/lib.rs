//! AgentLoop common library
//!
//! This crate contains shared code used across AgentLoop components.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::AgentLoopConfig;
pub use error::{AgentLoopError, Result};
pub use metrics::{LatencyTimer, MetricsRegistry, METRICS};
