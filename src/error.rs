//! Error taxonomy for the pacing core
//!
//! None of these are fatal. Callers log them and keep serving the remaining
//! outputs; the worst visible effect is a delayed or dropped frame on the
//! affected output.

use std::time::Duration;
use thiserror::Error;

use crate::output::OutputId;
use crate::scene::{NodeId, VisibilityReason};

/// Errors reported by the scheduler, outputs and scene graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacingError {
    /// Invalid geometry, mode or refresh rate. The previous state is kept.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A vsync or completion timestamp that does not advance past the last
    /// presentation. The sample is ignored.
    #[error("timing anomaly on output {output}: timestamp {timestamp:?} does not advance past {last:?}")]
    TimingAnomaly {
        output: OutputId,
        timestamp: Duration,
        last: Duration,
    },

    /// A release without a matching acquire. Counters stay at zero.
    #[error("unbalanced release of {what}")]
    ResourceImbalance { what: Imbalance },

    /// The output has been disconnected; nothing is retried against it.
    #[error("output {0} has been disconnected")]
    BackendDisconnect(OutputId),

    #[error("unknown output {0}")]
    UnknownOutput(OutputId),

    #[error("unknown scene node {0}")]
    UnknownNode(NodeId),
}

/// What was released more often than it was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Imbalance {
    /// `unref_visible` without a matching `ref_visible`
    Visibility { node: NodeId, reason: VisibilityReason },
    /// `uninhibit` without a matching `inhibit`
    Inhibition { output: OutputId },
}

impl std::fmt::Display for Imbalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Imbalance::Visibility { node, reason } => {
                write!(f, "visibility reference {:?} on node {}", reason, node)
            }
            Imbalance::Inhibition { output } => write!(f, "inhibition on output {}", output),
        }
    }
}

/// Result alias used across the library
pub type Result<T, E = PacingError> = std::result::Result<T, E>;
