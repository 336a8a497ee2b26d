//! Vertical blank sources
//!
//! A [`VsyncSource`] produces one [`VsyncEvent`] per arm cycle. Two flavours
//! exist and are picked when the output is created:
//!
//! - **Hardware**: the backend forwards real vblank / page-flip events through
//!   [`VsyncSource::deliver`]. Arming subscribes to the next one.
//! - **Software**: no backend vblank exists, so the source synthesizes ticks
//!   from the monotonic clock at the configured refresh interval. The event
//!   loop waits for [`VsyncSource::deadline`] and then calls
//!   [`VsyncSource::poll`].
//!
//! Cancellation is synchronous: once [`VsyncSource::cancel`] returns, neither
//! a late hardware event nor a timer wake-up for that cycle produces an event.

mod hardware;
mod software;

pub use hardware::HardwareVsync;
pub use software::SoftwareVsync;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PacingError, Result};

/// Refresh rate used when neither the backend nor the config provides one
pub const DEFAULT_REFRESH_RATE: u32 = 60_000;

/// Converts a refresh rate in milli-hertz into a refresh interval
///
/// ```
/// use framepace::vsync::refresh_interval;
/// use std::time::Duration;
///
/// assert_eq!(refresh_interval(60_000), Duration::from_nanos(16_666_666));
/// ```
pub fn refresh_interval(refresh_rate: u32) -> Duration {
    debug_assert!(refresh_rate > 0);
    Duration::from_nanos(1_000_000_000_000 / u64::from(refresh_rate.max(1)))
}

pub(crate) fn validate_refresh_rate(refresh_rate: u32) -> Result<()> {
    if refresh_rate == 0 {
        return Err(PacingError::Configuration(
            "refresh rate must be greater than 0 mHz".to_string(),
        ));
    }
    Ok(())
}

/// Which flavour of vsync source an output uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum VsyncKind {
    Hardware,
    #[default]
    Software,
}

/// A single vblank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsyncEvent {
    /// Monotonic time of the refresh boundary
    pub timestamp: Duration,
}

/// Hardware or software vblank producer owned by one output
#[derive(Debug)]
pub enum VsyncSource {
    Hardware(HardwareVsync),
    Software(SoftwareVsync),
}

impl VsyncSource {
    pub fn new(kind: VsyncKind, refresh_rate: u32) -> Result<Self> {
        validate_refresh_rate(refresh_rate)?;
        Ok(match kind {
            VsyncKind::Hardware => VsyncSource::Hardware(HardwareVsync::new(refresh_rate)),
            VsyncKind::Software => VsyncSource::Software(SoftwareVsync::new(refresh_rate)),
        })
    }

    pub fn kind(&self) -> VsyncKind {
        match self {
            VsyncSource::Hardware(_) => VsyncKind::Hardware,
            VsyncSource::Software(_) => VsyncKind::Software,
        }
    }

    /// Schedules exactly one future tick. Arming an armed source keeps the
    /// existing deadline.
    pub fn arm(&mut self, deadline: Duration) {
        match self {
            VsyncSource::Hardware(source) => source.arm(),
            VsyncSource::Software(source) => source.arm(deadline),
        }
    }

    /// Drops the current arm cycle
    pub fn cancel(&mut self) {
        match self {
            VsyncSource::Hardware(source) => source.cancel(),
            VsyncSource::Software(source) => source.cancel(),
        }
    }

    pub fn is_armed(&self) -> bool {
        match self {
            VsyncSource::Hardware(source) => source.is_armed(),
            VsyncSource::Software(source) => source.is_armed(),
        }
    }

    /// Changes the cadence of future arm cycles. An armed deadline is kept.
    pub fn set_refresh_rate(&mut self, refresh_rate: u32) -> Result<()> {
        validate_refresh_rate(refresh_rate)?;
        match self {
            VsyncSource::Hardware(source) => source.set_refresh_rate(refresh_rate),
            VsyncSource::Software(source) => source.set_refresh_rate(refresh_rate),
        }
        Ok(())
    }

    pub fn refresh_rate(&self) -> u32 {
        match self {
            VsyncSource::Hardware(source) => source.refresh_rate(),
            VsyncSource::Software(source) => source.refresh_rate(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        refresh_interval(self.refresh_rate())
    }

    /// Timer deadline of an armed software source
    pub fn deadline(&self) -> Option<Duration> {
        match self {
            VsyncSource::Hardware(_) => None,
            VsyncSource::Software(source) => source.deadline(),
        }
    }

    /// Feeds a backend vblank into a hardware source
    pub fn deliver(&mut self, timestamp: Duration) -> Option<VsyncEvent> {
        match self {
            VsyncSource::Hardware(source) => source.deliver(timestamp),
            VsyncSource::Software(_) => {
                log::debug!("Ignoring backend vblank for a software vsync source");
                None
            }
        }
    }

    /// Fires an expired software timer
    pub fn poll(&mut self, now: Duration) -> Option<VsyncEvent> {
        match self {
            VsyncSource::Hardware(_) => None,
            VsyncSource::Software(source) => source.poll(now),
        }
    }
}
