//! Vblank source synthesized from the monotonic clock

use log::trace;
use std::time::Duration;

use super::{refresh_interval, VsyncEvent};

/// Single-shot timer producing fake vblanks at the refresh cadence
///
/// A tick is never scheduled closer than one refresh interval to the previous
/// one. The timestamp carried by the event is the scheduled boundary, not the
/// wake-up time, so late dispatch does not skew the cadence.
#[derive(Debug)]
pub struct SoftwareVsync {
    refresh_rate: u32,
    interval: Duration,
    deadline: Option<Duration>,
    last_tick: Option<Duration>,
}

impl SoftwareVsync {
    pub fn new(refresh_rate: u32) -> Self {
        Self {
            refresh_rate,
            interval: refresh_interval(refresh_rate),
            deadline: None,
            last_tick: None,
        }
    }

    pub fn arm(&mut self, deadline: Duration) {
        if self.deadline.is_some() {
            return;
        }

        let target = match self.last_tick {
            Some(last) => deadline.max(last + self.interval),
            None => deadline,
        };
        trace!("Software vsync armed for {:?}", target);
        self.deadline = Some(target);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn last_tick(&self) -> Option<Duration> {
        self.last_tick
    }

    pub fn set_refresh_rate(&mut self, refresh_rate: u32) {
        self.refresh_rate = refresh_rate;
        self.interval = refresh_interval(refresh_rate);
    }

    pub fn refresh_rate(&self) -> u32 {
        self.refresh_rate
    }

    pub fn poll(&mut self, now: Duration) -> Option<VsyncEvent> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }

        self.deadline = None;
        self.last_tick = Some(deadline);
        Some(VsyncEvent {
            timestamp: deadline,
        })
    }
}
