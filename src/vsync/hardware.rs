//! Vblank source fed by the display backend

use log::{debug, trace};
use std::time::Duration;

use super::VsyncEvent;

/// Subscribes to backend vblank notifications one cycle at a time
#[derive(Debug)]
pub struct HardwareVsync {
    refresh_rate: u32,
    subscribed: bool,
    last_vblank: Option<Duration>,
}

impl HardwareVsync {
    pub fn new(refresh_rate: u32) -> Self {
        Self {
            refresh_rate,
            subscribed: false,
            last_vblank: None,
        }
    }

    pub fn arm(&mut self) {
        if !self.subscribed {
            trace!("Subscribing to next hardware vblank");
            self.subscribed = true;
        }
    }

    pub fn cancel(&mut self) {
        self.subscribed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.subscribed
    }

    pub fn set_refresh_rate(&mut self, refresh_rate: u32) {
        self.refresh_rate = refresh_rate;
    }

    pub fn refresh_rate(&self) -> u32 {
        self.refresh_rate
    }

    /// Most recent vblank handed to a subscriber
    pub fn last_vblank(&self) -> Option<Duration> {
        self.last_vblank
    }

    /// Consumes the subscription. Vblanks nobody asked for are dropped.
    pub fn deliver(&mut self, timestamp: Duration) -> Option<VsyncEvent> {
        if !self.subscribed {
            debug!("Dropping unsubscribed hardware vblank at {:?}", timestamp);
            return None;
        }

        self.subscribed = false;
        self.last_vblank = Some(timestamp);
        Some(VsyncEvent { timestamp })
    }
}
