//! Per-output frame scheduler
//!
//! The [`FrameScheduler`] decides when the next frame of an output has to be
//! painted. It keeps at most one frame in flight: a repaint request while a
//! frame is pending presentation is only remembered, and any number of such
//! requests collapse into a single follow-up frame once the vblank for the
//! in-flight frame arrives. This is the backpressure that keeps a slow
//! renderer from queueing up work.
//!
//! # Flow
//!
//! ```text
//! request_repaint ──► arm VsyncSource ──► ReadyToPaint ──► compositor paints
//!        ▲                                                        │
//!        └──── pending? ◄── FrameCompleted ◄── on_frame_completed ◄ vblank
//! ```
//!
//! Notifications are pushed into an unbounded channel as [`FrameEvent`]s and
//! consumed by the compositor after the current event-loop turn, so nothing a
//! consumer does can re-enter the scheduler mid-update.

pub mod frame_pacing;

use log::{debug, trace, warn};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::SchedulerConfig;
use crate::error::{Imbalance, PacingError, Result};
use crate::output::OutputId;
use crate::vsync::{refresh_interval, validate_refresh_rate, VsyncSource};

pub use frame_pacing::{FrameStats, PresentationTracker};

/// Notification emitted by a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// The compositor should paint `output` now; the frame is expected to be
    /// presented at `deadline`.
    ReadyToPaint { output: OutputId, deadline: Duration },
    /// The in-flight frame of `output` was presented at `timestamp`.
    FrameCompleted { output: OutputId, timestamp: Duration },
}

impl FrameEvent {
    pub fn output(&self) -> OutputId {
        match self {
            FrameEvent::ReadyToPaint { output, .. } | FrameEvent::FrameCompleted { output, .. } => {
                *output
            }
        }
    }
}

pub type FrameSender = mpsc::UnboundedSender<FrameEvent>;
pub type FrameReceiver = mpsc::UnboundedReceiver<FrameEvent>;

/// Creates the channel schedulers publish their [`FrameEvent`]s on
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::unbounded_channel()
}

/// Frame pacing state machine for one output
#[derive(Debug)]
pub struct FrameScheduler {
    output: OutputId,
    pending_repaint: bool,
    in_flight: bool,
    last_presentation: Option<Duration>,
    next_presentation: Option<Duration>,
    refresh_rate: u32,
    refresh_interval: Duration,
    inhibit_count: u32,
    tracker: PresentationTracker,
    events: FrameSender,
}

impl FrameScheduler {
    pub fn new(
        output: OutputId,
        refresh_rate: u32,
        config: &SchedulerConfig,
        events: FrameSender,
    ) -> Result<Self> {
        validate_refresh_rate(refresh_rate)?;
        Ok(Self {
            output,
            pending_repaint: false,
            in_flight: false,
            last_presentation: None,
            next_presentation: None,
            refresh_rate,
            refresh_interval: refresh_interval(refresh_rate),
            inhibit_count: 0,
            tracker: PresentationTracker::new(config.stats_history, config.missed_frame_threshold),
            events,
        })
    }

    /// Asks for a new frame
    ///
    /// Idle and uninhibited: arms `source` at the predicted presentation time
    /// and emits [`FrameEvent::ReadyToPaint`]. Otherwise the request is only
    /// recorded and served when the in-flight frame completes or the last
    /// inhibition is lifted.
    pub fn request_repaint(&mut self, source: &mut VsyncSource, now: Duration) {
        if self.in_flight || self.inhibit_count > 0 {
            if !self.pending_repaint {
                trace!("Output {}: repaint deferred", self.output);
            }
            self.pending_repaint = true;
            return;
        }

        self.schedule_frame(source, now);
    }

    fn schedule_frame(&mut self, source: &mut VsyncSource, now: Duration) {
        let predicted = self.predict_presentation(now);
        source.arm(predicted);
        // A software source may push the tick out to keep its cadence
        let deadline = source.deadline().unwrap_or(predicted);

        self.in_flight = true;
        self.pending_repaint = false;
        self.next_presentation = Some(deadline);

        debug!(
            "Output {}: frame scheduled for {:?} (now {:?})",
            self.output, deadline, now
        );
        self.notify(FrameEvent::ReadyToPaint {
            output: self.output,
            deadline,
        });
    }

    /// Next refresh boundary after the last presentation, or `now` when that
    /// boundary has already passed.
    fn predict_presentation(&self, now: Duration) -> Duration {
        match self.last_presentation {
            Some(last) => {
                let next = last + self.refresh_interval;
                if next <= now {
                    now
                } else {
                    next
                }
            }
            None => now + self.refresh_interval,
        }
    }

    /// Retires the in-flight frame presented at `timestamp`
    ///
    /// A timestamp that does not advance past the previous presentation is a
    /// timing anomaly: it is reported and otherwise ignored, and the source is
    /// re-armed so the in-flight frame still completes on the next valid tick.
    pub fn on_frame_completed(
        &mut self,
        source: &mut VsyncSource,
        timestamp: Duration,
        now: Duration,
    ) -> Result<()> {
        if let Some(last) = self.last_presentation {
            if timestamp <= last {
                warn!(
                    "⚠️ Output {}: non-monotonic presentation timestamp {:?} (last {:?}), ignoring",
                    self.output, timestamp, last
                );
                if self.in_flight && !source.is_armed() {
                    source.arm(self.next_presentation.unwrap_or(last + self.refresh_interval));
                }
                return Err(PacingError::TimingAnomaly {
                    output: self.output,
                    timestamp,
                    last,
                });
            }
        }

        if !self.in_flight {
            debug!(
                "Output {}: completion at {:?} without a frame in flight, ignoring",
                self.output, timestamp
            );
            return Ok(());
        }

        self.in_flight = false;
        self.next_presentation = None;
        self.last_presentation = Some(timestamp);
        self.tracker.record(timestamp, self.refresh_interval);

        trace!("Output {}: frame presented at {:?}", self.output, timestamp);
        self.notify(FrameEvent::FrameCompleted {
            output: self.output,
            timestamp,
        });

        if self.pending_repaint {
            self.pending_repaint = false;
            self.request_repaint(source, now.max(timestamp));
        }

        Ok(())
    }

    /// Updates the refresh interval. [`crate::output::DisplayOutput`] applies
    /// the same rate to its vsync source in the same call.
    pub fn set_refresh_rate(&mut self, refresh_rate: u32) -> Result<()> {
        validate_refresh_rate(refresh_rate)?;
        if refresh_rate != self.refresh_rate {
            debug!(
                "Output {}: refresh rate {} -> {} mHz",
                self.output, self.refresh_rate, refresh_rate
            );
        }
        self.refresh_rate = refresh_rate;
        self.refresh_interval = refresh_interval(refresh_rate);
        Ok(())
    }

    /// Holds off arming the source. Requests made meanwhile stay pending.
    pub fn inhibit(&mut self) {
        self.inhibit_count += 1;
        trace!("Output {}: inhibited ({})", self.output, self.inhibit_count);
    }

    /// Releases one [`inhibit`](Self::inhibit). Dropping the last one with a
    /// pending request schedules it right away.
    pub fn uninhibit(&mut self, source: &mut VsyncSource, now: Duration) -> Result<()> {
        if self.inhibit_count == 0 {
            warn!("⚠️ Output {}: uninhibit without matching inhibit", self.output);
            return Err(PacingError::ResourceImbalance {
                what: Imbalance::Inhibition {
                    output: self.output,
                },
            });
        }

        self.inhibit_count -= 1;
        if self.inhibit_count == 0 && self.pending_repaint && !self.in_flight {
            self.schedule_frame(source, now);
        }
        Ok(())
    }

    /// Drops all scheduling state after a disconnect or disable
    pub fn reset(&mut self, source: &mut VsyncSource) {
        source.cancel();
        if self.in_flight || self.pending_repaint {
            debug!("Output {}: scheduler reset with frame outstanding", self.output);
        }
        self.in_flight = false;
        self.pending_repaint = false;
        self.next_presentation = None;
    }

    fn notify(&self, event: FrameEvent) {
        if self.events.send(event).is_err() {
            trace!("Output {}: no frame event listener", self.output);
        }
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn has_pending_repaint(&self) -> bool {
        self.pending_repaint
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibit_count > 0
    }

    pub fn inhibit_count(&self) -> u32 {
        self.inhibit_count
    }

    pub fn refresh_rate(&self) -> u32 {
        self.refresh_rate
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn last_presentation_timestamp(&self) -> Option<Duration> {
        self.last_presentation
    }

    /// Deadline of the in-flight frame
    pub fn next_presentation_timestamp(&self) -> Option<Duration> {
        self.next_presentation
    }

    pub fn stats(&self) -> &FrameStats {
        self.tracker.stats()
    }

    pub fn reset_stats(&mut self) {
        self.tracker.reset();
    }
}

#[cfg(test)]
mod tests;
