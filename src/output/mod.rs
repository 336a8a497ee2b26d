//! Display outputs
//!
//! A [`DisplayOutput`] exclusively owns one [`VsyncSource`] and one
//! [`FrameScheduler`] for its whole lifetime. Every vblank produced by the
//! source is fed straight into the scheduler; resizes, mode switches and
//! enable/disable cycles never recreate either of them, so an in-flight frame
//! survives a resize.
//!
//! The refresh rate is shared state between scheduler and source. It is only
//! ever changed through [`DisplayOutput::init`], [`DisplayOutput::set_mode`]
//! and [`DisplayOutput::set_modes`], which validate first and then update both
//! in one step.

mod geometry;
pub mod registry;

pub use geometry::{Mode, Point, Rect, Size};
pub use registry::{OutputIdAllocator, OutputRegistry};

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{PacingError, Result};
use crate::scheduler::{FrameScheduler, FrameSender};
use crate::vsync::{validate_refresh_rate, VsyncEvent, VsyncKind, VsyncSource};

/// Identifier of an output, unique within one [`OutputRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId(u32);

impl OutputId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for OutputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One display, its mode set and its frame pacing machinery
pub struct DisplayOutput {
    id: OutputId,
    name: String,
    geometry: Rect,
    modes: Vec<Mode>,
    current_mode: Option<Mode>,
    enabled: bool,
    connected: bool,
    initial_refresh_rate: u32,
    scheduler: FrameScheduler,
    vsync: VsyncSource,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DisplayOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayOutput")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("geometry", &self.geometry)
            .field("current_mode", &self.current_mode)
            .field("enabled", &self.enabled)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl DisplayOutput {
    /// Creates a detected but not yet initialized output. It has no mode and
    /// cannot be enabled until [`init`](Self::init) or
    /// [`set_modes`](Self::set_modes) ran.
    pub fn new(
        id: OutputId,
        name: impl Into<String>,
        kind: VsyncKind,
        refresh_rate: u32,
        scheduler_config: &SchedulerConfig,
        clock: Arc<dyn Clock>,
        events: FrameSender,
    ) -> Result<Self> {
        let vsync = VsyncSource::new(kind, refresh_rate)?;
        let scheduler = FrameScheduler::new(id, refresh_rate, scheduler_config, events)?;

        Ok(Self {
            id,
            name: name.into(),
            geometry: Rect::default(),
            modes: Vec::new(),
            current_mode: None,
            enabled: false,
            connected: true,
            initial_refresh_rate: refresh_rate,
            scheduler,
            vsync,
            clock,
        })
    }

    /// Builds the initial synthetic mode and places the output
    pub fn init(&mut self, position: Point, pixel_size: Size) -> Result<()> {
        let mode = Mode::new(pixel_size, self.initial_refresh_rate);
        mode.validate()?;

        self.apply_refresh_rate(mode.refresh_rate)?;
        self.modes = vec![mode];
        self.current_mode = Some(mode);
        self.geometry = Rect::from_loc_and_size(position, pixel_size);

        info!(
            "🖥️ Output {} ({}) initialized: {} at ({}, {})",
            self.id, self.name, mode, position.x, position.y
        );
        Ok(())
    }

    /// Installs a backend-reported mode list
    pub fn set_modes(&mut self, modes: Vec<Mode>, current: Mode) -> Result<()> {
        if modes.is_empty() {
            return Err(PacingError::Configuration(format!(
                "output {} reported no modes",
                self.id
            )));
        }
        for mode in &modes {
            mode.validate()?;
        }
        if !modes.contains(&current) {
            return Err(PacingError::Configuration(format!(
                "current mode {} is not in the mode list of output {}",
                current, self.id
            )));
        }

        self.apply_refresh_rate(current.refresh_rate)?;
        self.modes = modes;
        self.current_mode = Some(current);
        self.geometry = Rect::from_loc_and_size(self.geometry.loc(), current.size);

        debug!("Output {}: {} modes, current {}", self.id, self.modes.len(), current);
        Ok(())
    }

    /// Switches to one of the listed modes
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        if !self.modes.contains(&mode) {
            return Err(PacingError::Configuration(format!(
                "mode {} is not supported by output {}",
                mode, self.id
            )));
        }

        self.apply_refresh_rate(mode.refresh_rate)?;
        self.current_mode = Some(mode);
        self.geometry = Rect::from_loc_and_size(self.geometry.loc(), mode.size);

        info!("🖥️ Output {} switched to {}", self.id, mode);
        Ok(())
    }

    /// Resizes and moves the output
    ///
    /// The current mode is rebuilt from the new size and the existing refresh
    /// rate. Scheduler and source are kept as they are, including any frame
    /// in flight.
    pub fn set_geometry(&mut self, geometry: Rect) -> Result<()> {
        let mode = Mode::new(geometry.size(), self.vsync.refresh_rate());
        mode.validate()?;

        self.modes = vec![mode];
        self.current_mode = Some(mode);
        self.geometry = geometry;

        debug!(
            "Output {}: geometry {}x{}+{}+{}",
            self.id, geometry.width, geometry.height, geometry.x, geometry.y
        );
        Ok(())
    }

    pub fn move_to(&mut self, position: Point) {
        self.geometry.x = position.x;
        self.geometry.y = position.y;
    }

    /// Enables or disables frame production
    ///
    /// Disabling cancels the vsync source and forces the scheduler idle. No
    /// completion fires afterwards until the output is enabled again and a new
    /// repaint is requested.
    pub fn update_enablement(&mut self, enable: bool) -> Result<()> {
        if !self.connected {
            return Err(PacingError::BackendDisconnect(self.id));
        }
        if enable == self.enabled {
            return Ok(());
        }

        if enable {
            if self.current_mode.is_none() {
                return Err(PacingError::Configuration(format!(
                    "output {} has no mode and cannot be enabled",
                    self.id
                )));
            }
            self.enabled = true;
            info!("✅ Output {} ({}) enabled", self.id, self.name);
        } else {
            self.scheduler.reset(&mut self.vsync);
            self.enabled = false;
            info!("🚫 Output {} ({}) disabled", self.id, self.name);
        }
        Ok(())
    }

    /// Asks for a new frame on this output
    ///
    /// Requests on a disabled output are dropped.
    pub fn request_repaint(&mut self) -> Result<()> {
        if !self.connected {
            return Err(PacingError::BackendDisconnect(self.id));
        }
        if !self.enabled {
            debug!("Output {}: repaint requested while disabled, dropped", self.id);
            return Ok(());
        }

        let now = self.clock.now();
        self.scheduler.request_repaint(&mut self.vsync, now);
        Ok(())
    }

    /// Entry point for hardware vblank events from the backend
    pub fn handle_vblank(&mut self, timestamp: Duration) -> Result<()> {
        if !self.connected {
            return Err(PacingError::BackendDisconnect(self.id));
        }
        match self.vsync.deliver(timestamp) {
            Some(event) => self.vblank_occurred(event),
            None => Ok(()),
        }
    }

    /// Fires the software vsync timer if it expired. Returns whether a tick
    /// was produced.
    pub fn dispatch_timer(&mut self, now: Duration) -> Result<bool> {
        if !self.connected {
            return Ok(false);
        }
        match self.vsync.poll(now) {
            Some(event) => self.vblank_occurred(event).map(|_| true),
            None => Ok(false),
        }
    }

    fn vblank_occurred(&mut self, event: VsyncEvent) -> Result<()> {
        if !self.enabled {
            debug!("Output {}: vblank while disabled, dropped", self.id);
            return Ok(());
        }
        let now = self.clock.now();
        self.scheduler
            .on_frame_completed(&mut self.vsync, event.timestamp, now)
    }

    /// Presentation feedback reported by the compositor instead of the vsync
    /// source. Consumes the current arm cycle.
    pub fn on_frame_completed(&mut self, timestamp: Duration) -> Result<()> {
        if !self.connected {
            return Err(PacingError::BackendDisconnect(self.id));
        }
        if !self.enabled {
            debug!("Output {}: completion while disabled, dropped", self.id);
            return Ok(());
        }
        let now = self.clock.now();
        if self.scheduler.is_in_flight() {
            self.vsync.cancel();
        }
        self.scheduler
            .on_frame_completed(&mut self.vsync, timestamp, now)
    }

    pub fn inhibit(&mut self) {
        self.scheduler.inhibit();
    }

    /// Releases one inhibition. A disabled output has no pending request, so
    /// this never arms the source while disabled.
    pub fn uninhibit(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.scheduler.uninhibit(&mut self.vsync, now)
    }

    /// Tears down scheduling after the backend lost the output
    ///
    /// The vsync source is cancelled first; every later delivery for this
    /// output is reported as [`PacingError::BackendDisconnect`].
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.scheduler.reset(&mut self.vsync);
        self.enabled = false;
        self.connected = false;
        info!("🔌 Output {} ({}) disconnected", self.id, self.name);
    }

    /// Software timer deadline the event loop has to wake up for
    pub fn next_deadline(&self) -> Option<Duration> {
        if self.enabled {
            self.vsync.deadline()
        } else {
            None
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn current_mode(&self) -> Option<Mode> {
        self.current_mode
    }

    pub fn refresh_rate(&self) -> u32 {
        self.vsync.refresh_rate()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn vsync(&self) -> &VsyncSource {
        &self.vsync
    }

    pub fn reset_stats(&mut self) {
        self.scheduler.reset_stats();
    }

    fn apply_refresh_rate(&mut self, refresh_rate: u32) -> Result<()> {
        validate_refresh_rate(refresh_rate)?;
        // Both setters only fail on a zero rate, checked above
        self.scheduler.set_refresh_rate(refresh_rate)?;
        self.vsync.set_refresh_rate(refresh_rate)?;
        Ok(())
    }
}

impl Drop for DisplayOutput {
    fn drop(&mut self) {
        self.vsync.cancel();
        debug!("Output {} destroyed", self.id);
    }
}
