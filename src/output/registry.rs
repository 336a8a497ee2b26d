//! Backend output registry
//!
//! Owns every [`DisplayOutput`] the backend detected, hands out output
//! identifiers and routes backend events (hot-plug, disconnect, hardware
//! vblanks, software timer expiry) to the right output.
//!
//! Identifiers come from a per-registry [`OutputIdAllocator`] rather than a
//! process-wide counter, so two registries (or two test runs) never observe
//! each other's numbering.

use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::{DisplayOutput, OutputId, Point, Size};
use crate::clock::Clock;
use crate::config::FramepaceConfig;
use crate::error::{PacingError, Result};
use crate::scheduler::FrameSender;
use crate::vsync::VsyncKind;

/// Sequential output identifier allocator
#[derive(Debug, Default, Clone)]
pub struct OutputIdAllocator {
    next: u32,
}

impl OutputIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> OutputId {
        let id = OutputId::new(self.next);
        self.next += 1;
        id
    }

    /// Whether `id` was handed out since the last reset
    pub fn was_allocated(&self, id: OutputId) -> bool {
        id.raw() < self.next
    }

    /// Starts numbering from zero again
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// All outputs known to the backend
pub struct OutputRegistry {
    ids: OutputIdAllocator,
    outputs: BTreeMap<OutputId, DisplayOutput>,
    config: FramepaceConfig,
    clock: Arc<dyn Clock>,
    events: FrameSender,
    virtual_outputs: u32,
}

impl OutputRegistry {
    pub fn new(config: &FramepaceConfig, clock: Arc<dyn Clock>, events: FrameSender) -> Self {
        Self {
            ids: OutputIdAllocator::new(),
            outputs: BTreeMap::new(),
            config: config.clone(),
            clock,
            events,
            virtual_outputs: 0,
        }
    }

    /// Registers a newly detected output. It still needs a mode before it
    /// can be enabled.
    pub fn add_output(&mut self, name: impl Into<String>, kind: VsyncKind) -> Result<OutputId> {
        let id = self.ids.allocate();
        let output = DisplayOutput::new(
            id,
            name,
            kind,
            self.config.output.refresh_rate,
            &self.config.scheduler,
            Arc::clone(&self.clock),
            self.events.clone(),
        )?;

        info!("➕ Output {} ({}) detected, {:?} vsync", id, output.name(), kind);
        self.outputs.insert(id, output);
        Ok(id)
    }

    /// Creates, initializes and enables a virtual output driven by the
    /// configured vsync source
    pub fn add_virtual_output(&mut self, position: Point, pixel_size: Size) -> Result<OutputId> {
        let name = format!("Virtual-{}", self.virtual_outputs);
        let id = self.add_output(name, self.config.vsync.source)?;

        let setup = self.get_mut(id).and_then(|output| {
            output.init(position, pixel_size)?;
            output.update_enablement(true)
        });
        if let Err(e) = setup {
            self.outputs.remove(&id);
            return Err(e);
        }

        self.virtual_outputs += 1;
        Ok(id)
    }

    /// Handles a backend disconnect. The output's vsync source is cancelled
    /// before the output is dropped.
    pub fn remove_output(&mut self, id: OutputId) -> Result<()> {
        let mut output = self
            .outputs
            .remove(&id)
            .ok_or_else(|| missing(&self.ids, id))?;
        output.disconnect();
        info!("➖ Output {} ({}) removed", id, output.name());
        Ok(())
    }

    pub fn output(&self, id: OutputId) -> Option<&DisplayOutput> {
        self.outputs.get(&id)
    }

    pub fn output_mut(&mut self, id: OutputId) -> Option<&mut DisplayOutput> {
        self.outputs.get_mut(&id)
    }

    fn get_mut(&mut self, id: OutputId) -> Result<&mut DisplayOutput> {
        let ids = &self.ids;
        self.outputs.get_mut(&id).ok_or_else(|| missing(ids, id))
    }

    pub fn request_repaint(&mut self, id: OutputId) -> Result<()> {
        self.get_mut(id)?.request_repaint()
    }

    /// Asks every enabled output for a frame
    pub fn request_repaint_all(&mut self) {
        for output in self.outputs.values_mut().filter(|o| o.is_enabled()) {
            if let Err(e) = output.request_repaint() {
                warn!("⚠️ Output {}: repaint request failed: {}", output.id(), e);
            }
        }
    }

    /// Routes a hardware vblank to its output. Events for outputs that were
    /// already disconnected are reported and dropped.
    pub fn deliver_vblank(&mut self, id: OutputId, timestamp: Duration) -> Result<()> {
        let result = self.get_mut(id).and_then(|output| output.handle_vblank(timestamp));
        if let Err(ref e) = result {
            warn!("⚠️ Dropped vblank at {:?}: {}", timestamp, e);
        }
        result
    }

    /// Fires every expired software vsync timer. Per-output failures are
    /// logged and do not stop the others. Returns how many ticks were
    /// accepted; a rejected tick is not counted.
    pub fn dispatch_timers(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;

        for output in self.outputs.values_mut() {
            match output.dispatch_timer(now) {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => warn!("⚠️ Output {}: {}", output.id(), e),
            }
        }
        fired
    }

    /// Earliest software vsync deadline across all enabled outputs
    pub fn next_deadline(&self) -> Option<Duration> {
        self.outputs.values().filter_map(|o| o.next_deadline()).min()
    }

    pub fn ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        self.outputs.keys().copied()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &DisplayOutput> {
        self.outputs.values()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Disconnects everything and restarts identifier allocation
    pub fn reset(&mut self) {
        let ids: Vec<_> = self.outputs.keys().copied().collect();
        for id in ids {
            let _ = self.remove_output(id);
        }
        self.ids.reset();
        self.virtual_outputs = 0;
    }
}

/// Outputs that were handed an id but are gone have been disconnected
fn missing(ids: &OutputIdAllocator, id: OutputId) -> PacingError {
    if ids.was_allocated(id) {
        PacingError::BackendDisconnect(id)
    } else {
        PacingError::UnknownOutput(id)
    }
}
