//! Headless compositor driver
//!
//! Wires the pieces together the way a real compositor would: one
//! [`OutputRegistry`] of virtual outputs, a [`SceneGraph`] holding the
//! windows, and an event loop that sleeps until the next vsync deadline,
//! fires it, and paints whatever the scene says is visible whenever a
//! scheduler reports [`FrameEvent::ReadyToPaint`].
//!
//! No pixels are produced. Hardware vsync outputs get their vblanks from a
//! built-in emulation of the display controller at the scheduled deadline.

use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::Instant;

use crate::clock::{Clock, MonotonicClock};
use crate::config::FramepaceConfig;
use crate::output::{OutputId, OutputRegistry, Point, Size};
use crate::scene::{NodeId, SceneGraph, VisibilityReason};
use crate::scheduler::{frame_channel, FrameEvent, FrameReceiver, FrameStats};
use crate::vsync::VsyncKind;

/// Presented frames the demo minimize animation keeps its window on screen
const MINIMIZE_ANIMATION_FRAMES: u64 = 10;

/// Per-output summary printed after a run
#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    pub output: u32,
    pub name: String,
    pub refresh_rate: u32,
    pub frames: u64,
    pub stats: FrameStats,
}

/// A window whose minimize animation still holds it visible
#[derive(Debug, Clone, Copy)]
struct MinimizeAnimation {
    node: NodeId,
    remaining_frames: u64,
}

/// Event loop driving every output's frame scheduler
pub struct HeadlessCompositor {
    config: FramepaceConfig,
    clock: Arc<MonotonicClock>,
    outputs: OutputRegistry,
    scene: SceneGraph,
    events: FrameReceiver,
    frames: BTreeMap<OutputId, u64>,
    minimizing: Option<MinimizeAnimation>,
    running: bool,
}

impl HeadlessCompositor {
    /// Creates the configured virtual outputs and the demo scene
    pub fn new(config: FramepaceConfig) -> Result<Self> {
        info!("🏗️ Initializing headless compositor...");
        config.validate()?;

        let clock = Arc::new(MonotonicClock::new());
        let (tx, events) = frame_channel();
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let mut outputs = OutputRegistry::new(&config, shared_clock, tx);

        let size = Size::new(config.output.width, config.output.height);
        let width = i32::try_from(config.output.width)?;
        for index in 0..config.output.count {
            let x = i32::try_from(index)?.saturating_mul(width);
            let id = outputs.add_virtual_output(Point::new(x, 0), size)?;
            debug!("🖥️ Virtual output {} at x={}", id, x);
        }

        let (scene, minimizing) = build_demo_scene()?;

        info!(
            "✅ {} output(s) at {} mHz, {:?} vsync",
            outputs.len(),
            config.output.refresh_rate,
            config.vsync.source
        );

        Ok(Self {
            frames: outputs.ids().map(|id| (id, 0)).collect(),
            config,
            clock,
            outputs,
            scene,
            events,
            minimizing,
            running: false,
        })
    }

    /// Runs until interrupted, until every output presented
    /// `general.max_frames` frames, or until no output has work left
    pub async fn run(&mut self) -> Result<()> {
        info!("🎬 Starting frame loop");
        self.running = true;

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        self.outputs.request_repaint_all();

        while self.running {
            self.process_frame_events()?;
            if !self.running {
                break;
            }

            let Some(wakeup) = self.next_wakeup() else {
                info!("💤 No frame scheduled on any output, stopping");
                break;
            };
            let deadline = Instant::from_std(self.clock.instant_at(wakeup));

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("📨 Received SIGTERM, shutting down gracefully");
                    self.running = false;
                }
                _ = sigint.recv() => {
                    info!("📨 Received SIGINT (Ctrl+C), shutting down gracefully");
                    self.running = false;
                }
                _ = tokio::time::sleep_until(deadline) => self.tick(),
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Fires every vsync that is due
    fn tick(&mut self) {
        let fired = self.outputs.dispatch_timers();

        let now = self.clock.now();
        for (id, timestamp) in self.emulated_vblanks() {
            if timestamp <= now && self.outputs.deliver_vblank(id, timestamp).is_ok() {
                debug!("Output {}: emulated vblank at {:?}", id, timestamp);
            }
        }

        if fired > 0 {
            debug!("⏱️ {} software vsync tick(s) at {:?}", fired, now);
        }
    }

    /// Pending vblanks of hardware outputs, at their scheduled deadline
    fn emulated_vblanks(&self) -> Vec<(OutputId, Duration)> {
        self.outputs
            .outputs()
            .filter(|o| o.is_enabled() && o.vsync().kind() == VsyncKind::Hardware)
            .filter(|o| o.vsync().is_armed())
            .filter_map(|o| Some((o.id(), o.scheduler().next_presentation_timestamp()?)))
            .collect()
    }

    fn next_wakeup(&self) -> Option<Duration> {
        let hardware = self.emulated_vblanks().into_iter().map(|(_, ts)| ts).min();
        match (self.outputs.next_deadline(), hardware) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn process_frame_events(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                FrameEvent::ReadyToPaint { output, deadline } => self.paint(output, deadline),
                FrameEvent::FrameCompleted { output, timestamp } => {
                    self.frame_presented(output, timestamp)?
                }
            }
        }
        Ok(())
    }

    fn paint(&self, output: OutputId, deadline: Duration) {
        let windows = self.scene.visible_windows();
        debug!(
            "🎨 Output {}: painting {} window(s) {:?} for {:?}",
            output,
            windows.len(),
            windows,
            deadline
        );
    }

    fn frame_presented(&mut self, output: OutputId, timestamp: Duration) -> Result<()> {
        let frames = self.frames.entry(output).or_insert(0);
        *frames += 1;
        let frames = *frames;
        debug!("Output {}: frame {} presented at {:?}", output, frames, timestamp);

        self.advance_animations()?;

        let max_frames = self.config.general.max_frames;
        if max_frames > 0 && frames >= max_frames {
            info!("🏁 Output {} presented {} frames", output, frames);
            if self.frames.values().all(|&count| count >= max_frames) {
                self.running = false;
            }
            return Ok(());
        }

        if let Err(e) = self.outputs.request_repaint(output) {
            warn!("⚠️ Output {}: {}", output, e);
        }
        Ok(())
    }

    fn advance_animations(&mut self) -> Result<()> {
        let Some(animation) = self.minimizing.as_mut() else {
            return Ok(());
        };
        animation.remaining_frames = animation.remaining_frames.saturating_sub(1);
        if animation.remaining_frames > 0 {
            return Ok(());
        }

        let node = animation.node;
        self.minimizing = None;
        self.scene.unref_visible(node, VisibilityReason::Minimized)?;
        info!("🪟 Minimize animation finished, scene node {} hidden", node);
        Ok(())
    }

    fn shutdown(&mut self) {
        info!("🔽 Shutting down headless compositor...");
        self.running = false;

        for report in self.reports() {
            info!(
                "📊 {} ({}): {} frames, {:.1} fps, jitter {:?}, {} missed",
                report.name,
                report.output,
                report.frames,
                report.stats.current_fps,
                report.stats.jitter,
                report.stats.missed_frames
            );
        }
        info!("✅ Headless compositor shutdown complete");
    }

    /// Frame statistics of every output
    pub fn reports(&self) -> Vec<OutputReport> {
        self.outputs
            .outputs()
            .map(|output| OutputReport {
                output: output.id().raw(),
                name: output.name().to_string(),
                refresh_rate: output.refresh_rate(),
                frames: self.frames.get(&output.id()).copied().unwrap_or(0),
                stats: output.scheduler().stats().clone(),
            })
            .collect()
    }

    pub fn config(&self) -> &FramepaceConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }
}

/// Desktop with two decorated windows and a third one mid-minimize
fn build_demo_scene() -> Result<(SceneGraph, Option<MinimizeAnimation>)> {
    let mut scene = SceneGraph::new();
    let desktop = scene.add_container(None)?;

    for window in [1, 2] {
        let node = scene.attach_window(window, Some(desktop))?;
        scene.set_surface(node, true)?;
        scene.set_decoration(node, true)?;
        scene.set_shadow(node, true)?;
    }

    let minimized = scene.attach_window(3, Some(desktop))?;
    scene.set_surface(minimized, true)?;
    scene.ref_visible(minimized, VisibilityReason::Minimized)?;
    scene.set_hidden(minimized, true)?;

    Ok((
        scene,
        Some(MinimizeAnimation {
            node: minimized,
            remaining_frames: MINIMIZE_ANIMATION_FRAMES,
        }),
    ))
}
