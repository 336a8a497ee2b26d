//! Presentation timing statistics
//!
//! Tracks the intervals between consecutive presentations of one output and
//! derives pacing quality figures from them: average interval, jitter,
//! effective frame rate and how many refresh deadlines were missed.
//!
//! A presentation counts as missed when its interval exceeds the refresh
//! interval by more than the configured threshold factor.

use log::debug;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of intervals kept for statistics
pub const DEFAULT_HISTORY_SIZE: usize = 120;

/// Default factor over the refresh interval before a frame counts as missed
pub const DEFAULT_MISSED_FRAME_THRESHOLD: f64 = 1.5;

/// Statistics about presentation timing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStats {
    /// Average interval between presentations over recent frames
    pub avg_interval: Duration,
    /// Minimum interval observed
    pub min_interval: Duration,
    /// Maximum interval observed
    pub max_interval: Duration,
    /// Standard deviation of intervals
    pub jitter: Duration,
    /// Effective presentation rate
    pub current_fps: f64,
    /// Presentations that arrived later than the miss threshold allows
    pub missed_frames: u64,
    /// Total presentations recorded
    pub total_frames: u64,
    /// Percentage of intervals that missed
    pub miss_rate: f64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            avg_interval: Duration::ZERO,
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            jitter: Duration::ZERO,
            current_fps: 0.0,
            missed_frames: 0,
            total_frames: 0,
            miss_rate: 0.0,
        }
    }
}

/// Rolling record of presentation timestamps
#[derive(Debug, Clone)]
pub struct PresentationTracker {
    intervals: VecDeque<Duration>,
    history_size: usize,
    missed_threshold: f64,
    last_presentation: Option<Duration>,
    stats: FrameStats,
}

impl PresentationTracker {
    pub fn new(history_size: usize, missed_threshold: f64) -> Self {
        let history_size = history_size.max(1);
        Self {
            intervals: VecDeque::with_capacity(history_size),
            history_size,
            missed_threshold,
            last_presentation: None,
            stats: FrameStats::default(),
        }
    }

    /// Records one presentation. `refresh_interval` is the cadence in effect
    /// for the frame that was just presented.
    pub fn record(&mut self, timestamp: Duration, refresh_interval: Duration) {
        self.stats.total_frames += 1;

        let Some(last) = self.last_presentation.replace(timestamp) else {
            return;
        };
        let interval = timestamp.saturating_sub(last);

        let budget = refresh_interval.as_secs_f64() * self.missed_threshold;
        let intervals_counted = self.stats.total_frames - 1;
        if interval.as_secs_f64() > budget {
            self.stats.missed_frames += 1;
            debug!(
                "Presentation interval {:?} exceeded {:?} budget",
                interval, refresh_interval
            );
        }
        self.stats.miss_rate = self.stats.missed_frames as f64 / intervals_counted as f64 * 100.0;

        self.intervals.push_back(interval);
        if self.intervals.len() > self.history_size {
            self.intervals.pop_front();
        }

        self.update_stats();
    }

    fn update_stats(&mut self) {
        if self.intervals.is_empty() {
            return;
        }

        let total: Duration = self.intervals.iter().sum();
        self.stats.avg_interval = total / self.intervals.len() as u32;
        self.stats.min_interval = self.intervals.iter().copied().min().unwrap_or_default();
        self.stats.max_interval = self.intervals.iter().copied().max().unwrap_or_default();

        if self.stats.avg_interval > Duration::ZERO {
            self.stats.current_fps = 1.0 / self.stats.avg_interval.as_secs_f64();
        }

        let avg = self.stats.avg_interval.as_secs_f64();
        let variance = self
            .intervals
            .iter()
            .map(|interval| {
                let diff = interval.as_secs_f64() - avg;
                diff * diff
            })
            .sum::<f64>()
            / self.intervals.len() as f64;
        self.stats.jitter = Duration::from_secs_f64(variance.sqrt());
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Clears history and counters. The last presentation timestamp is
    /// forgotten as well, so the next interval is not measured across the gap.
    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_presentation = None;
        self.stats = FrameStats::default();
    }
}

impl Default for PresentationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE, DEFAULT_MISSED_FRAME_THRESHOLD)
    }
}
