//! Configuration management for framepace
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files: the virtual outputs to create, the vsync source that
//! drives them and the frame statistics the schedulers keep.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::scheduler::frame_pacing::{DEFAULT_HISTORY_SIZE, DEFAULT_MISSED_FRAME_THRESHOLD};
use crate::vsync::{VsyncKind, DEFAULT_REFRESH_RATE};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FramepaceConfig {
    /// Virtual outputs created at startup
    #[serde(default)]
    pub output: OutputConfig,

    /// Vsync source selection
    #[serde(default)]
    pub vsync: VsyncConfig,

    /// Frame scheduler tuning
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Refresh rate in millihertz (60000 = 60 Hz)
    pub refresh_rate: u32,

    /// Pixel width of each output
    pub width: u32,

    /// Pixel height of each output
    pub height: u32,

    /// Number of outputs, placed side by side
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct VsyncConfig {
    /// "software" (timer driven) or "hardware" (vblank driven)
    pub source: VsyncKind,
}

/// Frame scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// A presentation interval longer than this many refresh intervals
    /// counts as a missed frame
    pub missed_frame_threshold: f64,

    /// Number of presentation intervals kept for statistics
    pub stats_history: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,

    /// Stop after this many presented frames per output (0 = run until interrupted)
    pub max_frames: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            refresh_rate: DEFAULT_REFRESH_RATE,
            width: 1280,
            height: 1024,
            count: 1,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            missed_frame_threshold: DEFAULT_MISSED_FRAME_THRESHOLD,
            stats_history: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl FramepaceConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: FramepaceConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.output.refresh_rate == 0 {
            anyhow::bail!("Invalid refresh_rate: must be greater than zero");
        }

        if self.output.width == 0 || self.output.height == 0 {
            anyhow::bail!(
                "Invalid output size {}x{}: both dimensions must be non-zero",
                self.output.width,
                self.output.height
            );
        }

        if self.output.count == 0 {
            anyhow::bail!("Invalid output count: at least one output is required");
        }

        let threshold = self.scheduler.missed_frame_threshold;
        if !threshold.is_finite() || threshold <= 1.0 {
            anyhow::bail!("Invalid missed_frame_threshold: must be a finite value above 1.0");
        }

        if self.scheduler.stats_history == 0 {
            anyhow::bail!("Invalid stats_history: must keep at least one interval");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
