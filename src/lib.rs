//! # framepace
//!
//! Per-output frame scheduling for desktop compositors, driven by hardware or
//! software vsync, plus a reference-counted visibility model for the windows
//! in the scene.
//!
//! ## Architecture
//!
//! - `vsync`: hardware (backend vblank) and software (timer) tick sources
//! - `scheduler`: the per-output frame pacing state machine and its statistics
//! - `output`: display outputs owning one scheduler and one vsync source each,
//!   and the registry routing backend events to them
//! - `scene`: scene nodes whose visibility is held by independent reasons
//! - `compositor`: a headless event loop tying everything together
//! - `config`: configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use framepace::{FramepaceConfig, HeadlessCompositor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FramepaceConfig::default();
//!     let mut compositor = HeadlessCompositor::new(config)?;
//!     compositor.run().await
//! }
//! ```

pub mod clock;
pub mod compositor;
pub mod config;
pub mod error;
pub mod output;
pub mod scene;
pub mod scheduler;
pub mod vsync;

// Re-export main types for easy access
pub use compositor::{HeadlessCompositor, OutputReport};
pub use config::FramepaceConfig;
pub use error::PacingError;
pub use output::{DisplayOutput, OutputId, OutputRegistry};
pub use scene::{NodeId, SceneGraph, VisibilityReason};
pub use scheduler::{FrameEvent, FrameScheduler, FrameStats};
pub use vsync::{VsyncKind, VsyncSource};

/// Version information for framepace
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
