//! # framepace - headless frame pacing driver
//!
//! Creates a set of virtual outputs, drives their frame schedulers from
//! software timers or emulated hardware vblanks, and reports per-output
//! presentation statistics on exit.

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use framepace::{FramepaceConfig, HeadlessCompositor, VsyncKind};

const BUILD_DATE: &str = env!("BUILD_DATE");
const GIT_COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

#[derive(Parser)]
#[command(name = "framepace")]
#[command(about = "Per-output frame pacing driven by hardware or software vsync")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/framepace/framepace.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Number of virtual outputs
    #[arg(long)]
    outputs: Option<u32>,

    /// Refresh rate in millihertz (60000 = 60 Hz)
    #[arg(long)]
    refresh_rate: Option<u32>,

    /// Vsync source: software or hardware
    #[arg(long, value_enum)]
    vsync: Option<VsyncKind>,

    /// Stop after this many frames per output (0 = until interrupted)
    #[arg(long)]
    frames: Option<u64>,

    /// Print per-output statistics as JSON on exit
    #[arg(long)]
    stats_json: bool,
}

impl Cli {
    /// Applies command line overrides on top of the loaded configuration
    fn apply(&self, config: &mut FramepaceConfig) {
        if self.debug {
            config.general.debug = true;
        }
        if let Some(count) = self.outputs {
            config.output.count = count;
        }
        if let Some(rate) = self.refresh_rate {
            config.output.refresh_rate = rate;
        }
        if let Some(kind) = self.vsync {
            config.vsync.source = kind;
        }
        if let Some(frames) = self.frames {
            config.general.max_frames = frames;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging so general.debug can raise the level
    let loaded = FramepaceConfig::load(&cli.config);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => FramepaceConfig::default(),
    };
    cli.apply(&mut config);

    // Initialize logging
    let filter = if config.general.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("🚀 Starting framepace");
    info!(
        "📄 Version: {} ({}, built {})",
        framepace::VERSION,
        GIT_COMMIT,
        BUILD_DATE
    );

    match loaded {
        Ok(_) => info!("✅ Configuration loaded from: {}", cli.config),
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
        }
    }

    let mut compositor = HeadlessCompositor::new(config)?;
    compositor.run().await?;

    if cli.stats_json {
        println!("{}", serde_json::to_string_pretty(&compositor.reports())?);
    }

    info!("👋 framepace shutting down");
    Ok(())
}
