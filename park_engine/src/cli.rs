use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::scenario::SCENARIO_NAMES;

#[derive(Parser, Debug)]
#[command(
    about = "Headless park simulation host: runs a demo scenario and logs vehicle state",
    version
)]
pub struct Args {
    /// Scenario to build (coaster, boats, dodgems, swing)
    #[arg(long, default_value = "coaster")]
    pub scenario: String,

    /// Number of simulation ticks to run
    #[arg(long, default_value_t = 2048)]
    pub ticks: u32,

    /// Sample the vehicle state every N ticks for the tick log
    #[arg(long, default_value_t = 16)]
    pub sample_interval: u32,

    /// Path to write the per-tick vehicle samples as JSON
    #[arg(long)]
    pub tick_log_json: Option<PathBuf>,

    /// Render the final frame to a PNG at this path
    #[arg(long)]
    pub frame_png: Option<PathBuf>,

    /// Path to write the paint-pass report as JSON (with --frame-png)
    #[arg(long)]
    pub paint_report_json: Option<PathBuf>,

    /// View rotation for the frame render (0-3)
    #[arg(long, default_value_t = 0)]
    pub rotation: u8,

    /// Draw debug bounding boxes in the frame render
    #[arg(long)]
    pub bounding_boxes: bool,

    /// Print every news/audio event as it happens
    #[arg(long)]
    pub verbose: bool,
}

pub fn parse() -> Result<Args> {
    let args = Args::parse();
    if !SCENARIO_NAMES.contains(&args.scenario.as_str()) {
        bail!(
            "unknown scenario {:?}; expected one of {}",
            args.scenario,
            SCENARIO_NAMES.join(", ")
        );
    }
    if args.rotation > 3 {
        bail!("--rotation must be 0-3");
    }
    if args.paint_report_json.is_some() && args.frame_png.is_none() {
        bail!("--paint-report-json requires --frame-png");
    }
    Ok(args)
}
