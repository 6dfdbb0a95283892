//! CLI tool to score every HUD region of a saved screenshot.
//! Usage: cargo run -p ow-vision --features cli --bin analyze_frame -- <screenshot.png> [--data-dir data]

use anyhow::{Context, Result};
use clap::Parser;
use ow_capture::regions;
use ow_vision::{Detector, Frame, RegionMatcher, TemplateStore, DEFAULT_THRESHOLD};
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Score every HUD region of a screenshot against its template")]
struct Args {
    /// Screenshot to analyze (any resolution; rescaled to 1920x1080)
    screenshot: PathBuf,

    /// Directory holding t_<region>.png / m_<region>.png
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Threshold used for the present/count columns
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args = Args::parse();

    println!("Loading image: {}", args.screenshot.display());
    let img = image::open(&args.screenshot)
        .with_context(|| format!("Failed to open {}", args.screenshot.display()))?
        .to_rgba8();
    println!("Image size: {}x{}", img.width(), img.height());

    let store = TemplateStore::load(&args.data_dir, regions::ALL)?;
    let mut matcher = RegionMatcher::with_default_regions(store)?;
    matcher.set_frame(Frame::from_rgba(&img));

    println!("\n=== Region Scores (threshold {:.2}) ===", args.threshold);
    println!("{:<32} {:>7} {:>8} {:>6}", "region", "score", "present", "count");
    for spec in regions::ALL {
        let score = matcher.match_score(spec.name)?;
        let present = matcher.detect_present(spec.name, args.threshold, None)?;
        let count = matcher.detect_count(spec.name, args.threshold)?;
        println!(
            "{:<32} {:>7.3} {:>8} {:>6}",
            spec.name,
            score,
            if present { "yes" } else { "-" },
            count
        );
    }

    Ok(())
}
