pub mod commands;
pub mod config;
pub mod error;
pub mod hotkey;
pub mod pipeline;
pub mod triggers;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::info;

use ow_capture::{regions, FrameSource, ReplaySource, ScreenCapture};
use ow_haptics::MemoryLink;
use ow_vision::{RegionMatcher, TemplateStore};

use commands::{Flow, Host, HostCommand};
use config::Config;
use pipeline::Pipeline;

#[derive(Debug, Parser)]
#[command(name = "overstim", about = "Turns what happens on screen into haptic feedback")]
pub struct Args {
    /// JSON settings file
    #[arg(long, default_value = "overstim.json")]
    pub config: PathBuf,

    /// Directory holding t_<region>.png / m_<region>.png
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Play back a screenshot (or a directory of them) instead of capturing the screen
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Number of simulated vibrators to drive. Output goes to in-memory
    /// devices only; no hardware is driven.
    #[arg(long, default_value_t = 1)]
    pub virtual_devices: u32,

    /// Start running as soon as the host is up
    #[arg(long)]
    pub autostart: bool,
}

fn build_pipeline(config: Config, args: &Args, estop: Arc<AtomicBool>) -> Result<Pipeline> {
    info!("Data directory: {}", args.data_dir.display());
    let store = TemplateStore::load(&args.data_dir, regions::ALL)
        .context("Failed to load templates")?;
    info!("Loaded {} templates", store.len());
    let matcher = RegionMatcher::with_default_regions(store)?;

    let source: Box<dyn FrameSource> = match &args.replay {
        Some(path) => Box::new(ReplaySource::open(path)?),
        None => Box::new(ScreenCapture::new()),
    };

    let link = Arc::new(MemoryLink::virtual_devices(args.virtual_devices));
    info!("Simulating {} device(s)", args.virtual_devices);

    Ok(Pipeline::new(config, Box::new(matcher), source, link, estop))
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "overstim=debug,ow_state=info,ow_haptics=info,ow_vision=info,ow_capture=info".into()
            }),
        )
        .init();

    let args = Args::parse();
    let estop = Arc::new(AtomicBool::new(false));

    let mut host = match Config::load(&args.config) {
        Ok(config) => {
            if let Some(combo) = config.key_combo() {
                hotkey::spawn_listener(combo, estop.clone());
            }
            Host::new(build_pipeline(config, &args, estop.clone())?, estop.clone())
        }
        Err(e) => Host::config_error(&e, estop.clone()),
    };

    let (tx, mut rx) = mpsc::channel(32);
    commands::spawn_stdin_reader(tx.clone());
    commands::spawn_ctrl_c(estop, tx);

    let clock = Instant::now();
    if args.autostart {
        host.handle(HostCommand::Start, 0.0).await;
    }

    let mut ticker = tokio::time::interval(host.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                let now = clock.elapsed().as_secs_f64();
                if host.handle(cmd, now).await == Flow::Quit {
                    break;
                }
            }
            _ = ticker.tick() => {
                host.tick(clock.elapsed().as_secs_f64()).await;
            }
        }
    }

    host.shutdown(clock.elapsed().as_secs_f64()).await;
    info!("Bye.");
    Ok(())
}
