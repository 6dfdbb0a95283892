use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ow_data::HeroId;

use crate::error::ConfigError;
use crate::pipeline::{Pipeline, ProgramStatus};

/// Something the user asked the host to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Start,
    Stop,
    EmergencyStop,
    Hero(HeroId),
    Auto(bool),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown hero: {0}")]
    UnknownHero(String),
}

impl FromStr for HostCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandParseError::Empty);
        };
        let rest: Vec<&str> = words.collect();

        let cmd = match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("start", []) => HostCommand::Start,
            ("stop", []) => HostCommand::Stop,
            ("estop", []) => HostCommand::EmergencyStop,
            ("status", []) => HostCommand::Status,
            ("quit" | "exit", []) => HostCommand::Quit,
            ("hero", [name]) => HostCommand::Hero(
                name.parse()
                    .map_err(|_| CommandParseError::UnknownHero(name.to_string()))?,
            ),
            ("hero", _) => return Err(CommandParseError::Usage("hero <name>")),
            ("auto", [flag]) => match flag.to_ascii_lowercase().as_str() {
                "on" => HostCommand::Auto(true),
                "off" => HostCommand::Auto(false),
                _ => return Err(CommandParseError::Usage("auto on|off")),
            },
            ("auto", _) => return Err(CommandParseError::Usage("auto on|off")),
            ("start" | "stop" | "estop" | "status" | "quit" | "exit", _) => {
                return Err(CommandParseError::Usage("command takes no arguments"))
            }
            _ => return Err(CommandParseError::Unknown(verb.to_string())),
        };
        Ok(cmd)
    }
}

/// What the host shows on `status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub device_count: usize,
    pub current_intensity: f64,
    pub applied_intensity: f64,
    pub status: ProgramStatus,
    pub hero: HeroId,
    pub auto_detect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Routes host commands to the pipeline.
///
/// Without a pipeline (bad config) only `status` and `quit` do anything.
pub struct Host {
    pipeline: Option<Pipeline>,
    estop: Arc<AtomicBool>,
}

impl Host {
    pub fn new(pipeline: Pipeline, estop: Arc<AtomicBool>) -> Self {
        Self {
            pipeline: Some(pipeline),
            estop,
        }
    }

    pub fn config_error(err: &ConfigError, estop: Arc<AtomicBool>) -> Self {
        error!("Config error: {}", err);
        Self {
            pipeline: None,
            estop,
        }
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    pub fn tick_interval(&self) -> Duration {
        self.pipeline
            .as_ref()
            .map_or(Duration::from_secs(1), Pipeline::tick_interval)
    }

    pub fn status(&self) -> StatusSnapshot {
        match &self.pipeline {
            Some(p) => StatusSnapshot {
                device_count: p.device_count(),
                current_intensity: p.manager().current_intensity(),
                applied_intensity: p.manager().applied_intensity(),
                status: p.status(),
                hero: p.tracker().hero().id(),
                auto_detect: p.tracker().hero_auto_detect(),
            },
            None => StatusSnapshot {
                device_count: 0,
                current_intensity: 0.0,
                applied_intensity: 0.0,
                status: ProgramStatus::ConfigError,
                hero: HeroId::Other,
                auto_detect: false,
            },
        }
    }

    pub async fn tick(&mut self, now: f64) {
        if let Some(p) = self.pipeline.as_mut() {
            p.tick(now).await;
        }
    }

    pub async fn handle(&mut self, cmd: HostCommand, now: f64) -> Flow {
        match cmd {
            HostCommand::Quit => return Flow::Quit,
            HostCommand::Status => {
                match serde_json::to_string(&self.status()) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Failed to encode status: {}", e),
                }
                return Flow::Continue;
            }
            _ => {}
        }

        let Some(p) = self.pipeline.as_mut() else {
            warn!("Fix the config and restart; only 'status' and 'quit' are available");
            return Flow::Continue;
        };

        match cmd {
            HostCommand::Start => {
                if let Err(e) = p.start() {
                    warn!("Cannot start: {}", e);
                }
            }
            HostCommand::Stop => {
                if let Err(e) = p.stop(now).await {
                    warn!("Stop incomplete: {}", e);
                }
            }
            HostCommand::EmergencyStop => {
                self.estop.store(true, Ordering::SeqCst);
            }
            HostCommand::Hero(hero) => p.select_hero(hero),
            HostCommand::Auto(enabled) => {
                p.set_auto_detect(enabled);
                info!("Hero auto-detect {}", if enabled { "on" } else { "off" });
            }
            HostCommand::Status | HostCommand::Quit => {}
        }
        Flow::Continue
    }

    /// Leave every device stopped before exiting
    pub async fn shutdown(&mut self, now: f64) {
        if let Some(p) = self.pipeline.as_mut() {
            if let Err(e) = p.stop(now).await {
                warn!("Failed to stop devices on exit: {}", e);
            }
        }
    }
}

/// Forward stdin lines as commands until stdin closes
pub fn spawn_stdin_reader(tx: mpsc::Sender<HostCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match line.parse::<HostCommand>() {
                    Ok(cmd) => {
                        if tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{}", e),
                },
                Ok(None) => {
                    info!("stdin closed; Ctrl-C to stop, twice to quit");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    })
}

/// First Ctrl-C raises the emergency stop, the next one quits
pub fn spawn_ctrl_c(estop: Arc<AtomicBool>, tx: mpsc::Sender<HostCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pressed = false;
        while tokio::signal::ctrl_c().await.is_ok() {
            if pressed {
                let _ = tx.send(HostCommand::Quit).await;
                break;
            }
            pressed = true;
            warn!("Emergency stop requested (Ctrl-C again to quit)");
            estop.store(true, Ordering::SeqCst);
        }
    })
}
