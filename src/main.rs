mod app;
mod audio;
mod cli;
mod config;
mod error;
mod project;
mod render;
mod uniforms;
mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use winit::event_loop::EventLoop;

use app::{App, AppCommand, Session};
use audio::capture::{self, CaptureConfig};
use cli::Cli;
use project::{load_project, Project};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect rave.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("rave.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("rave").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("rave").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let mut title = "RAVE".to_string();
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.width == 1280 { cli.width = cfg.window.width; }
            if cli.height == 720 { cli.height = cfg.window.height; }
            if cli.sample_rate == 44100 { cli.sample_rate = cfg.audio.sample_rate; }
            if cli.channels == 2 { cli.channels = cfg.audio.channels; }
            if cli.block_size == 1024 { cli.block_size = cfg.audio.block_size; }
            if cli.device.is_none() { cli.device = cfg.audio.device; }
            if !cli.loopback { cli.loopback = cfg.audio.loopback; }
            title = cfg.window.title;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    // List devices mode
    if cli.list_devices {
        let devices = capture::list_devices()?;
        let loopback = capture::find_loopback(&devices);
        println!("Audio input devices:");
        for (i, name) in devices.iter().enumerate() {
            let marker = if Some(i) == loopback { "  (loopback)" } else { "" };
            println!("  [{}] {}{}", i, name, marker);
        }
        return Ok(());
    }

    log::info!("rave - live shader visualizer");

    let (mut project, project_path) = match cli.project {
        Some(ref path) => match load_project(path) {
            Some(project) => (project, Some(path.clone())),
            None => {
                log::warn!("Starting with a new project instead");
                (Project::default(), None)
            }
        },
        None => (Project::default(), None),
    };

    if let Some(ref path) = cli.fragment {
        project.fragment_shader_source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fragment shader {}", path.display()))?;
        log::info!("Fragment shader: {}", path.display());
    }

    let mut session = Session::new(project, project_path);
    if let Some(config) = resolve_audio(&cli) {
        session.push(AppCommand::ApplyAudioConfig(config));
    }

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(
        title,
        cli.width,
        cli.height,
        session,
        cli.fragment.clone(),
        cli.overrides.clone(),
    );
    event_loop.run_app(&mut app).context("Event loop error")?;

    Ok(())
}

/// Pick the capture device from the CLI. `None` means run silent.
fn resolve_audio(cli: &Cli) -> Option<CaptureConfig> {
    if cli.no_audio {
        log::info!("Audio capture disabled");
        return None;
    }

    let device = match (cli.device, cli.loopback) {
        (Some(index), _) => index,
        (None, true) => match capture::default_loopback_device() {
            Ok(index) => index,
            Err(e) => {
                log::warn!("{}; falling back to the first input device", e);
                0
            }
        },
        (None, false) => 0,
    };

    Some(CaptureConfig {
        device,
        sample_rate: cli.sample_rate,
        channels: cli.channels,
        block_size: cli.block_size,
    })
}
