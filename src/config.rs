use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub device: Option<usize>,
    #[serde(default)]
    pub loopback: bool,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            loopback: false,
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            block_size: default_block_size(),
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "RAVE".into() }
fn default_sample_rate() -> u32 { 44100 }
fn default_channels() -> u16 { 2 }
fn default_block_size() -> u32 { 1024 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Option<Config> {
    toml::from_str(content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.title, "RAVE");
        assert_eq!(cfg.audio.device, None);
        assert_eq!(cfg.audio.block_size, 1024);
    }

    #[test]
    fn partial_sections() {
        let cfg = parse_config(
            r#"
[window]
title = "Club night"

[audio]
loopback = true
block_size = 2048
"#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "Club night");
        assert_eq!(cfg.window.height, 720);
        assert!(cfg.audio.loopback);
        assert_eq!(cfg.audio.block_size, 2048);
        assert_eq!(cfg.audio.sample_rate, 44100);
    }

    #[test]
    fn invalid_config_is_none() {
        assert!(parse_config("[window]\nwidth = \"wide\"").is_none());
        assert!(load_config(Path::new("/nonexistent/rave.toml")).is_none());
    }
}
