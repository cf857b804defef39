use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rave", about = "Live-coding shader visualizer driven by audio input")]
pub struct Cli {
    /// Project file to open (.raveproj)
    pub project: Option<PathBuf>,

    /// WGSL fragment shader to watch and hot-reload
    #[arg(short, long)]
    pub fragment: Option<PathBuf>,

    /// Config file (defaults to rave.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List audio input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Audio input device index (see --list-devices)
    #[arg(short, long)]
    pub device: Option<usize>,

    /// Capture system output through a loopback device
    #[arg(long)]
    pub loopback: bool,

    /// Run without audio capture
    #[arg(long)]
    pub no_audio: bool,

    /// Capture sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Capture channel count
    #[arg(long, default_value_t = 2)]
    pub channels: u16,

    /// Frames per audio block; the spectrum has block_size / 2 bins
    #[arg(long, default_value_t = 1024)]
    pub block_size: u32,

    /// Window width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Set a uniform after the first compile: name=value[,value..]
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_override)]
    pub overrides: Vec<UniformOverride>,
}

/// A `--set` argument. Components are matched against the uniform's
/// declared format once the shader is compiled.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformOverride {
    pub name: String,
    pub components: Vec<f32>,
}

fn parse_override(arg: &str) -> Result<UniformOverride, String> {
    let (name, values) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("uniform name is empty".to_string());
    }

    let components = values
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|_| format!("'{}' is not a number", v.trim()))
        })
        .collect::<Result<Vec<f32>, String>>()?;

    Ok(UniformOverride {
        name: name.to_string(),
        components,
    })
}
