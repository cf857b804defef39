use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage a shader diagnostic belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Pipeline,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
            ShaderStage::Pipeline => f.write_str("pipeline"),
        }
    }
}

/// Bad shader source. Expected during live coding and never fatal.
#[derive(Debug, Clone, Error)]
#[error("{stage} shader error: {message}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub message: String,
}

impl CompileError {
    pub fn new(stage: ShaderStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no loopback-capable audio device available")]
    DeviceUnavailable,
    #[error("invalid audio configuration: {0}")]
    Configuration(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("audio host error: {0}")]
    Host(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode project: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UniformError {
    #[error("unknown uniform '{0}'")]
    Unknown(String),
    #[error("uniform '{0}' is reserved by the engine")]
    Reserved(String),
    #[error("uniform '{name}' expects {expected}, got {actual}")]
    FormatMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("uniform '{name}' holds {expected} elements, got {actual}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid range for '{name}': min {min} > max {max}")]
    InvalidRange { name: String, min: f32, max: f32 },
}
