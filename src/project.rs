use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::uniforms::UniformRegistry;

pub const PROJECT_EXTENSION: &str = "raveproj";

pub const DEFAULT_VERTEX_SHADER: &str = include_str!("../shaders/default_vertex.wgsl");
pub const DEFAULT_FRAGMENT_SHADER: &str = include_str!("../shaders/default_fragment.wgsl");

/// Everything needed to restore a session: both shader sources plus the
/// user's uniform values and slider ranges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub author: String,
    pub description: String,
    pub vertex_shader_source: String,
    pub fragment_shader_source: String,
    pub uniform_fields: UniformRegistry,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            author: "Anonymous".to_string(),
            description: String::new(),
            vertex_shader_source: DEFAULT_VERTEX_SHADER.to_string(),
            fragment_shader_source: DEFAULT_FRAGMENT_SHADER.to_string(),
            uniform_fields: UniformRegistry::default(),
        }
    }
}

impl Project {
    /// Suggested file name, e.g. "Untitled by Anonymous.raveproj".
    pub fn default_file_name(&self) -> String {
        format!("{} by {}.{}", self.name, self.author, PROJECT_EXTENSION)
    }
}

/// Append `.raveproj` unless the path already carries it.
pub fn with_project_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == PROJECT_EXTENSION => path.to_path_buf(),
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".");
            name.push(PROJECT_EXTENSION);
            PathBuf::from(name)
        }
    }
}

/// Load a project file. Any failure is logged and yields `None`.
pub fn load_project(path: &Path) -> Option<Project> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Failed to read project {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Project>(&content) {
        Ok(mut project) => {
            // files edited by hand may list engine uniforms
            project.uniform_fields = UniformRegistry::new(project.uniform_fields.fields().to_vec());
            log::info!("Loaded project '{}' from {}", project.name, path.display());
            Some(project)
        }
        Err(e) => {
            log::warn!("Failed to parse project {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save_project(path: &Path, project: &Project) -> Result<(), PersistenceError> {
    let path = with_project_extension(path);
    let json = serde_json::to_string_pretty(project)?;

    fs::write(&path, json).map_err(|source| PersistenceError::Io {
        path: path.clone(),
        source,
    })?;

    log::info!("Saved project '{}' to {}", project.name, path.display());
    Ok(())
}
