//! Hot reload of the fragment shader file.
//!
//! The notify callback only forwards a tick over a channel; the render
//! thread polls once per frame and reads the file after changes settle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Wait this long after the last change before reloading. Editors often
/// write a file in several steps.
const DEBOUNCE_MS: u64 = 150;

/// Trailing-edge debounce over event timestamps.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn event(&mut self, at: Instant) {
        self.pending = Some(at);
    }

    /// True once, when `delay` has passed since the last event.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(last) if now.saturating_duration_since(last) >= self.delay => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

pub struct ShaderWatcher {
    // kept alive for as long as we want events
    _watcher: RecommendedWatcher,
    path: PathBuf,
    events: Receiver<()>,
    debouncer: Debouncer,
}

impl ShaderWatcher {
    pub fn new(path: &Path) -> Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Shader file not found: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .context("Shader path has no file name")?;
        // watch the directory so editors that replace the file are still seen
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .context("Shader path has no parent directory")?;

        let (tx, rx) = channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    if event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => log::warn!("File watch error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        log::info!("Watching {}", path.display());

        Ok(Self {
            _watcher: watcher,
            path,
            events: rx,
            debouncer: Debouncer::new(Duration::from_millis(DEBOUNCE_MS)),
        })
    }

    /// New file contents once changes have settled, otherwise `None`.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        while self.events.try_recv().is_ok() {
            self.debouncer.event(now);
        }
        if !self.debouncer.ready(now) {
            return None;
        }

        match fs::read_to_string(&self.path) {
            Ok(source) => {
                log::info!("Shader file changed, reloading");
                Some(source)
            }
            Err(e) => {
                log::warn!("Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }
}
