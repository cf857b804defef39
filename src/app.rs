use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::audio::capture::{AudioCaptureSource, CaptureConfig};
use crate::cli::UniformOverride;
use crate::error::CompileError;
use crate::project::{load_project, save_project, with_project_extension, Project};
use crate::render::gpu::GpuContext;
use crate::render::program::GraphicsContext;
use crate::render::viewer::{FrameInputs, ShaderViewer};
use crate::uniforms::UniformValue;
use crate::watcher::ShaderWatcher;

/// Everything that can change the session. Queued from input handlers and
/// applied at the start of the next frame.
#[derive(Clone, Debug, PartialEq)]
pub enum AppCommand {
    /// New fragment shader source
    ScriptChanged(String),
    SetUniform { name: String, value: UniformValue },
    SetRange { name: String, min: f32, max: f32 },
    ApplyAudioConfig(CaptureConfig),
    NewProject,
    LoadProject(PathBuf),
    SaveProject(PathBuf),
}

/// Project, viewer and audio state, independent of the window.
pub struct Session<C: GraphicsContext> {
    project: Project,
    project_path: Option<PathBuf>,
    viewer: ShaderViewer<C>,
    audio: AudioCaptureSource,
    commands: VecDeque<AppCommand>,
    last_error: Option<CompileError>,
    started: Instant,
    last_frame: Option<Instant>,
    /// Set when New or Load swaps the project out
    replaced: bool,
}

impl<C: GraphicsContext> Session<C> {
    pub fn new(project: Project, project_path: Option<PathBuf>) -> Self {
        Self {
            project,
            project_path,
            viewer: ShaderViewer::new(),
            audio: AudioCaptureSource::new(),
            commands: VecDeque::new(),
            last_error: None,
            started: Instant::now(),
            last_frame: None,
            replaced: false,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_path(&self) -> Option<&PathBuf> {
        self.project_path.as_ref()
    }

    pub fn last_error(&self) -> Option<&CompileError> {
        self.last_error.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.viewer.is_ready()
    }

    pub fn audio_config(&self) -> Option<&CaptureConfig> {
        self.audio.config()
    }

    /// True once after the project has been replaced by New or Load.
    pub fn take_project_replaced(&mut self) -> bool {
        std::mem::take(&mut self.replaced)
    }

    pub fn push(&mut self, command: AppCommand) {
        self.commands.push_back(command);
    }

    pub fn pending(&self) -> usize {
        self.commands.len()
    }

    /// Compile the project's shaders. On success the uniform fields are
    /// reconciled with the new program; on failure they are left alone.
    pub fn recompile(&mut self, ctx: &C) -> bool {
        let result = self.viewer.compile(
            ctx,
            &self.project.vertex_shader_source,
            &self.project.fragment_shader_source,
        );
        match result {
            Ok(reflected) => {
                self.project.uniform_fields.apply_reflection(&reflected);
                self.last_error = None;
                true
            }
            Err(err) => {
                self.last_error = Some(err);
                false
            }
        }
    }

    /// Turn `--set` arguments into commands, using each field's declared
    /// format. Unknown names and wrong component counts are reported and
    /// dropped.
    pub fn queue_overrides(&mut self, overrides: &[UniformOverride]) {
        for o in overrides {
            let Some(field) = self.project.uniform_fields.get(&o.name) else {
                log::warn!("--set {}: no such uniform in the current shader", o.name);
                continue;
            };
            match UniformValue::from_components(field.format, &o.components) {
                Some(value) => self.push(AppCommand::SetUniform {
                    name: o.name.clone(),
                    value,
                }),
                None => log::warn!(
                    "--set {}: expected {} component(s) for {}, got {}",
                    o.name,
                    field.format.components(),
                    field.format,
                    o.components.len()
                ),
            }
        }
    }

    pub fn process_commands(&mut self, ctx: &C) {
        while let Some(command) = self.commands.pop_front() {
            self.apply(ctx, command);
        }
    }

    fn apply(&mut self, ctx: &C, command: AppCommand) {
        match command {
            AppCommand::ScriptChanged(source) => {
                self.project.fragment_shader_source = source;
                self.recompile(ctx);
            }
            AppCommand::SetUniform { name, value } => {
                if let Err(e) = self.project.uniform_fields.set_value(&name, value) {
                    log::warn!("{}", e);
                }
            }
            AppCommand::SetRange { name, min, max } => {
                if let Err(e) = self.project.uniform_fields.set_range(&name, min, max) {
                    log::warn!("{}", e);
                }
            }
            AppCommand::ApplyAudioConfig(config) => {
                if let Err(e) = self.audio.start(config) {
                    log::error!("Audio capture not started: {}", e);
                }
            }
            AppCommand::NewProject => {
                self.project = Project::default();
                self.project_path = None;
                self.replaced = true;
                log::info!("New project");
                self.recompile(ctx);
            }
            AppCommand::LoadProject(path) => {
                // a failed load keeps the current project
                if let Some(project) = load_project(&path) {
                    self.project = project;
                    self.project_path = Some(path);
                    self.replaced = true;
                    self.recompile(ctx);
                }
            }
            AppCommand::SaveProject(path) => match save_project(&path, &self.project) {
                Ok(()) => self.project_path = Some(with_project_extension(&path)),
                Err(e) => log::error!("{}", e),
            },
        }
    }

    /// Apply queued commands, then render one frame.
    pub fn frame(&mut self, ctx: &C, now: Instant) -> Result<bool> {
        self.process_commands(ctx);

        let frametime = self
            .last_frame
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32());
        self.last_frame = Some(now);

        let analysis = self.audio.snapshot();
        let inputs = FrameInputs {
            time: now.saturating_duration_since(self.started).as_secs_f32(),
            frametime,
            analysis: &analysis,
        };
        self.viewer
            .render(ctx, &inputs, self.project.uniform_fields.fields())
    }

    /// Where Ctrl+S writes: the project's own path, else a name derived
    /// from the project in the working directory.
    pub fn save_path(&self) -> PathBuf {
        self.project_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.project.default_file_name()))
    }

    pub fn shutdown(&mut self) {
        self.audio.close();
    }
}

pub struct App {
    title: String,
    width: u32,
    height: u32,
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    session: Session<GpuContext>,
    fragment_path: Option<PathBuf>,
    watcher: Option<ShaderWatcher>,
    overrides: Vec<UniformOverride>,
    modifiers: ModifiersState,
    shown_title: String,
}

impl App {
    pub fn new(
        title: String,
        width: u32,
        height: u32,
        session: Session<GpuContext>,
        fragment_path: Option<PathBuf>,
        overrides: Vec<UniformOverride>,
    ) -> Self {
        Self {
            title,
            width,
            height,
            window: None,
            gpu: None,
            session,
            fragment_path,
            watcher: None,
            overrides,
            modifiers: ModifiersState::empty(),
            shown_title: String::new(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(self.width, self.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        log::info!("Initializing GPU...");
        let gpu = GpuContext::new(Arc::clone(&window))?;

        // commands queued before the window existed (audio config) run first
        self.session.process_commands(&gpu);
        self.session.recompile(&gpu);
        let overrides = std::mem::take(&mut self.overrides);
        self.session.queue_overrides(&overrides);

        if let Some(ref path) = self.fragment_path {
            match ShaderWatcher::new(path) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => log::warn!("Hot reload disabled: {:#}", e),
            }
        }

        log::info!(
            "Esc quit | F5 recompile | F11 fullscreen | Ctrl+S save | Ctrl+N new | Ctrl+O reload"
        );

        self.window = Some(window);
        self.gpu = Some(gpu);
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        let command_key = self.modifiers.control_key() || self.modifiers.super_key();

        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::F5 => {
                let source = self.session.project().fragment_shader_source.clone();
                self.session.push(AppCommand::ScriptChanged(source));
            }
            KeyCode::F11 => {
                if let Some(ref window) = self.window {
                    let fullscreen = match window.fullscreen() {
                        Some(_) => None,
                        None => Some(Fullscreen::Borderless(None)),
                    };
                    window.set_fullscreen(fullscreen);
                }
            }
            KeyCode::KeyS if command_key => {
                let path = self.session.save_path();
                self.session.push(AppCommand::SaveProject(path));
            }
            KeyCode::KeyN if command_key => self.session.push(AppCommand::NewProject),
            KeyCode::KeyO if command_key => match self.session.project_path() {
                Some(path) => {
                    let path = path.clone();
                    self.session.push(AppCommand::LoadProject(path));
                }
                None => log::warn!("Project has not been saved yet, nothing to reload"),
            },
            _ => {}
        }
    }

    fn redraw(&mut self) {
        if let Some(ref mut watcher) = self.watcher {
            if let Some(source) = watcher.poll(Instant::now()) {
                self.session.push(AppCommand::ScriptChanged(source));
            }
        }

        let Some(ref gpu) = self.gpu else {
            return;
        };
        if let Err(e) = self.session.frame(gpu, Instant::now()) {
            log::error!("Render error: {:#}", e);
        }

        // the watched file belongs to the project that was just replaced
        if self.session.take_project_replaced() && self.watcher.take().is_some() {
            log::info!("Hot reload stopped for the previous project");
            self.fragment_path = None;
        }

        self.update_title();
    }

    fn update_title(&mut self) {
        let mut status = match self.session.last_error() {
            Some(err) => format!(" [{} shader error]", err.stage),
            None if !self.session.is_ready() => " [no program]".to_string(),
            None => String::new(),
        };
        if self.session.audio_config().is_none() {
            status.push_str(" [no audio]");
        }
        let title = format!("{} - {}{}", self.title, self.session.project().name, status);
        if title != self.shown_title {
            if let Some(ref window) = self.window {
                window.set_title(&title);
            }
            self.shown_title = title;
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            log::error!("Startup failed: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, code),
            WindowEvent::Resized(size) => {
                if let Some(ref mut gpu) = self.gpu {
                    gpu.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.session.shutdown();
        log::info!("Goodbye");
    }
}
