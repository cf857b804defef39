use std::sync::Arc;

use anyhow::{Context, Result};
use winit::window::Window;

use super::frame::draw_fullscreen;
use super::pipeline::ProgramPipeline;
use super::program::{GraphicsContext, ShaderProgram, UniformTable};
use super::reflect::reflect;
use crate::error::{CompileError, ShaderStage};

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        pollster::block_on(Self::init_async(window))
    }

    async fn init_async(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::METAL | wgpu::Backends::VULKAN | wgpu::Backends::DX12,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("Failed to create window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to find a suitable GPU adapter")?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("rave_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    ..Default::default()
                },
                None,
            )
            .await
            .context("Failed to create GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("Surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            device,
            queue,
            surface,
            config,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }
}

pub struct WgpuProgram {
    pipeline: ProgramPipeline,
    table: UniformTable,
}

impl ShaderProgram for WgpuProgram {
    fn uniforms(&self) -> &UniformTable {
        &self.table
    }

    fn uniforms_mut(&mut self) -> &mut UniformTable {
        &mut self.table
    }
}

impl GraphicsContext for GpuContext {
    type Program = WgpuProgram;

    fn program(&self, vertex_src: &str, fragment_src: &str) -> Result<WgpuProgram, CompileError> {
        let reflection = reflect(vertex_src, fragment_src)?;

        // naga accepted both modules; what's left to fail is linking them
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = ProgramPipeline::new(
            &self.device,
            vertex_src,
            fragment_src,
            &reflection,
            self.config.format,
        );
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(CompileError::new(ShaderStage::Pipeline, err.to_string()));
        }

        Ok(WgpuProgram {
            pipeline,
            table: UniformTable::new(&reflection),
        })
    }

    fn draw(&self, program: &mut WgpuProgram) -> Result<()> {
        for index in program.table.take_dirty() {
            self.queue
                .write_buffer(&program.pipeline.buffers[index], 0, program.table.buffer(index));
        }

        let output = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(err) => return Err(err).context("Failed to acquire surface texture"),
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        draw_fullscreen(&self.device, &self.queue, &view, &program.pipeline);
        output.present();

        Ok(())
    }
}
