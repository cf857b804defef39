use wgpu;

use super::program::padded_size;
use super::reflect::{BufferKind, ShaderReflection};

/// GPU objects backing one compiled vertex/fragment pair. `buffers` is
/// indexed like [`ShaderReflection::bindings`].
pub struct ProgramPipeline {
    pub pipeline: wgpu::RenderPipeline,
    /// One per group `0..=max_group`; gaps get an empty group
    pub bind_groups: Vec<wgpu::BindGroup>,
    pub buffers: Vec<wgpu::Buffer>,
}

impl ProgramPipeline {
    pub fn new(
        device: &wgpu::Device,
        vertex_src: &str,
        fragment_src: &str,
        reflection: &ShaderReflection,
        texture_format: wgpu::TextureFormat,
    ) -> Self {
        let vertex_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("vertex_shader"),
            source: wgpu::ShaderSource::Wgsl(vertex_src.into()),
        });
        let fragment_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fragment_shader"),
            source: wgpu::ShaderSource::Wgsl(fragment_src.into()),
        });

        let buffers: Vec<wgpu::Buffer> = reflection
            .bindings
            .iter()
            .map(|binding| {
                let usage = match binding.kind {
                    BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
                    BufferKind::Storage => wgpu::BufferUsages::STORAGE,
                };
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(binding.name.as_str()),
                    size: padded_size(binding.size),
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let group_count = reflection.max_group().map_or(0, |g| g + 1);
        let mut layouts = Vec::with_capacity(group_count as usize);
        let mut bind_groups = Vec::with_capacity(group_count as usize);

        for group in 0..group_count {
            let members: Vec<usize> = reflection
                .bindings
                .iter()
                .enumerate()
                .filter(|(_, b)| b.group == group)
                .map(|(i, _)| i)
                .collect();

            let entries: Vec<wgpu::BindGroupLayoutEntry> = members
                .iter()
                .map(|&i| {
                    let binding = &reflection.bindings[i];
                    let ty = match binding.kind {
                        BufferKind::Uniform => wgpu::BufferBindingType::Uniform,
                        BufferKind::Storage => wgpu::BufferBindingType::Storage { read_only: true },
                    };
                    wgpu::BindGroupLayoutEntry {
                        binding: binding.binding,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }
                })
                .collect();

            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("program_bind_group_layout"),
                entries: &entries,
            });

            let bind_entries: Vec<wgpu::BindGroupEntry> = members
                .iter()
                .map(|&i| wgpu::BindGroupEntry {
                    binding: reflection.bindings[i].binding,
                    resource: buffers[i].as_entire_binding(),
                })
                .collect();

            bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("program_bind_group"),
                layout: &layout,
                entries: &bind_entries,
            }));
            layouts.push(layout);
        }

        let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program_pipeline_layout"),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("program_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_shader,
                entry_point: Some(reflection.vertex_entry.as_str()),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_shader,
                entry_point: Some(reflection.fragment_entry.as_str()),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_groups,
            buffers,
        }
    }
}
