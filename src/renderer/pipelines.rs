//! Render pipelines and bind group layouts for each pass

use log::debug;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, ColorTargetState, ColorWrites, CompareFunction,
    DepthStencilState, Device, FragmentState, MultisampleState, PrimitiveState, RenderPipeline,
    RenderPipelineDescriptor, ShaderStages, TextureSampleType, TextureViewDimension, VertexBufferLayout,
    VertexState,
};

use super::pool::{QuadVertex, COLOR_FORMAT, DEPTH_FORMAT};
use super::shaders::{ShaderKind, ShaderManager};
use crate::error::{MosaicError, MosaicResult};
use crate::geometry::MeshVertex;

/// A render pipeline plus the layout its bind groups are built against
pub struct Pass {
    pub pipeline: RenderPipeline,
    pub layout: BindGroupLayout,
    label: &'static str,
}

impl Pass {
    /// Bind `resources` to consecutive bindings starting at 0
    pub fn bind(&self, device: &Device, resources: Vec<BindingResource<'_>>) -> BindGroup {
        let entries: Vec<BindGroupEntry<'_>> = resources
            .into_iter()
            .enumerate()
            .map(|(i, resource)| BindGroupEntry {
                binding: i as u32,
                resource,
            })
            .collect();
        device.create_bind_group(&BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.layout,
            entries: &entries,
        })
    }
}

/// All pipelines, built once at startup
pub struct MosaicPipelines {
    pub unwrap: Pass,
    pub downsample: Pass,
    pub scramble: Pass,
    pub upsample: Pass,
    pub rewrap: Pass,
    pub composite: Pass,
    pub fallback: Pass,
}

fn uniform_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, filterable: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Uniform at binding 0 followed by `textures` unfiltered textures
fn blit_entries(textures: u32) -> Vec<BindGroupLayoutEntry> {
    std::iter::once(uniform_entry(0))
        .chain((1..=textures).map(|b| texture_entry(b, false)))
        .collect()
}

struct PassDesc<'a> {
    label: &'static str,
    shader: ShaderKind,
    entries: Vec<BindGroupLayoutEntry>,
    vertex_layout: VertexBufferLayout<'a>,
    depth: bool,
}

impl MosaicPipelines {
    pub fn new(device: &Device, shaders: &ShaderManager) -> MosaicResult<Self> {
        debug!("🔧 Creating mosaic render pipelines...");
        let mesh = MeshVertex::layout;
        let quad = QuadVertex::layout;

        let pipelines = Self {
            unwrap: build(
                device,
                shaders,
                PassDesc {
                    label: "Unwrap",
                    shader: ShaderKind::Unwrap,
                    entries: vec![texture_entry(0, true), sampler_entry(1)],
                    vertex_layout: mesh(),
                    depth: false,
                },
            )?,
            downsample: build(
                device,
                shaders,
                PassDesc {
                    label: "Downsample",
                    shader: ShaderKind::Downsample,
                    entries: blit_entries(1),
                    vertex_layout: quad(),
                    depth: false,
                },
            )?,
            scramble: build(
                device,
                shaders,
                PassDesc {
                    label: "Scramble",
                    shader: ShaderKind::Scramble,
                    entries: blit_entries(2),
                    vertex_layout: quad(),
                    depth: false,
                },
            )?,
            upsample: build(
                device,
                shaders,
                PassDesc {
                    label: "Upsample",
                    shader: ShaderKind::Upsample,
                    entries: blit_entries(1),
                    vertex_layout: quad(),
                    depth: false,
                },
            )?,
            rewrap: build(
                device,
                shaders,
                PassDesc {
                    label: "Rewrap",
                    shader: ShaderKind::Rewrap,
                    entries: blit_entries(1),
                    vertex_layout: mesh(),
                    depth: true,
                },
            )?,
            composite: build(
                device,
                shaders,
                PassDesc {
                    label: "Composite",
                    shader: ShaderKind::Composite,
                    entries: blit_entries(2),
                    vertex_layout: quad(),
                    depth: false,
                },
            )?,
            fallback: build(
                device,
                shaders,
                PassDesc {
                    label: "Fallback",
                    shader: ShaderKind::Fallback,
                    entries: blit_entries(2),
                    vertex_layout: quad(),
                    depth: false,
                },
            )?,
        };

        debug!("✅ Mosaic pipelines created");
        Ok(pipelines)
    }
}

fn build(device: &Device, shaders: &ShaderManager, desc: PassDesc<'_>) -> MosaicResult<Pass> {
    let module = shaders.get_shader(desc.shader)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(desc.label),
        entries: &desc.entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(desc.label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module,
            entry_point: "vs_main",
            buffers: &[desc.vertex_layout],
        },
        fragment: Some(FragmentState {
            module,
            entry_point: "fs_main",
            targets: &[Some(ColorTargetState {
                format: COLOR_FORMAT,
                // Rewrap writes an opaque face layer; the composite pass blends it over the video
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState {
            cull_mode: None,
            ..PrimitiveState::default()
        },
        depth_stencil: desc.depth.then(|| DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: MultisampleState::default(),
        multiview: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(MosaicError::ShaderCompilation {
            shader: desc.label.to_string(),
            message: error.to_string(),
        });
    }

    Ok(Pass {
        pipeline,
        layout,
        label: desc.label,
    })
}
