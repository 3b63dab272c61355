//! GPU rendering backend
//!
//! Runs the mosaic frame as a chain of wgpu render passes over targets owned
//! by [`pool::GpuResourcePool`]. Works without a window: the composited frame
//! is read back into a CPU [`Frame`] through [`capture::FrameCapture`].

pub mod capture;
pub mod pipelines;
pub mod pool;
pub mod shaders;

use log::{debug, info, trace};
use std::sync::Arc;
use wgpu::{BindingResource, CommandEncoder, Device, Queue, RenderPassColorAttachment, TextureView};

use crate::canonical::CanonicalMap;
use crate::config::MosaicConfig;
use crate::error::{MosaicError, MosaicResult};
use crate::frame::Frame;
use crate::landmarks::FaceBox;
use crate::pipeline::{MeshDraw, MosaicBackend};

use capture::FrameCapture;
use pipelines::{MosaicPipelines, Pass};
use pool::{GpuResourcePool, RegionUniforms};
use shaders::ShaderManager;

/// wgpu implementation of [`MosaicBackend`]
pub struct GpuMosaicRenderer {
    device: Arc<Device>,
    queue: Arc<Queue>,
    pipelines: MosaicPipelines,
    pool: GpuResourcePool,
    capture: FrameCapture,
    fallback_tiles: (u32, u32),
    adapter_name: String,
}

impl GpuMosaicRenderer {
    /// Create a headless renderer on the best available adapter
    pub async fn new(config: &MosaicConfig, map: &CanonicalMap) -> MosaicResult<Self> {
        Self::new_with_backends(config, map, wgpu::Backends::all()).await
    }

    pub async fn new_with_backends(
        config: &MosaicConfig,
        map: &CanonicalMap,
        backends: wgpu::Backends,
    ) -> MosaicResult<Self> {
        info!("🎨 Creating headless GPU renderer (backends={:?})", backends);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(MosaicError::NoAdapter)?;
        let adapter_name = adapter.get_info().name;
        info!("🖥️ Using GPU: {}", adapter_name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Mosaic Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;

        Self::from_device(Arc::new(device), Arc::new(queue), config, map, adapter_name)
    }

    /// Blocking wrapper around [`Self::new`]
    pub fn new_blocking(config: &MosaicConfig, map: &CanonicalMap) -> MosaicResult<Self> {
        pollster::block_on(Self::new(config, map))
    }

    /// Build every shader, pipeline and fixed-size target on an existing device
    pub fn from_device(
        device: Arc<Device>,
        queue: Arc<Queue>,
        config: &MosaicConfig,
        map: &CanonicalMap,
        adapter_name: String,
    ) -> MosaicResult<Self> {
        let mut shaders = ShaderManager::new(device.clone());
        shaders.compile_all_shaders()?;
        let pipelines = MosaicPipelines::new(&device, &shaders)?;
        let pool = GpuResourcePool::new(device.clone(), queue.clone(), config, map.triangles().len())?;
        let capture = FrameCapture::new(device.clone(), queue.clone());

        info!("✅ GPU renderer initialized successfully");
        Ok(Self {
            device,
            queue,
            pipelines,
            pool,
            capture,
            fallback_tiles: (config.fallback.tiles_u, config.fallback.tiles_v),
            adapter_name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn prepare_video(&mut self, video: &Frame) -> MosaicResult<()> {
        let (width, height) = video.size();
        self.pool.ensure_screen_targets(width, height)?;
        self.pool.upload_video(video.as_bytes(), width, height);
        Ok(())
    }

    fn finish(&mut self, encoder: CommandEncoder, target: &mut Frame) -> MosaicResult<()> {
        self.queue.submit(Some(encoder.finish()));
        let screen = self.pool.screen()?;
        self.capture.capture_into(&screen.output.texture, target)
    }
}

/// One full-screen quad draw into `view`
fn blit(encoder: &mut CommandEncoder, label: &str, pass: &Pass, bind_group: &wgpu::BindGroup, quad: &wgpu::Buffer, view: &TextureView) {
    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(color_attachment(view, wgpu::Color::TRANSPARENT))],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    rpass.set_pipeline(&pass.pipeline);
    rpass.set_bind_group(0, bind_group, &[]);
    rpass.set_vertex_buffer(0, quad.slice(..));
    rpass.draw(0..6, 0..1);
}

fn color_attachment(view: &TextureView, clear: wgpu::Color) -> RenderPassColorAttachment<'_> {
    RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        },
    }
}

impl MosaicBackend for GpuMosaicRenderer {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn draw_mesh(&mut self, video: &Frame, mesh: &MeshDraw<'_>, target: &mut Frame) -> MosaicResult<()> {
        self.prepare_video(video)?;
        let vertex_count = self
            .pool
            .upload_mesh(&mesh.geometry.unwrap, &mesh.geometry.rewrap);
        self.pool.upload_scramble(mesh.scramble);
        self.pool.set_brightness(mesh.brightness);

        let device = &self.device;
        let pool = &self.pool;
        let screen = pool.screen()?;
        let p = &self.pipelines;

        let unwrap_bind = p.unwrap.bind(
            device,
            vec![
                BindingResource::TextureView(&screen.video.view),
                BindingResource::Sampler(&pool.linear_sampler),
            ],
        );
        let downsample_bind = p.downsample.bind(
            device,
            vec![
                pool.canonical_region.as_entire_binding(),
                BindingResource::TextureView(&pool.canonical.view),
            ],
        );
        let scramble_bind = p.scramble.bind(
            device,
            vec![
                pool.green_gain.as_entire_binding(),
                BindingResource::TextureView(&pool.tiles.view),
                BindingResource::TextureView(&pool.lookup.view),
            ],
        );
        let upsample_bind = p.upsample.bind(
            device,
            vec![
                pool.grid.as_entire_binding(),
                BindingResource::TextureView(&pool.scrambled.view),
            ],
        );
        let rewrap_bind = p.rewrap.bind(
            device,
            vec![
                pool.grid.as_entire_binding(),
                BindingResource::TextureView(&pool.pixelated.view),
            ],
        );
        let composite_bind = p.composite.bind(
            device,
            vec![
                pool.brightness.as_entire_binding(),
                BindingResource::TextureView(&screen.video.view),
                BindingResource::TextureView(&screen.face_layer.view),
            ],
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Mosaic Frame Encoder"),
        });

        // Pass A
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Unwrap Pass"),
                color_attachments: &[Some(color_attachment(&pool.canonical.view, wgpu::Color::TRANSPARENT))],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if vertex_count > 0 {
                rpass.set_pipeline(&p.unwrap.pipeline);
                rpass.set_bind_group(0, &unwrap_bind, &[]);
                rpass.set_vertex_buffer(0, pool.unwrap_vertices.slice(..));
                rpass.draw(0..vertex_count, 0..1);
            }
        }

        blit(&mut encoder, "Downsample Pass", &p.downsample, &downsample_bind, &pool.quad_buffer, &pool.tiles.view);
        blit(&mut encoder, "Scramble Pass", &p.scramble, &scramble_bind, &pool.quad_buffer, &pool.scrambled.view);
        blit(&mut encoder, "Upsample Pass", &p.upsample, &upsample_bind, &pool.quad_buffer, &pool.pixelated.view);

        // Pass B
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Rewrap Pass"),
                color_attachments: &[Some(color_attachment(&screen.face_layer.view, wgpu::Color::TRANSPARENT))],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &screen.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if vertex_count > 0 {
                rpass.set_pipeline(&p.rewrap.pipeline);
                rpass.set_bind_group(0, &rewrap_bind, &[]);
                rpass.set_vertex_buffer(0, pool.rewrap_vertices.slice(..));
                rpass.draw(0..vertex_count, 0..1);
            }
        }

        blit(&mut encoder, "Composite Pass", &p.composite, &composite_bind, &pool.quad_buffer, &screen.output.view);

        trace!(
            "GPU mesh frame: {} vertices, brightness {:.2}",
            vertex_count,
            mesh.brightness
        );
        self.finish(encoder, target)
    }

    fn draw_fallback(&mut self, video: &Frame, face: FaceBox, target: &mut Frame) -> MosaicResult<()> {
        self.prepare_video(video)?;

        let (width, height) = video.size();
        let Some(rect) = face.pixel_rect(width, height) else {
            debug!("Fallback box is empty after clamping; passing the frame through");
            target.pixels_mut().copy_from_slice(video.pixels());
            return Ok(());
        };
        let (x0, y0) = (rect.x0, rect.y0);
        let (bw, bh) = (rect.width(), rect.height());
        let (tiles_u, tiles_v) = rect.tile_grid(self.fallback_tiles.0, self.fallback_tiles.1);
        self.pool.set_fallback_region(RegionUniforms {
            origin: [x0, y0],
            size: [bw, bh],
            tiles: [tiles_u, tiles_v],
            _pad: [0, 0],
        });

        let device = &self.device;
        let pool = &self.pool;
        let screen = pool.screen()?;
        let p = &self.pipelines;

        let blocks_bind = p.downsample.bind(
            device,
            vec![
                pool.fallback_region.as_entire_binding(),
                BindingResource::TextureView(&screen.video.view),
            ],
        );
        let fallback_bind = p.fallback.bind(
            device,
            vec![
                pool.fallback_region.as_entire_binding(),
                BindingResource::TextureView(&screen.video.view),
                BindingResource::TextureView(&pool.fallback_tiles.view),
            ],
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fallback Frame Encoder"),
        });
        blit(&mut encoder, "Fallback Blocks Pass", &p.downsample, &blocks_bind, &pool.quad_buffer, &pool.fallback_tiles.view);
        blit(&mut encoder, "Fallback Pass", &p.fallback, &fallback_bind, &pool.quad_buffer, &screen.output.view);

        trace!("GPU fallback frame over {}x{} px at ({}, {})", bw, bh, x0, y0);
        self.finish(encoder, target)
    }
}
