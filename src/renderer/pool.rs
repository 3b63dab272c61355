//! Shared GPU resource pool
//!
//! Every texture, render target, uniform buffer, sampler and vertex buffer the
//! mosaic passes touch is created here once. Per frame, only contents are
//! rewritten (`write_texture` / `write_buffer`); nothing is reallocated unless
//! the video resolution changes.

use log::{debug, info};
use std::sync::Arc;
use wgpu::util::DeviceExt;
use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, Device, Extent3d, Queue, Sampler, Texture, TextureDescriptor,
    TextureDimension, TextureFormat, TextureUsages, TextureView, TextureViewDescriptor,
};

use crate::config::MosaicConfig;
use crate::error::{MosaicError, MosaicResult};
use crate::geometry::MeshVertex;
use crate::obfuscation::TileScramble;

/// Color format of every intermediate target
pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
/// Pass B depth format
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
/// Scramble lookup texel: source x, source y, red shift, blue shift
pub const LOOKUP_FORMAT: TextureFormat = TextureFormat::Rgba32Float;

/// Full-screen quad vertex
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Two triangles covering clip space
pub const QUAD_VERTICES: [QuadVertex; 6] = [
    QuadVertex { position: [-1.0, -1.0] },
    QuadVertex { position: [1.0, -1.0] },
    QuadVertex { position: [-1.0, 1.0] },
    QuadVertex { position: [-1.0, 1.0] },
    QuadVertex { position: [1.0, -1.0] },
    QuadVertex { position: [1.0, 1.0] },
];

/// Source region and tile grid of a box-filter pass
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RegionUniforms {
    pub origin: [u32; 2],
    pub size: [u32; 2],
    pub tiles: [u32; 2],
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GridUniforms {
    pub tiles: [u32; 2],
    pub resolution: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ScalarUniforms {
    pub value: f32,
    pub _pad: [f32; 3],
}

impl ScalarUniforms {
    pub fn new(value: f32) -> Self {
        Self { value, _pad: [0.0; 3] }
    }
}

/// A texture together with its default view
pub struct RenderTarget {
    pub texture: Texture,
    pub view: TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    fn new(
        device: &Device,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsages,
    ) -> MosaicResult<Self> {
        let max = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(MosaicError::Framebuffer {
                target: label.to_string(),
                message: format!("{}x{} is outside 1..={} on this device", width, height, max),
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(MosaicError::Framebuffer {
                target: label.to_string(),
                message: error.to_string(),
            });
        }

        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    fn bytes(&self, bytes_per_texel: u64) -> u64 {
        self.width as u64 * self.height as u64 * bytes_per_texel
    }
}

/// Targets sized to the video frame
pub struct ScreenTargets {
    pub video: RenderTarget,
    pub face_layer: RenderTarget,
    pub depth: RenderTarget,
    pub output: RenderTarget,
}

impl ScreenTargets {
    fn new(device: &Device, width: u32, height: u32) -> MosaicResult<Self> {
        let sampled = TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING;
        Ok(Self {
            video: RenderTarget::new(
                device,
                "Video Frame",
                width,
                height,
                COLOR_FORMAT,
                TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            )?,
            face_layer: RenderTarget::new(device, "Face Layer", width, height, COLOR_FORMAT, sampled)?,
            depth: RenderTarget::new(
                device,
                "Face Depth",
                width,
                height,
                DEPTH_FORMAT,
                TextureUsages::RENDER_ATTACHMENT,
            )?,
            output: RenderTarget::new(
                device,
                "Composited Output",
                width,
                height,
                COLOR_FORMAT,
                TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
            )?,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.output.width, self.output.height)
    }
}

/// Every GPU resource the mosaic passes use
pub struct GpuResourcePool {
    device: Arc<Device>,
    queue: Arc<Queue>,

    pub canonical: RenderTarget,
    pub tiles: RenderTarget,
    pub scrambled: RenderTarget,
    pub pixelated: RenderTarget,
    pub lookup: RenderTarget,
    pub fallback_tiles: RenderTarget,
    screen: Option<ScreenTargets>,

    pub quad_buffer: Buffer,
    pub unwrap_vertices: Buffer,
    pub rewrap_vertices: Buffer,
    max_vertices: usize,

    pub canonical_region: Buffer,
    pub fallback_region: Buffer,
    pub grid: Buffer,
    pub green_gain: Buffer,
    pub brightness: Buffer,

    pub linear_sampler: Sampler,

    uploaded_scramble: Option<TileScramble>,
}

impl GpuResourcePool {
    /// Allocate everything that does not depend on the video size.
    ///
    /// `max_triangles` bounds the per-frame mesh vertex streams.
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, config: &MosaicConfig, max_triangles: usize) -> MosaicResult<Self> {
        let res = config.mosaic.canonical_resolution;
        let (tiles_u, tiles_v) = (config.mosaic.tiles_u, config.mosaic.tiles_v);
        let (fallback_u, fallback_v) = (config.fallback.tiles_u, config.fallback.tiles_v);
        let sampled = TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING;

        let canonical = RenderTarget::new(&device, "Canonical Target", res, res, COLOR_FORMAT, sampled)?;
        let tiles = RenderTarget::new(&device, "Tile Grid", tiles_u, tiles_v, COLOR_FORMAT, sampled)?;
        let scrambled = RenderTarget::new(&device, "Scrambled Tiles", tiles_u, tiles_v, COLOR_FORMAT, sampled)?;
        let pixelated = RenderTarget::new(&device, "Pixelated Canonical", res, res, COLOR_FORMAT, sampled)?;
        let lookup = RenderTarget::new(
            &device,
            "Scramble Lookup",
            tiles_u,
            tiles_v,
            LOOKUP_FORMAT,
            TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        )?;
        let fallback_tiles = RenderTarget::new(&device, "Fallback Tiles", fallback_u, fallback_v, COLOR_FORMAT, sampled)?;

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Full-screen Quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: BufferUsages::VERTEX,
        });

        let max_vertices = max_triangles * 3;
        let vertex_bytes = (max_vertices.max(3) * std::mem::size_of::<MeshVertex>()) as u64;
        let mesh_buffer = |label: &str| {
            device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: vertex_bytes,
                usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let unwrap_vertices = mesh_buffer("Unwrap Vertices");
        let rewrap_vertices = mesh_buffer("Rewrap Vertices");

        let uniform_init = |label: &str, contents: &[u8]| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            })
        };
        let canonical_region = uniform_init(
            "Canonical Region Uniforms",
            bytemuck::bytes_of(&RegionUniforms {
                origin: [0, 0],
                size: [res, res],
                tiles: [tiles_u, tiles_v],
                _pad: [0, 0],
            }),
        );
        let fallback_region = uniform_init(
            "Fallback Region Uniforms",
            bytemuck::bytes_of(&RegionUniforms {
                origin: [0, 0],
                size: [1, 1],
                tiles: [1, 1],
                _pad: [0, 0],
            }),
        );
        let grid = uniform_init(
            "Grid Uniforms",
            bytemuck::bytes_of(&GridUniforms {
                tiles: [tiles_u, tiles_v],
                resolution: [res, res],
            }),
        );
        let green_gain = uniform_init("Green Gain Uniforms", bytemuck::bytes_of(&ScalarUniforms::new(1.0)));
        let brightness = uniform_init("Brightness Uniforms", bytemuck::bytes_of(&ScalarUniforms::new(1.0)));

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Video Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 1.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        let pool = Self {
            device,
            queue,
            canonical,
            tiles,
            scrambled,
            pixelated,
            lookup,
            fallback_tiles,
            screen: None,
            quad_buffer,
            unwrap_vertices,
            rewrap_vertices,
            max_vertices,
            canonical_region,
            fallback_region,
            grid,
            green_gain,
            brightness,
            linear_sampler,
            uploaded_scramble: None,
        };

        info!(
            "🧱 GPU resource pool: canonical {}x{}, tiles {}x{}, {:.2} MB of targets",
            res,
            res,
            tiles_u,
            tiles_v,
            pool.target_memory() as f64 / 1024.0 / 1024.0
        );
        Ok(pool)
    }

    /// Bytes held by the fixed-size targets
    pub fn target_memory(&self) -> u64 {
        let color = [&self.canonical, &self.tiles, &self.scrambled, &self.pixelated, &self.fallback_tiles]
            .iter()
            .map(|t| t.bytes(4))
            .sum::<u64>();
        color + self.lookup.bytes(16)
    }

    /// Screen targets for a `width` x `height` video, created on first use
    /// and recreated only on a resolution change
    pub fn ensure_screen_targets(&mut self, width: u32, height: u32) -> MosaicResult<()> {
        let stale = self.screen.as_ref().map(|s| s.size() != (width, height)).unwrap_or(true);
        if stale {
            debug!("🔄 Allocating screen targets: {}x{}", width, height);
            self.screen = Some(ScreenTargets::new(&self.device, width, height)?);
        }
        Ok(())
    }

    pub fn screen(&self) -> MosaicResult<&ScreenTargets> {
        self.screen.as_ref().ok_or_else(|| MosaicError::Framebuffer {
            target: "screen".to_string(),
            message: "screen targets missing".to_string(),
        })
    }

    pub fn upload_video(&self, rgba: &[u8], width: u32, height: u32) {
        if let Some(screen) = &self.screen {
            write_texture(&self.queue, &screen.video.texture, rgba, width, height, 4);
        }
    }

    /// Write both mesh streams; returns the vertex count actually uploaded
    pub fn upload_mesh(&self, unwrap: &[MeshVertex], rewrap: &[MeshVertex]) -> u32 {
        let count = unwrap.len().min(rewrap.len()).min(self.max_vertices);
        if count == 0 {
            return 0;
        }
        self.queue
            .write_buffer(&self.unwrap_vertices, 0, bytemuck::cast_slice(&unwrap[..count]));
        self.queue
            .write_buffer(&self.rewrap_vertices, 0, bytemuck::cast_slice(&rewrap[..count]));
        count as u32
    }

    /// Upload the scramble lookup when it differs from what is resident
    pub fn upload_scramble(&mut self, scramble: &TileScramble) {
        if self.uploaded_scramble.as_ref() == Some(scramble) {
            return;
        }

        let (tiles_u, tiles_v) = scramble.permutation.grid();
        let mut texels = Vec::with_capacity((tiles_u * tiles_v) as usize * 4);
        for y in 0..tiles_v {
            for x in 0..tiles_u {
                let (sx, sy) = scramble.permutation.source_of(x, y);
                let [dr, db] = scramble.perturbation.shift((y * tiles_u + x) as usize);
                texels.extend_from_slice(&[sx as f32, sy as f32, dr, db]);
            }
        }
        write_texture(
            &self.queue,
            &self.lookup.texture,
            bytemuck::cast_slice(&texels),
            tiles_u,
            tiles_v,
            16,
        );
        self.queue.write_buffer(
            &self.green_gain,
            0,
            bytemuck::bytes_of(&ScalarUniforms::new(scramble.perturbation.green_gain())),
        );
        debug!("Scramble lookup uploaded ({}x{})", tiles_u, tiles_v);
        self.uploaded_scramble = Some(scramble.clone());
    }

    pub fn set_brightness(&self, brightness: f32) {
        self.queue
            .write_buffer(&self.brightness, 0, bytemuck::bytes_of(&ScalarUniforms::new(brightness)));
    }

    pub fn set_fallback_region(&self, region: RegionUniforms) {
        self.queue.write_buffer(&self.fallback_region, 0, bytemuck::bytes_of(&region));
    }
}

fn write_texture(queue: &Queue, texture: &Texture, data: &[u8], width: u32, height: u32, bytes_per_texel: u32) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width * bytes_per_texel),
            rows_per_image: Some(height),
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts_match_wgsl_sizes() {
        assert_eq!(std::mem::size_of::<RegionUniforms>(), 32);
        assert_eq!(std::mem::size_of::<GridUniforms>(), 16);
        assert_eq!(std::mem::size_of::<ScalarUniforms>(), 16);
        assert_eq!(std::mem::size_of::<MeshVertex>(), 20);
    }

    #[test]
    fn test_quad_covers_clip_space() {
        let area: f32 = QUAD_VERTICES
            .chunks_exact(3)
            .map(|t| {
                let [a, b, c] = [t[0].position, t[1].position, t[2].position];
                0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])).abs()
            })
            .sum();
        assert_eq!(area, 4.0);
    }
}
