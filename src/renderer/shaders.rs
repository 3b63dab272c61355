//! WGSL shaders for the mosaic passes
//!
//! Mesh passes (unwrap, rewrap) carry their own vertex stage. Every blit-style
//! pass shares the full-screen quad vertex stage in [`QUAD_VERTEX`] and reads
//! its inputs with `textureLoad`, so tile boundaries land on exactly the same
//! texels as in the software renderer.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::{Device, ShaderModule, ShaderModuleDescriptor, ShaderSource};

use crate::error::{MosaicError, MosaicResult};

/// Shaders used by the GPU renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Pass A: video triangles into canonical face-space
    Unwrap,
    /// Box filter into the tile grid (canonical and fallback)
    Downsample,
    /// Tile permutation and color perturbation
    Scramble,
    /// Nearest upsample of the tile grid to canonical resolution
    Upsample,
    /// Pass B: canonical triangles back onto the screen, depth tested
    Rewrap,
    /// Face layer over the video with blackout brightness
    Composite,
    /// Bounding-box pixelation over the video
    Fallback,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 7] = [
        ShaderKind::Unwrap,
        ShaderKind::Downsample,
        ShaderKind::Scramble,
        ShaderKind::Upsample,
        ShaderKind::Rewrap,
        ShaderKind::Composite,
        ShaderKind::Fallback,
    ];

    /// Full WGSL source, including the shared quad stage for blit passes
    pub fn source(self) -> String {
        match self {
            ShaderKind::Unwrap => UNWRAP_SHADER.to_string(),
            ShaderKind::Rewrap => REWRAP_SHADER.to_string(),
            ShaderKind::Downsample => format!("{}{}", QUAD_VERTEX, DOWNSAMPLE_SHADER),
            ShaderKind::Scramble => format!("{}{}", QUAD_VERTEX, SCRAMBLE_SHADER),
            ShaderKind::Upsample => format!("{}{}", QUAD_VERTEX, UPSAMPLE_SHADER),
            ShaderKind::Composite => format!("{}{}", QUAD_VERTEX, COMPOSITE_SHADER),
            ShaderKind::Fallback => format!("{}{}", QUAD_VERTEX, FALLBACK_SHADER),
        }
    }
}

/// Compiles every shader once and hands out the modules
pub struct ShaderManager {
    device: Arc<Device>,
    compiled_shaders: HashMap<ShaderKind, ShaderModule>,
}

impl ShaderManager {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            compiled_shaders: HashMap::new(),
        }
    }

    /// Compile all mosaic shaders; any validation error is fatal
    pub fn compile_all_shaders(&mut self) -> MosaicResult<()> {
        info!("⚡ Compiling mosaic shaders...");
        for kind in ShaderKind::ALL {
            self.compile_shader(kind)?;
        }
        info!("✅ Compiled {} shaders", self.compiled_shaders.len());
        Ok(())
    }

    fn compile_shader(&mut self, kind: ShaderKind) -> MosaicResult<()> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(&format!("{:?} Shader", kind)),
            source: ShaderSource::Wgsl(kind.source().into()),
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(MosaicError::ShaderCompilation {
                shader: format!("{:?}", kind),
                message: error.to_string(),
            });
        }

        self.compiled_shaders.insert(kind, module);
        debug!("✨ Compiled shader: {:?}", kind);
        Ok(())
    }

    pub fn get_shader(&self, kind: ShaderKind) -> MosaicResult<&ShaderModule> {
        self.compiled_shaders
            .get(&kind)
            .ok_or_else(|| MosaicError::ShaderCompilation {
                shader: format!("{:?}", kind),
                message: "shader was not compiled".to_string(),
            })
    }
}

/// Full-screen quad vertex stage shared by blit passes
const QUAD_VERTEX: &str = r#"
struct QuadOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> QuadOutput {
    var out: QuadOutput;
    out.clip_position = vec4<f32>(position, 0.0, 1.0);
    out.uv = vec2<f32>(position.x * 0.5 + 0.5, 0.5 - position.y * 0.5);
    return out;
}
"#;

/// Pass A: rasterize at canonical (u, v), sample the video at the live position
const UNWRAP_SHADER: &str = r#"
struct MeshInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct MeshOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@group(0) @binding(0)
var video: texture_2d<f32>;

@group(0) @binding(1)
var video_sampler: sampler;

@vertex
fn vs_main(input: MeshInput) -> MeshOutput {
    var out: MeshOutput;
    out.clip_position = vec4<f32>(input.position.x * 2.0 - 1.0, 1.0 - input.position.y * 2.0, 0.0, 1.0);
    out.tex_coords = input.tex_coords;
    return out;
}

@fragment
fn fs_main(input: MeshOutput) -> @location(0) vec4<f32> {
    let color = textureSample(video, video_sampler, input.tex_coords);
    return vec4<f32>(color.rgb, 1.0);
}
"#;

/// Box filter over a source region; alpha is the covered fraction
const DOWNSAMPLE_SHADER: &str = r#"
struct RegionUniforms {
    origin: vec2<u32>,
    size: vec2<u32>,
    tiles: vec2<u32>,
    _pad: vec2<u32>,
}

@group(0) @binding(0)
var<uniform> region: RegionUniforms;

@group(0) @binding(1)
var source: texture_2d<f32>;

// First texel whose tile index (texel * tiles / size) reaches `t`
fn tile_start(t: u32, size: u32, tiles: u32) -> u32 {
    return (t * size + tiles - 1u) / tiles;
}

@fragment
fn fs_main(input: QuadOutput) -> @location(0) vec4<f32> {
    let tile = vec2<u32>(floor(input.clip_position.xy));
    if (tile.x >= region.tiles.x || tile.y >= region.tiles.y) {
        return vec4<f32>(0.0);
    }
    let x0 = tile_start(tile.x, region.size.x, region.tiles.x);
    let x1 = tile_start(tile.x + 1u, region.size.x, region.tiles.x);
    let y0 = tile_start(tile.y, region.size.y, region.tiles.y);
    let y1 = tile_start(tile.y + 1u, region.size.y, region.tiles.y);

    var sum = vec3<f32>(0.0);
    var alpha = 0.0;
    var count = 0.0;
    for (var y = y0; y < y1; y = y + 1u) {
        for (var x = x0; x < x1; x = x + 1u) {
            let c = textureLoad(source, vec2<i32>(region.origin + vec2<u32>(x, y)), 0);
            sum = sum + c.rgb * c.a;
            alpha = alpha + c.a;
            count = count + 1.0;
        }
    }
    if (alpha <= 0.0) {
        return vec4<f32>(0.0);
    }
    return vec4<f32>(sum / alpha, alpha / count);
}
"#;

/// Per-tile lookup: xy = source tile, z = red shift, w = blue shift
const SCRAMBLE_SHADER: &str = r#"
struct ScalarUniforms {
    value: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

@group(0) @binding(0)
var<uniform> green_gain: ScalarUniforms;

@group(0) @binding(1)
var tiles: texture_2d<f32>;

@group(0) @binding(2)
var lookup: texture_2d<f32>;

@fragment
fn fs_main(input: QuadOutput) -> @location(0) vec4<f32> {
    let dest = vec2<i32>(floor(input.clip_position.xy));
    let entry = textureLoad(lookup, dest, 0);
    var color = textureLoad(tiles, vec2<i32>(entry.xy), 0);
    if (color.a <= 0.0) {
        color = textureLoad(tiles, dest, 0);
    }
    return vec4<f32>(
        clamp(color.r + entry.z, 0.0, 1.0),
        color.g * green_gain.value,
        clamp(color.b + entry.w, 0.0, 1.0),
        color.a,
    );
}
"#;

const UPSAMPLE_SHADER: &str = r#"
struct GridUniforms {
    tiles: vec2<u32>,
    resolution: vec2<u32>,
}

@group(0) @binding(0)
var<uniform> grid: GridUniforms;

@group(0) @binding(1)
var tiles: texture_2d<f32>;

@fragment
fn fs_main(input: QuadOutput) -> @location(0) vec4<f32> {
    let texel = vec2<u32>(floor(input.clip_position.xy));
    let tile = texel * grid.tiles / grid.resolution;
    return textureLoad(tiles, vec2<i32>(tile), 0);
}
"#;

/// Pass B: rasterize at the displaced live position, depth from landmark z
const REWRAP_SHADER: &str = r#"
struct MeshInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct MeshOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

struct GridUniforms {
    tiles: vec2<u32>,
    resolution: vec2<u32>,
}

@group(0) @binding(0)
var<uniform> grid: GridUniforms;

@group(0) @binding(1)
var pixelated: texture_2d<f32>;

@vertex
fn vs_main(input: MeshInput) -> MeshOutput {
    var out: MeshOutput;
    out.clip_position = vec4<f32>(
        input.position.x * 2.0 - 1.0,
        1.0 - input.position.y * 2.0,
        input.position.z,
        1.0,
    );
    out.tex_coords = input.tex_coords;
    return out;
}

@fragment
fn fs_main(input: MeshOutput) -> @location(0) vec4<f32> {
    let uv = clamp(input.tex_coords, vec2<f32>(0.0), vec2<f32>(1.0));
    let texel = min(vec2<u32>(uv * vec2<f32>(grid.resolution)), grid.resolution - vec2<u32>(1u));
    let color = textureLoad(pixelated, vec2<i32>(texel), 0);
    return vec4<f32>(color.rgb, 1.0);
}
"#;

/// Straight-alpha composite; brightness touches face pixels only
const COMPOSITE_SHADER: &str = r#"
struct ScalarUniforms {
    value: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

@group(0) @binding(0)
var<uniform> brightness: ScalarUniforms;

@group(0) @binding(1)
var video: texture_2d<f32>;

@group(0) @binding(2)
var face: texture_2d<f32>;

@fragment
fn fs_main(input: QuadOutput) -> @location(0) vec4<f32> {
    let p = vec2<i32>(floor(input.clip_position.xy));
    let background = textureLoad(video, p, 0);
    let layer = textureLoad(face, p, 0);
    if (layer.a <= 0.0) {
        return background;
    }
    return vec4<f32>(mix(background.rgb, layer.rgb * brightness.value, layer.a), background.a);
}
"#;

const FALLBACK_SHADER: &str = r#"
struct RegionUniforms {
    origin: vec2<u32>,
    size: vec2<u32>,
    tiles: vec2<u32>,
    _pad: vec2<u32>,
}

@group(0) @binding(0)
var<uniform> region: RegionUniforms;

@group(0) @binding(1)
var video: texture_2d<f32>;

@group(0) @binding(2)
var blocks: texture_2d<f32>;

@fragment
fn fs_main(input: QuadOutput) -> @location(0) vec4<f32> {
    let p = vec2<u32>(floor(input.clip_position.xy));
    let background = textureLoad(video, vec2<i32>(p), 0);
    if (any(p < region.origin) || any(p >= region.origin + region.size)) {
        return background;
    }
    let tile = (p - region.origin) * region.tiles / region.size;
    return textureLoad(blocks, vec2<i32>(tile), 0);
}
"#;
