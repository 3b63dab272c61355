//! Per-frame mesh vertex streams
//!
//! Both backends draw the same two triangle lists every frame:
//! - unwrap (Pass A): positioned at canonical (u, v), sampling the video at the
//!   live landmark position
//! - rewrap (Pass B): positioned at the displaced live landmark position with
//!   depth, sampling the pixelated canonical image at (u, v)
//!
//! Positions are normalized target coordinates (x right, y down, [0, 1]);
//! backends convert to clip space themselves.

use cgmath::Vector3;
use log::trace;

use crate::canonical::CanonicalMap;
use crate::landmarks::{FaceBox, LandmarkSet};

/// Maps landmark z to a depth-test value: nearer (more negative z) is smaller
pub const DEPTH_SCALE: f32 = 1.0;

/// Triangles below this normalized screen area are treated as degenerate
const MIN_SCREEN_AREA: f32 = 1e-10;

/// Vertex layout shared by the CPU and GPU mesh passes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    /// Target-space position (x, y in [0, 1]) and depth
    pub position: [f32; 3],
    /// Sample coordinate into the source texture
    pub tex_coords: [f32; 2],
}

impl MeshVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Both vertex streams for one frame plus bookkeeping
#[derive(Debug, Clone, Default)]
pub struct FaceGeometry {
    pub unwrap: Vec<MeshVertex>,
    pub rewrap: Vec<MeshVertex>,
    /// Triangles dropped because of missing, invalid, or degenerate data
    pub skipped_triangles: usize,
    /// Screen-space bounds of the drawn (displaced) mesh
    pub bounds: Option<FaceBox>,
}

impl FaceGeometry {
    pub fn triangle_count(&self) -> usize {
        self.rewrap.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.rewrap.is_empty()
    }
}

/// Builds per-frame vertex streams from live landmarks
pub struct GeometryBuilder<'a> {
    map: &'a CanonicalMap,
    face_scale_y: f32,
}

impl<'a> GeometryBuilder<'a> {
    pub fn new(map: &'a CanonicalMap, face_scale_y: f32) -> Self {
        Self { map, face_scale_y }
    }

    /// Build both passes' vertices.
    ///
    /// `displacement` holds one face-relative offset per landmark; it is
    /// scaled by the live face size before being applied to Pass B only.
    pub fn build(&self, landmarks: &LandmarkSet, displacement: Option<&[Vector3<f32>]>) -> FaceGeometry {
        let mut geometry = FaceGeometry::default();

        let (Some(bounds), Some(centroid)) = (landmarks.bounds(), landmarks.centroid()) else {
            geometry.skipped_triangles = self.map.triangles().len();
            return geometry;
        };
        let face_size = bounds.diagonal();
        let cy = centroid[1];

        // Live position with the vertical coverage extension applied
        let live = |i: usize| {
            landmarks.get(i).map(|p| {
                Vector3::new(p.x, cy + (p.y - cy) * self.face_scale_y, p.z)
            })
        };

        geometry.unwrap.reserve(self.map.triangles().len() * 3);
        geometry.rewrap.reserve(self.map.triangles().len() * 3);

        let mut min = [f32::MAX; 2];
        let mut max = [f32::MIN; 2];

        for tri in self.map.triangles() {
            let idx = tri.map(|i| i as usize);
            let (Some(a), Some(b), Some(c)) = (live(idx[0]), live(idx[1]), live(idx[2])) else {
                geometry.skipped_triangles += 1;
                continue;
            };
            let sampled = [a, b, c];

            let displaced = match displacement {
                Some(field) if field.len() == self.map.landmark_count() => {
                    [0, 1, 2].map(|k| sampled[k] + field[idx[k]] * face_size)
                }
                _ => sampled,
            };

            if screen_area(&displaced).abs() < MIN_SCREEN_AREA {
                geometry.skipped_triangles += 1;
                continue;
            }

            for k in 0..3 {
                let uv = self.map.uv(idx[k]);
                geometry.unwrap.push(MeshVertex {
                    position: [uv[0], uv[1], 0.0],
                    tex_coords: [sampled[k].x, sampled[k].y],
                });
                let p = displaced[k];
                geometry.rewrap.push(MeshVertex {
                    position: [p.x, p.y, depth_value(p.z)],
                    tex_coords: uv,
                });
                min = [min[0].min(p.x), min[1].min(p.y)];
                max = [max[0].max(p.x), max[1].max(p.y)];
            }
        }

        if !geometry.rewrap.is_empty() {
            geometry.bounds = Some(FaceBox::new(min[0], min[1], max[0], max[1]));
        }
        if geometry.skipped_triangles > 0 {
            trace!("Skipped {} malformed triangles", geometry.skipped_triangles);
        }
        geometry
    }
}

/// Depth-test value for a landmark z
#[inline]
pub fn depth_value(z: f32) -> f32 {
    (0.5 + z * DEPTH_SCALE).clamp(0.0, 1.0)
}

fn screen_area(p: &[Vector3<f32>; 3]) -> f32 {
    0.5 * ((p[1].x - p[0].x) * (p[2].y - p[0].y) - (p[2].x - p[0].x) * (p[1].y - p[0].y))
}
