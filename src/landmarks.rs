//! Per-frame face observations
//!
//! The landmark source is an external collaborator: once per video frame it
//! reports either a full landmark set, a coarse bounding box, or nothing.

use std::time::Duration;

use crate::frame::Frame;

/// Number of landmarks in a face mesh
pub const FACE_MESH_LANDMARKS: usize = 468;

/// One tracked landmark in normalized frame coordinates.
///
/// `x` and `y` are in [0, 1] relative to the frame; `z` is relative depth
/// where more negative values are closer to the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Finite and not wildly outside the frame
    pub fn is_valid(&self) -> bool {
        const SLACK: f32 = 1.0;
        self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && (-SLACK..=1.0 + SLACK).contains(&self.x)
            && (-SLACK..=1.0 + SLACK).contains(&self.y)
    }
}

/// Landmarks for one frame, indexed by landmark id
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Landmark at `index` if present and valid
    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index).filter(|p| p.is_valid())
    }

    /// Axis-aligned bounds over valid landmarks
    pub fn bounds(&self) -> Option<FaceBox> {
        let mut valid = self.points.iter().filter(|p| p.is_valid());
        let first = valid.next()?;
        let init = FaceBox::new(first.x, first.y, first.x, first.y);
        Some(valid.fold(init, |b, p| {
            FaceBox::new(b.x0.min(p.x), b.y0.min(p.y), b.x1.max(p.x), b.y1.max(p.y))
        }))
    }

    /// Mean position of valid landmarks
    pub fn centroid(&self) -> Option<[f32; 2]> {
        let (sum, count) = self
            .points
            .iter()
            .filter(|p| p.is_valid())
            .fold(([0.0f32; 2], 0usize), |(s, n), p| ([s[0] + p.x, s[1] + p.y], n + 1));
        (count > 0).then(|| [sum[0] / count as f32, sum[1] / count as f32])
    }
}

/// Axis-aligned face box in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl FaceBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Diagonal length, used as the face-size reference for distortion
    pub fn diagonal(&self) -> f32 {
        (self.width() * self.width() + self.height() * self.height()).sqrt()
    }

    /// Stretch vertically around the center by `factor`
    pub fn scaled_y(&self, factor: f32) -> Self {
        let cy = (self.y0 + self.y1) * 0.5;
        let half = self.height() * 0.5 * factor;
        Self::new(self.x0, cy - half, self.x1, cy + half)
    }

    /// Clip to the unit square; `None` when nothing is left
    pub fn clamped(&self) -> Option<Self> {
        let clipped = Self::new(
            self.x0.clamp(0.0, 1.0),
            self.y0.clamp(0.0, 1.0),
            self.x1.clamp(0.0, 1.0),
            self.y1.clamp(0.0, 1.0),
        );
        let finite = [clipped.x0, clipped.y0, clipped.x1, clipped.y1]
            .iter()
            .all(|v| v.is_finite());
        (finite && clipped.width() > 0.0 && clipped.height() > 0.0).then_some(clipped)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Pixels covered in a `width` x `height` frame, rounded outward and
    /// clipped to the frame; `None` when nothing is left
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
        let to_px = |v: f32, size: u32| (v.max(0.0) as u32).min(size);
        let rect = PixelRect {
            x0: to_px((self.x0 * width as f32).floor(), width),
            y0: to_px((self.y0 * height as f32).floor(), height),
            x1: to_px((self.x1 * width as f32).ceil(), width),
            y1: to_px((self.y1 * height as f32).ceil(), height),
        };
        (rect.x1 > rect.x0 && rect.y1 > rect.y0).then_some(rect)
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    /// Requested block grid, limited to one block per pixel
    pub fn tile_grid(&self, tiles_u: u32, tiles_v: u32) -> (u32, u32) {
        (tiles_u.min(self.width()).max(1), tiles_v.min(self.height()).max(1))
    }
}

/// What the landmark source saw in a frame
#[derive(Debug, Clone, PartialEq)]
pub enum FaceObservation {
    /// Full landmark mesh available
    Mesh(LandmarkSet),
    /// Only a coarse face-presence box (detector warm-up or reacquisition)
    BoundingBox(FaceBox),
    /// No face in this frame
    Absent,
}

impl FaceObservation {
    pub fn is_absent(&self) -> bool {
        matches!(self, FaceObservation::Absent)
    }
}

/// Produces one observation per video frame.
///
/// Implementations may block on inference, but must return for every frame;
/// the pipeline always renders against the most recent completed result.
pub trait LandmarkSource {
    fn detect(&mut self, frame: &Frame, timestamp: Duration) -> FaceObservation;
}
