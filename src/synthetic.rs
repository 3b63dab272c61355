//! Procedural video and face sources
//!
//! Stand-ins for a camera and a landmark tracker so the pipeline can run
//! without either. The synthetic face is an 18 x 26 landmark grid (468
//! points, matching [`crate::landmarks::FACE_MESH_LANDMARKS`]) wrapped around
//! a vertical cylinder-like surface, so yawing the head produces real
//! self-occlusion.

use cgmath::{Deg, Matrix3, Vector3};
use log::debug;
use std::time::Duration;

use crate::canonical::CanonicalMap;
use crate::error::MosaicResult;
use crate::frame::Frame;
use crate::landmarks::{FaceObservation, Landmark, LandmarkSet, LandmarkSource};
use crate::video::{VideoFrame, VideoSource};

/// Landmark grid columns
pub const FACE_COLS: u32 = 18;
/// Landmark grid rows
pub const FACE_ROWS: u32 = 26;

/// Horizontal arc covered by the grid, centered on the nose line
const ARC_DEGREES: f32 = 150.0;
/// Narrowing of the face toward forehead and chin
const TAPER: f32 = 0.35;

/// Fill pattern of [`SyntheticVideo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPattern {
    /// Red follows x, green follows y, blue drifts over time
    Gradient,
    /// Scrolling 16 px checkerboard
    Checker,
}

/// Moving test-pattern video at a fixed frame rate
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    width: u32,
    height: u32,
    pattern: VideoPattern,
    frame_interval: Duration,
    remaining: Option<u64>,
    index: u64,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, pattern: VideoPattern) -> Self {
        Self {
            width,
            height,
            pattern,
            frame_interval: Duration::from_secs_f64(1.0 / 30.0),
            remaining: None,
            index: 0,
        }
    }

    /// End the stream after `frames` frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    /// Render frame `index` without advancing the stream
    pub fn render(&self, index: u64) -> Frame {
        let shift = (index % 256) as u32;
        match self.pattern {
            VideoPattern::Gradient => Frame::from_fn(self.width, self.height, |x, y| {
                [
                    (x * 255 / self.width.max(2).saturating_sub(1)).min(255) as u8,
                    (y * 255 / self.height.max(2).saturating_sub(1)).min(255) as u8,
                    ((shift * 3) % 256) as u8,
                    255,
                ]
            }),
            VideoPattern::Checker => Frame::from_fn(self.width, self.height, |x, y| {
                let on = ((x + shift) / 16 + y / 16) % 2 == 0;
                if on {
                    [220, 200, 180, 255]
                } else {
                    [40, 60, 90, 255]
                }
            }),
        }
    }
}

impl VideoSource for SyntheticVideo {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let frame = VideoFrame {
            image: self.render(self.index),
            timestamp: self.frame_interval * self.index as u32,
        };
        self.index += 1;
        Some(frame)
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Head placement in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePose {
    pub center: [f32; 2],
    /// Face width; the surface radius is half of this
    pub width: f32,
    pub height: f32,
    /// Rotation about the vertical axis; positive turns the left side away
    pub yaw_degrees: f32,
}

impl Default for FacePose {
    fn default() -> Self {
        Self {
            center: [0.5, 0.5],
            width: 0.4,
            height: 0.55,
            yaw_degrees: 0.0,
        }
    }
}

impl FacePose {
    pub fn with_yaw(mut self, yaw_degrees: f32) -> Self {
        self.yaw_degrees = yaw_degrees;
        self
    }
}

/// Procedural landmark tracker
#[derive(Debug, Clone)]
pub struct SyntheticFace {
    pose: FacePose,
    warmup_frames: u64,
    dropout_every: Option<u64>,
    sway: f32,
    frames_seen: u64,
}

impl SyntheticFace {
    pub fn new(pose: FacePose) -> Self {
        Self {
            pose,
            warmup_frames: 0,
            dropout_every: None,
            sway: 0.0,
            frames_seen: 0,
        }
    }

    /// Report only a bounding box for the first `frames` frames
    pub fn with_warmup(mut self, frames: u64) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Lose tracking on every `every`-th frame
    pub fn with_dropout(mut self, every: u64) -> Self {
        self.dropout_every = (every > 0).then_some(every);
        self
    }

    /// Horizontal head sway amplitude (normalized), one cycle every 4 s
    pub fn with_sway(mut self, amplitude: f32) -> Self {
        self.sway = amplitude;
        self
    }

    /// Canonical table matching this face's landmark grid
    pub fn canonical_map() -> MosaicResult<CanonicalMap> {
        CanonicalMap::synthetic_grid(FACE_COLS, FACE_ROWS)
    }

    pub fn pose(&self) -> FacePose {
        self.pose
    }

    /// All 468 landmarks for `pose`
    pub fn landmarks(pose: &FacePose) -> LandmarkSet {
        let radius = pose.width * 0.5;
        let half_height = pose.height * 0.5;
        let yaw = Matrix3::from_angle_y(Deg(pose.yaw_degrees));

        let mut points = Vec::with_capacity((FACE_COLS * FACE_ROWS) as usize);
        for r in 0..FACE_ROWS {
            let yy = r as f32 / (FACE_ROWS - 1) as f32 * 2.0 - 1.0;
            let ring = radius * (1.0 - TAPER * yy * yy);
            for c in 0..FACE_COLS {
                let theta = (c as f32 / (FACE_COLS - 1) as f32 - 0.5) * ARC_DEGREES.to_radians();
                let local = Vector3::new(ring * theta.sin(), yy * half_height, -ring * theta.cos());
                let p = yaw * local;
                points.push(Landmark::new(pose.center[0] + p.x, pose.center[1] + p.y, p.z));
            }
        }
        LandmarkSet::new(points)
    }

    fn pose_at(&self, timestamp: Duration) -> FacePose {
        let mut pose = self.pose;
        if self.sway != 0.0 {
            let phase = timestamp.as_secs_f32() * std::f32::consts::TAU / 4.0;
            pose.center[0] += self.sway * phase.sin();
        }
        pose
    }
}

impl LandmarkSource for SyntheticFace {
    fn detect(&mut self, _frame: &Frame, timestamp: Duration) -> FaceObservation {
        let index = self.frames_seen;
        self.frames_seen += 1;

        if self.dropout_every.is_some_and(|every| index > 0 && index % every == 0) {
            debug!("Synthetic tracker dropped frame {}", index);
            return FaceObservation::Absent;
        }

        let landmarks = Self::landmarks(&self.pose_at(timestamp));
        if index < self.warmup_frames {
            return match landmarks.bounds() {
                Some(face) => FaceObservation::BoundingBox(face),
                None => FaceObservation::Absent,
            };
        }
        FaceObservation::Mesh(landmarks)
    }
}
