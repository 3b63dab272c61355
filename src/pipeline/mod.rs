//! Per-frame draw entry point
//!
//! [`MosaicPipeline::draw_frame`] is called once per video frame with the
//! landmark observation for that frame. It advances the key schedulers,
//! picks the mesh, fallback or passthrough path, and hands the actual pixel
//! work to a [`MosaicBackend`].

pub mod frame_loop;

pub use frame_loop::{FrameLoop, FrameStats};

use log::{debug, trace};
use std::time::Instant;

use crate::canonical::CanonicalMap;
use crate::config::MosaicConfig;
use crate::error::{MosaicError, MosaicResult};
use crate::frame::Frame;
use crate::geometry::{FaceGeometry, GeometryBuilder};
use crate::landmarks::{FaceBox, FaceObservation};
use crate::obfuscation::{ObfuscationState, RotationEvents, TileScramble};

/// Everything a backend needs for one mesh frame
#[derive(Debug)]
pub struct MeshDraw<'a> {
    pub geometry: &'a FaceGeometry,
    pub scramble: &'a TileScramble,
    /// Multiplier for pixels inside the face silhouette
    pub brightness: f32,
}

/// Rendering backend for the mosaic passes
pub trait MosaicBackend {
    fn name(&self) -> &'static str;

    /// Unwrap, pixelate, scramble, rewrap and composite one frame
    fn draw_mesh(&mut self, video: &Frame, mesh: &MeshDraw<'_>, target: &mut Frame) -> MosaicResult<()>;

    /// Flat block pixelation over an axis-aligned box
    fn draw_fallback(&mut self, video: &Frame, face: FaceBox, target: &mut Frame) -> MosaicResult<()>;

    /// Copy the video through untouched
    fn draw_passthrough(&mut self, video: &Frame, target: &mut Frame) -> MosaicResult<()> {
        target.pixels_mut().copy_from_slice(video.pixels());
        Ok(())
    }
}

impl<B: MosaicBackend + ?Sized> MosaicBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn draw_mesh(&mut self, video: &Frame, mesh: &MeshDraw<'_>, target: &mut Frame) -> MosaicResult<()> {
        (**self).draw_mesh(video, mesh, target)
    }

    fn draw_fallback(&mut self, video: &Frame, face: FaceBox, target: &mut Frame) -> MosaicResult<()> {
        (**self).draw_fallback(video, face, target)
    }

    fn draw_passthrough(&mut self, video: &Frame, target: &mut Frame) -> MosaicResult<()> {
        (**self).draw_passthrough(video, target)
    }
}

/// Which path produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Mesh,
    Fallback,
    Passthrough,
}

/// Per-frame result of [`MosaicPipeline::draw_frame`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    /// Triangles dropped for missing, invalid or degenerate landmarks
    pub skipped_triangles: usize,
    pub drawn_triangles: usize,
    /// Face brightness applied this frame (1.0 outside a blackout)
    pub brightness: f32,
    pub rotations: RotationEvents,
}

/// Owns the obfuscation state and drives a backend once per frame
pub struct MosaicPipeline<B> {
    map: CanonicalMap,
    face_scale_y: f32,
    fallback_enabled: bool,
    obfuscation: ObfuscationState,
    backend: B,
}

impl<B: MosaicBackend> MosaicPipeline<B> {
    /// Seed both keys from OS entropy
    pub fn new(config: &MosaicConfig, map: CanonicalMap, backend: B) -> Self {
        let obfuscation = ObfuscationState::new(config, &map, Instant::now());
        Self::with_obfuscation(config, map, obfuscation, backend)
    }

    pub fn with_obfuscation(config: &MosaicConfig, map: CanonicalMap, obfuscation: ObfuscationState, backend: B) -> Self {
        debug!(
            "Mosaic pipeline on '{}' backend: {} landmarks, {} triangles",
            backend.name(),
            map.landmark_count(),
            map.triangles().len()
        );
        Self {
            map,
            face_scale_y: config.mosaic.face_scale_y,
            fallback_enabled: config.fallback.enabled,
            obfuscation,
            backend,
        }
    }

    /// Draw one frame into `target`.
    ///
    /// Tracking loss and malformed landmarks never fail; they show up in the
    /// returned [`FrameReport`]. Only backend failures and a `target` whose
    /// size differs from `video` are errors. A frame with no pixels is passed
    /// through.
    pub fn draw_frame(
        &mut self,
        video: &Frame,
        observation: &FaceObservation,
        now: Instant,
        target: &mut Frame,
    ) -> MosaicResult<FrameReport> {
        if video.size() != target.size() {
            let (width, height) = video.size();
            let (actual_width, actual_height) = target.size();
            return Err(MosaicError::FrameSize {
                width,
                height,
                actual_width,
                actual_height,
            });
        }

        let rotations = self.obfuscation.advance(now);
        if rotations.geometry {
            debug!("Geometry key rotated");
        }
        if rotations.color {
            debug!("Color key rotated, blackout started");
        }

        let mut report = FrameReport {
            outcome: FrameOutcome::Passthrough,
            skipped_triangles: 0,
            drawn_triangles: 0,
            brightness: 1.0,
            rotations,
        };

        if video.is_empty() {
            trace!("Empty {}x{} frame passed through", video.width(), video.height());
            self.backend.draw_passthrough(video, target)?;
            return Ok(report);
        }

        match observation {
            FaceObservation::Mesh(landmarks) => {
                let params = self.obfuscation.frame_params(now);
                let displacement = params.displacement.as_ref().map(|field| field.offsets());
                let geometry = GeometryBuilder::new(&self.map, self.face_scale_y).build(landmarks, displacement);
                report.skipped_triangles = geometry.skipped_triangles;
                if geometry.skipped_triangles > 0 {
                    debug!("Skipped {} malformed triangles this frame", geometry.skipped_triangles);
                }

                if !geometry.is_empty() {
                    report.outcome = FrameOutcome::Mesh;
                    report.drawn_triangles = geometry.triangle_count();
                    report.brightness = params.brightness;
                    let mesh = MeshDraw {
                        geometry: &geometry,
                        scramble: params.scramble,
                        brightness: params.brightness,
                    };
                    self.backend.draw_mesh(video, &mesh, target)?;
                } else if let Some(face) = landmarks.bounds().filter(|_| self.fallback_enabled) {
                    report.outcome = self.fallback(video, face, target)?;
                } else {
                    self.backend.draw_passthrough(video, target)?;
                }
            }
            FaceObservation::BoundingBox(face) if self.fallback_enabled => {
                report.outcome = self.fallback(video, *face, target)?;
            }
            FaceObservation::BoundingBox(_) | FaceObservation::Absent => {
                self.backend.draw_passthrough(video, target)?;
            }
        }

        trace!(
            "Frame drawn: {:?}, {} triangles, brightness {:.2}",
            report.outcome,
            report.drawn_triangles,
            report.brightness
        );
        Ok(report)
    }

    fn fallback(&mut self, video: &Frame, face: FaceBox, target: &mut Frame) -> MosaicResult<FrameOutcome> {
        match face.scaled_y(self.face_scale_y).clamped() {
            Some(face) => {
                self.backend.draw_fallback(video, face, target)?;
                Ok(FrameOutcome::Fallback)
            }
            None => {
                self.backend.draw_passthrough(video, target)?;
                Ok(FrameOutcome::Passthrough)
            }
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn obfuscation(&self) -> &ObfuscationState {
        &self.obfuscation
    }

    pub fn map(&self) -> &CanonicalMap {
        &self.map
    }
}
