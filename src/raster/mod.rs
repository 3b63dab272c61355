//! Software rendering backend
//!
//! Runs the full mosaic frame on the CPU with the same pass structure as the
//! GPU renderer: unwrap, downsample, scramble, upsample, rewrap with depth,
//! composite. Slower, but deterministic and available everywhere, which makes
//! it the reference the integration tests check against.

pub mod passes;
pub mod texture;
pub mod triangle;

pub use texture::{DepthBuffer, Texture};

use log::{debug, info, trace};

use crate::config::MosaicConfig;
use crate::error::MosaicResult;
use crate::frame::Frame;
use crate::landmarks::FaceBox;
use crate::pipeline::{MeshDraw, MosaicBackend};

/// CPU implementation of [`MosaicBackend`]
pub struct SoftwareRenderer {
    canonical: Texture,
    tiles: Texture,
    scrambled: Texture,
    pixelated: Texture,
    face: Texture,
    depth: DepthBuffer,
    fallback_tiles: (u32, u32),
}

impl SoftwareRenderer {
    /// Allocate every intermediate target once
    pub fn new(config: &MosaicConfig) -> Self {
        let res = config.mosaic.canonical_resolution;
        let (tiles_u, tiles_v) = (config.mosaic.tiles_u, config.mosaic.tiles_v);
        info!(
            "🖌️ Software renderer: canonical {}x{}, {}x{} tiles",
            res, res, tiles_u, tiles_v
        );

        Self {
            canonical: Texture::new(res, res),
            tiles: Texture::new(tiles_u, tiles_v),
            scrambled: Texture::new(tiles_u, tiles_v),
            pixelated: Texture::new(res, res),
            face: Texture::new(0, 0),
            depth: DepthBuffer::new(0, 0),
            fallback_tiles: (config.fallback.tiles_u, config.fallback.tiles_v),
        }
    }

    /// Screen targets follow the video size; reallocated only when it changes
    fn ensure_screen_targets(&mut self, width: u32, height: u32) {
        if self.face.resize(width, height) {
            debug!("Software screen targets resized to {}x{}", width, height);
        }
        self.depth.resize(width, height);
    }

    /// Depth of the front-most face fragment at a screen pixel from the last
    /// mesh frame ([`texture::DEPTH_CLEAR`] where nothing was drawn)
    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        self.depth.get(x, y)
    }

    /// Whether a screen pixel was inside the face silhouette last mesh frame
    pub fn mask_at(&self, x: u32, y: u32) -> bool {
        self.face.get(x, y)[3] > 0.0
    }

    pub fn canonical(&self) -> &Texture {
        &self.canonical
    }

    pub fn tiles(&self) -> &Texture {
        &self.tiles
    }

    pub fn scrambled(&self) -> &Texture {
        &self.scrambled
    }
}

impl MosaicBackend for SoftwareRenderer {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn draw_mesh(&mut self, video: &Frame, mesh: &MeshDraw<'_>, target: &mut Frame) -> MosaicResult<()> {
        let (width, height) = video.size();
        self.ensure_screen_targets(width, height);

        let covered = passes::unwrap(video, &mesh.geometry.unwrap, &mut self.canonical);
        passes::downsample(&self.canonical, &mut self.tiles);
        passes::scramble(&self.tiles, mesh.scramble, &mut self.scrambled);
        passes::upsample(&self.scrambled, &mut self.pixelated);
        let fragments = passes::rewrap(&self.pixelated, &mesh.geometry.rewrap, &mut self.face, &mut self.depth);
        passes::composite(video, &self.face, mesh.brightness, target);

        trace!(
            "Software mesh frame: {} canonical texels, {} face fragments, brightness {:.2}",
            covered,
            fragments,
            mesh.brightness
        );
        Ok(())
    }

    fn draw_fallback(&mut self, video: &Frame, face: FaceBox, target: &mut Frame) -> MosaicResult<()> {
        let (tiles_u, tiles_v) = self.fallback_tiles;
        passes::pixelate_box(video, face, tiles_u, tiles_v, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalMap;
    use crate::geometry::GeometryBuilder;
    use crate::landmarks::{Landmark, LandmarkSet};
    use crate::obfuscation::TileScramble;

    fn flat_face(map: &CanonicalMap, cols: u32, rows: u32) -> LandmarkSet {
        let points = (0..map.landmark_count())
            .map(|i| {
                let (c, r) = ((i as u32 % cols) as f32, (i as u32 / cols) as f32);
                Landmark::new(
                    0.25 + 0.5 * c / (cols - 1) as f32,
                    0.25 + 0.5 * r / (rows - 1) as f32,
                    0.0,
                )
            })
            .collect();
        LandmarkSet::new(points)
    }

    #[test]
    fn test_mesh_frame_masks_only_the_face() {
        let mut config = MosaicConfig::plain_pixelation();
        config.mosaic.canonical_resolution = 64;
        config.mosaic.tiles_u = 4;
        config.mosaic.tiles_v = 4;
        let map = CanonicalMap::synthetic_grid(5, 5).unwrap();
        let geometry = GeometryBuilder::new(&map, 1.0).build(&flat_face(&map, 5, 5), None);
        let scramble = TileScramble::passthrough(4, 4);

        let video = Frame::from_fn(32, 32, |x, y| [(x * 8) as u8, (y * 8) as u8, 100, 255]);
        let mut target = Frame::new(32, 32, [0, 0, 0, 0]);
        let mut renderer = SoftwareRenderer::new(&config);
        renderer
            .draw_mesh(
                &video,
                &MeshDraw {
                    geometry: &geometry,
                    scramble: &scramble,
                    brightness: 1.0,
                },
                &mut target,
            )
            .unwrap();

        assert!(renderer.mask_at(16, 16));
        assert!(!renderer.mask_at(2, 2));
        assert_eq!(target.get(2, 2), video.get(2, 2));
        // Inside one screen block of 4x4 pixels the color is flat
        assert_eq!(target.get(9, 9), target.get(10, 10));
        assert!(renderer.depth_at(16, 16) < texture::DEPTH_CLEAR);
    }
}
