//! # Facemosaic
//!
//! Face-locked, anti-reversal mosaic rendering for live video.
//!
//! ## Architecture
//!
//! - `canonical`: canonical face-space table (per-landmark UVs + triangles)
//! - `geometry`: per-frame vertex streams for the unwrap and rewrap passes
//! - `obfuscation`: rotating keys, distortion, tile scramble, blackout
//! - `raster`: software rendering backend
//! - `renderer`: wgpu rendering backend
//! - `pipeline`: per-frame draw entry point and frame loop
//! - `video` / `synthetic`: frame sources, sinks and procedural stand-ins
//! - `config`: configuration parsing and validation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use facemosaic::synthetic::{FacePose, SyntheticFace, SyntheticVideo, VideoPattern};
//! use facemosaic::video::NullSink;
//! use facemosaic::{FrameLoop, MosaicConfig, MosaicPipeline, SoftwareRenderer};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = MosaicConfig::default();
//!     let map = SyntheticFace::canonical_map()?;
//!     let backend = SoftwareRenderer::new(&config);
//!     let mut pipeline = MosaicPipeline::new(&config, map, backend);
//!
//!     let video = SyntheticVideo::new(640, 480, VideoPattern::Gradient).with_frame_limit(60);
//!     let face = SyntheticFace::new(FacePose::default());
//!     FrameLoop::new(video, face, NullSink).run(&mut pipeline)?;
//!     Ok(())
//! }
//! ```

pub mod canonical;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod landmarks;
pub mod obfuscation;
pub mod pipeline;
pub mod raster;
pub mod renderer;
pub mod synthetic;
pub mod video;

// Re-export main types for easy access
pub use canonical::CanonicalMap;
pub use config::MosaicConfig;
pub use error::{MosaicError, MosaicResult};
pub use frame::Frame;
pub use landmarks::{FaceBox, FaceObservation, Landmark, LandmarkSet, LandmarkSource, PixelRect};
pub use pipeline::{FrameLoop, FrameOutcome, FrameReport, FrameStats, MeshDraw, MosaicBackend, MosaicPipeline};
pub use raster::SoftwareRenderer;
pub use renderer::GpuMosaicRenderer;
