//! Video sources and frame sinks
//!
//! The pipeline pulls decoded frames from a [`VideoSource`] and pushes every
//! composited frame into a [`FrameSink`]. Camera capture and on-screen
//! presentation live outside this crate behind these two traits.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::Frame;
use crate::pipeline::FrameReport;

/// A decoded frame and its presentation timestamp
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: Frame,
    pub timestamp: Duration,
}

/// Yields frames one render tick at a time.
///
/// `next_frame` must not block indefinitely; `None` means the stream ended
/// or was stopped.
pub trait VideoSource {
    fn next_frame(&mut self) -> Option<VideoFrame>;

    /// Frame size in pixels
    fn size(&self) -> (u32, u32);
}

/// Receives every composited frame
pub trait FrameSink {
    fn consume(&mut self, index: u64, frame: &Frame, report: &FrameReport) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn consume(&mut self, index: u64, frame: &Frame, report: &FrameReport) -> Result<()> {
        (**self).consume(index, frame, report)
    }
}

/// Discards frames
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn consume(&mut self, _index: u64, _frame: &Frame, _report: &FrameReport) -> Result<()> {
        Ok(())
    }
}

/// Writes every `every`-th frame as `frame_00042.png` into a directory
#[derive(Debug)]
pub struct PngSink {
    dir: PathBuf,
    every: u64,
    written: u64,
}

impl PngSink {
    pub fn new<P: AsRef<Path>>(dir: P, every: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        info!("💾 Writing frames to {}", dir.display());
        Ok(Self {
            dir,
            every: every.max(1),
            written: 0,
        })
    }

    pub fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:05}.png", index))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PngSink {
    fn consume(&mut self, index: u64, frame: &Frame, report: &FrameReport) -> Result<()> {
        if index % self.every != 0 {
            return Ok(());
        }
        let path = self.path_for(index);
        frame.save_png(&path)?;
        self.written += 1;
        debug!("Saved frame {} ({:?}) to {}", index, report.outcome, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::RotationEvents;
    use crate::pipeline::FrameOutcome;
    use tempfile::TempDir;

    fn report() -> FrameReport {
        FrameReport {
            outcome: FrameOutcome::Passthrough,
            skipped_triangles: 0,
            drawn_triangles: 0,
            brightness: 1.0,
            rotations: RotationEvents::default(),
        }
    }

    #[test]
    fn test_png_sink_writes_every_nth_frame() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = PngSink::new(temp_dir.path().join("frames"), 2).unwrap();
        let frame = Frame::new(4, 4, [10, 20, 30, 255]);

        for index in 0..5 {
            sink.consume(index, &frame, &report()).unwrap();
        }

        assert_eq!(sink.written(), 3);
        assert!(sink.path_for(0).exists());
        assert!(!sink.path_for(1).exists());
        assert!(sink.path_for(4).exists());
    }
}
