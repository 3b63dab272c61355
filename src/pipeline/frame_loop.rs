//! Single-threaded frame loop
//!
//! One frame in, one frame out: pull a video frame, wait for its landmarks,
//! draw, hand the result to the sink. The stop flag is checked before every
//! pipeline invocation so raising it halts the loop at the next frame
//! boundary; the frame currently being drawn always completes.

use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{FrameOutcome, FrameReport, MosaicBackend, MosaicPipeline};
use crate::frame::Frame;
use crate::landmarks::LandmarkSource;
use crate::video::{FrameSink, VideoSource};

/// Counters aggregated over a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub mesh_frames: u64,
    pub fallback_frames: u64,
    pub passthrough_frames: u64,
    pub geometry_rotations: u64,
    pub color_rotations: u64,
    pub skipped_triangles: u64,
    total_frame_time: Duration,
}

impl FrameStats {
    fn record(&mut self, report: &FrameReport, elapsed: Duration) {
        self.frames += 1;
        match report.outcome {
            FrameOutcome::Mesh => self.mesh_frames += 1,
            FrameOutcome::Fallback => self.fallback_frames += 1,
            FrameOutcome::Passthrough => self.passthrough_frames += 1,
        }
        self.geometry_rotations += report.rotations.geometry as u64;
        self.color_rotations += report.rotations.color as u64;
        self.skipped_triangles += report.skipped_triangles as u64;
        self.total_frame_time += elapsed;
    }

    /// Mean time spent in detection plus drawing
    pub fn average_frame_time(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        self.total_frame_time / self.frames as u32
    }

    pub fn log_summary(&self) {
        info!(
            "📊 {} frames ({} mesh, {} fallback, {} passthrough), avg {:.2} ms",
            self.frames,
            self.mesh_frames,
            self.fallback_frames,
            self.passthrough_frames,
            self.average_frame_time().as_secs_f64() * 1000.0
        );
        info!(
            "🔑 {} geometry rotations, {} color rotations, {} skipped triangles",
            self.geometry_rotations, self.color_rotations, self.skipped_triangles
        );
    }
}

/// Drives a [`MosaicPipeline`] from a video source until it ends or is stopped
pub struct FrameLoop<V, L, S> {
    video: V,
    landmarks: L,
    sink: S,
    stop: Arc<AtomicBool>,
    frame_budget: Option<Duration>,
    max_frames: Option<u64>,
}

impl<V: VideoSource, L: LandmarkSource, S: FrameSink> FrameLoop<V, L, S> {
    pub fn new(video: V, landmarks: L, sink: S) -> Self {
        Self {
            video,
            landmarks,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            frame_budget: None,
            max_frames: None,
        }
    }

    /// Cap the loop at `fps` frames per second (0 = unlimited)
    pub fn with_max_fps(mut self, fps: u32) -> Self {
        self.frame_budget = (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        self
    }

    pub fn with_max_frames(mut self, frames: Option<u64>) -> Self {
        self.max_frames = frames;
        self
    }

    /// Shared flag; setting it stops the loop before the next frame
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn run<B: MosaicBackend>(&mut self, pipeline: &mut MosaicPipeline<B>) -> Result<FrameStats> {
        let (width, height) = self.video.size();
        let mut target = Frame::new(width, height, [0, 0, 0, 0]);
        let mut stats = FrameStats::default();

        info!("▶️ Frame loop started ({}x{}, backend '{}')", width, height, pipeline.backend().name());

        loop {
            if self.stopped() {
                info!("⏹️ Stop requested");
                break;
            }
            if self.max_frames.is_some_and(|max| stats.frames >= max) {
                break;
            }
            let Some(frame) = self.video.next_frame() else {
                debug!("Video source ended");
                break;
            };

            if frame.image.size() != target.size() {
                let (width, height) = frame.image.size();
                info!("📏 Video size changed to {}x{}", width, height);
                target = Frame::new(width, height, [0, 0, 0, 0]);
            }

            let started = Instant::now();
            let observation = self.landmarks.detect(&frame.image, frame.timestamp);
            // The source may have been stopped while inference was running
            if self.stopped() {
                info!("⏹️ Stop requested");
                break;
            }

            let report = pipeline
                .draw_frame(&frame.image, &observation, Instant::now(), &mut target)
                .with_context(|| format!("Failed to draw frame {}", stats.frames))?;
            let index = stats.frames;
            stats.record(&report, started.elapsed());
            self.sink.consume(index, &target, &report)?;

            if let Some(budget) = self.frame_budget {
                let elapsed = started.elapsed();
                if elapsed < budget {
                    std::thread::sleep(budget - elapsed);
                }
            }
        }

        stats.log_summary();
        Ok(stats)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
