//! Boundary blackout on color-key rotation
//!
//! The face region fades to black and back over a fixed window. The first
//! half still shows the outgoing scramble, the second half the new one, so no
//! frame ever carries both patterns. Pixels outside the face mask are never
//! touched; the gating itself happens in the composite step of each backend.

use log::debug;
use std::time::{Duration, Instant};

use crate::config::BlackoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlackoutPhase {
    Idle,
    /// Darkening; the outgoing scramble is on screen
    FadingOut,
    /// Brightening; the new scramble is on screen
    FadingIn,
}

pub struct BlackoutController {
    enabled: bool,
    duration: Duration,
    started: Option<Instant>,
}

impl BlackoutController {
    pub fn new(config: &BlackoutConfig) -> Self {
        Self {
            enabled: config.enabled && !config.duration().is_zero(),
            duration: config.duration(),
            started: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Start a fade at `now`.
    ///
    /// A fade already in flight is cut over: the new one resumes darkening
    /// from the current brightness instead of jumping back to full.
    pub fn start(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        let brightness = self.brightness(now);
        let lead = self.duration.mul_f32((1.0 - brightness) * 0.5);
        if lead > Duration::ZERO {
            debug!("Blackout restarted at brightness {:.2}", brightness);
        }
        self.started = Some(now.checked_sub(lead).unwrap_or(now));
    }

    /// Window progress in [0, 1], `None` when idle
    fn progress(&self, now: Instant) -> Option<f32> {
        let start = self.started?;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.duration {
            return None;
        }
        Some(elapsed.as_secs_f32() / self.duration.as_secs_f32())
    }

    /// Multiplier for face pixels: 1 at both window ends, 0 at the midpoint
    pub fn brightness(&self, now: Instant) -> f32 {
        match self.progress(now) {
            Some(p) => (1.0 - 2.0 * p).abs(),
            None => 1.0,
        }
    }

    pub fn phase(&self, now: Instant) -> BlackoutPhase {
        match self.progress(now) {
            Some(p) if p < 0.5 => BlackoutPhase::FadingOut,
            Some(_) => BlackoutPhase::FadingIn,
            None => BlackoutPhase::Idle,
        }
    }

    /// Whether the previous scramble should still be displayed
    pub fn show_outgoing(&self, now: Instant) -> bool {
        self.phase(now) == BlackoutPhase::FadingOut
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.phase(now) != BlackoutPhase::Idle
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
