//! Randomized obfuscation layer
//!
//! Two independent keys drive everything here:
//! - the geometry key selects the displacement field applied in Pass B
//! - the color key selects the tile scramble, the color perturbation, and
//!   triggers the boundary blackout
//!
//! [`ObfuscationState`] is owned by the render loop and advanced once per
//! frame, before drawing. It is never shared across threads.

pub mod blackout;
pub mod distortion;
pub mod key;
pub mod scramble;

pub use blackout::{BlackoutController, BlackoutPhase};
pub use distortion::{DisplacementField, GeometryDistortion};
pub use key::{
    EntropyKeySource, KeyKind, KeyRotation, KeyRotationState, KeyScheduler, KeySource, ObfuscationKey,
    RotationPhase, SeededKeySource,
};
pub use scramble::{ColorPerturbation, ScramblePermutation, TileScramble, TileScrambler};

use log::{debug, info};
use std::time::{Duration, Instant};

use crate::canonical::CanonicalMap;
use crate::config::MosaicConfig;

/// Which keys rotated during one [`ObfuscationState::advance`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationEvents {
    pub geometry: bool,
    pub color: bool,
}

/// Obfuscation inputs for drawing a single frame
#[derive(Debug)]
pub struct FrameParams<'a> {
    /// Face-relative per-landmark offsets, `None` when distortion is off
    pub displacement: Option<DisplacementField>,
    /// Scramble to apply in the tile pass
    pub scramble: &'a TileScramble,
    /// Multiplier for face pixels (blackout)
    pub brightness: f32,
}

/// Key schedulers plus every artifact derived from the keys
pub struct ObfuscationState {
    geometry_keys: KeyScheduler,
    color_keys: KeyScheduler,
    distortion: GeometryDistortion,
    distortion_enabled: bool,
    scrambler: TileScrambler,
    blackout: BlackoutController,
}

impl ObfuscationState {
    /// Seed both keys from OS entropy
    pub fn new(config: &MosaicConfig, map: &CanonicalMap, now: Instant) -> Self {
        Self::with_key_sources(
            config,
            map,
            Box::new(EntropyKeySource),
            Box::new(EntropyKeySource),
            now,
        )
    }

    /// Seed from explicit key sources. The two sources must be independent.
    pub fn with_key_sources(
        config: &MosaicConfig,
        map: &CanonicalMap,
        geometry_source: Box<dyn KeySource>,
        color_source: Box<dyn KeySource>,
        now: Instant,
    ) -> Self {
        let rotation = &config.rotation;
        let geometry_keys = KeyScheduler::new(
            KeyKind::Geometry,
            Duration::from_millis(rotation.geometry_base_ms),
            Duration::from_millis(rotation.geometry_jitter_ms),
            config.distortion.blend(),
            geometry_source,
            now,
        );
        let color_keys = KeyScheduler::new(
            KeyKind::Color,
            Duration::from_millis(rotation.color_base_ms),
            Duration::from_millis(rotation.color_jitter_ms),
            config.blackout.duration(),
            color_source,
            now,
        );

        let distortion = GeometryDistortion::new(&config.distortion, map, geometry_keys.key());
        let scrambler = TileScrambler::new(&config.mosaic, &config.scramble, color_keys.key());
        let blackout = BlackoutController::new(&config.blackout);

        info!(
            "🎲 Obfuscation seeded: distortion={}, scramble={}, blackout={}",
            config.distortion.enabled, config.scramble.enabled, blackout.enabled()
        );

        Self {
            geometry_keys,
            color_keys,
            distortion,
            distortion_enabled: config.distortion.enabled,
            scrambler,
            blackout,
        }
    }

    /// Check both rotation timers against `now` and rederive artifacts.
    pub fn advance(&mut self, now: Instant) -> RotationEvents {
        let mut events = RotationEvents::default();

        if let Some(rotation) = self.geometry_keys.update(now) {
            self.distortion.on_rotation(&rotation.key, now);
            events.geometry = true;
        }

        if let Some(rotation) = self.color_keys.update(now) {
            let hold = self.blackout.enabled();
            let still_fading_out = self.blackout.show_outgoing(now);
            self.scrambler.on_rotation(&rotation.key, hold, still_fading_out);
            self.blackout.start(now);
            events.color = true;
        }

        if events.geometry && events.color {
            debug!("Both keys rotated on the same frame");
        }
        events
    }

    /// Parameters for the frame drawn at `now`
    pub fn frame_params(&self, now: Instant) -> FrameParams<'_> {
        FrameParams {
            displacement: self.distortion_enabled.then(|| self.distortion.sample(now)),
            scramble: self.scrambler.active(self.blackout.show_outgoing(now)),
            brightness: self.blackout.brightness(now),
        }
    }

    pub fn scheduler(&self, kind: KeyKind) -> &KeyScheduler {
        match kind {
            KeyKind::Geometry => &self.geometry_keys,
            KeyKind::Color => &self.color_keys,
        }
    }

    pub fn next_rotation(&self, kind: KeyKind) -> Instant {
        self.scheduler(kind).next_rotation()
    }

    pub fn distortion(&self) -> &GeometryDistortion {
        &self.distortion
    }

    pub fn scrambler(&self) -> &TileScrambler {
        &self.scrambler
    }

    pub fn blackout(&self) -> &BlackoutController {
        &self.blackout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(config: &MosaicConfig, now: Instant) -> ObfuscationState {
        let map = CanonicalMap::synthetic_grid(18, 26).unwrap();
        ObfuscationState::with_key_sources(
            config,
            &map,
            Box::new(SeededKeySource::new(100)),
            Box::new(SeededKeySource::new(200)),
            now,
        )
    }

    #[test]
    fn test_first_frame_is_already_obfuscated() {
        let config = MosaicConfig::default();
        let now = Instant::now();
        let s = state(&config, now);
        let params = s.frame_params(now);

        assert!(params.displacement.unwrap().max_magnitude() > 0.0);
        assert!(!params.scramble.is_passthrough());
        assert_eq!(params.brightness, 1.0);
    }

    #[test]
    fn test_keys_rotate_independently() {
        let config = MosaicConfig::default();
        let t0 = Instant::now();
        let mut s = state(&config, t0);

        let color_at = s.next_rotation(KeyKind::Color);
        let geometry_at = s.next_rotation(KeyKind::Geometry);
        let first = color_at.min(geometry_at);

        let events = s.advance(first);
        assert_eq!(events.color, first == color_at);
        assert_eq!(events.geometry, first == geometry_at);
    }

    #[test]
    fn test_color_rotation_triggers_blackout_and_swaps_at_midpoint() {
        let config = MosaicConfig::default();
        let t0 = Instant::now();
        let mut s = state(&config, t0);
        let before = s.scrambler().current().clone();

        let at = s.next_rotation(KeyKind::Color);
        assert!(s.advance(at).color);
        let after = s.scrambler().current().clone();
        assert_ne!(before, after);

        let quarter = at + config.blackout.duration() / 4;
        let three_quarters = at + config.blackout.duration() * 3 / 4;
        assert_eq!(s.frame_params(quarter).scramble, &before);
        assert!(s.frame_params(quarter).brightness < 1.0);
        assert_eq!(s.frame_params(three_quarters).scramble, &after);
        assert_eq!(s.frame_params(at + config.blackout.duration()).brightness, 1.0);
    }

    #[test]
    fn test_disabled_layers_produce_neutral_params() {
        let config = MosaicConfig::plain_pixelation();
        let t0 = Instant::now();
        let mut s = state(&config, t0);
        let at = s.next_rotation(KeyKind::Color);
        s.advance(at);

        let params = s.frame_params(at + Duration::from_millis(10));
        assert!(params.displacement.is_none());
        assert!(params.scramble.is_passthrough());
        assert_eq!(params.brightness, 1.0);
    }
}
