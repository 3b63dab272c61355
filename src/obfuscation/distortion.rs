//! Geometry distortion engine
//!
//! A geometry key deterministically selects a smooth per-landmark 3D
//! displacement field. Rotations never snap: the field in effect at the moment
//! of rotation blends linearly into the newly derived one over a fixed window.

use cgmath::{InnerSpace, Vector3, Zero};
use log::debug;
use rand::Rng;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use super::key::ObfuscationKey;
use crate::canonical::CanonicalMap;
use crate::config::DistortionConfig;

const GEOMETRY_DOMAIN: u64 = 0x6765_6f6d;

/// Spatial frequency range (cycles per canonical unit). Low frequencies keep
/// neighbouring landmarks moving together so the mesh cannot fold.
const MIN_FREQUENCY: f32 = 0.25;
const MAX_FREQUENCY: f32 = 0.75;

/// Depth displacement relative to the in-plane amplitude
const DEPTH_RATIO: f32 = 0.5;

/// One face-relative 3D offset per landmark
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    offsets: Vec<Vector3<f32>>,
}

/// One sinusoidal term of a displacement axis
#[derive(Debug, Clone, Copy)]
struct Wave {
    frequency: [f32; 2],
    phase: f32,
    weight: f32,
}

impl Wave {
    fn random<R: Rng>(rng: &mut R) -> Self {
        let mut component = || {
            let f = rng.gen_range(MIN_FREQUENCY..=MAX_FREQUENCY);
            if rng.gen_bool(0.5) {
                f
            } else {
                -f
            }
        };
        let frequency = [component(), component()];
        Self {
            frequency,
            phase: rng.gen_range(0.0..TAU),
            weight: rng.gen_range(0.5..=1.0),
        }
    }

    fn eval(&self, uv: [f32; 2]) -> f32 {
        self.weight * (TAU * (self.frequency[0] * uv[0] + self.frequency[1] * uv[1]) + self.phase).sin()
    }
}

impl DisplacementField {
    pub fn zero(landmarks: usize) -> Self {
        Self {
            offsets: vec![Vector3::zero(); landmarks],
        }
    }

    /// Derive the field for `key`. Each axis is a normalized sum of
    /// `components` waves over canonical (u, v), so |offset.x|, |offset.y|
    /// never exceed `amplitude`.
    pub fn derive(key: &ObfuscationKey, uvs: &[[f32; 2]], amplitude: f32, components: u32) -> Self {
        let mut rng = key.derive_rng(GEOMETRY_DOMAIN);
        let axes: [Vec<Wave>; 3] =
            std::array::from_fn(|_| (0..components.max(1)).map(|_| Wave::random(&mut rng)).collect());
        let norms: [f32; 3] = std::array::from_fn(|a| axes[a].iter().map(|w| w.weight).sum());
        let scales = [amplitude, amplitude, amplitude * DEPTH_RATIO];

        let offsets = uvs
            .iter()
            .map(|&uv| {
                let axis = |a: usize| {
                    axes[a].iter().map(|w| w.eval(uv)).sum::<f32>() / norms[a] * scales[a]
                };
                Vector3::new(axis(0), axis(1), axis(2))
            })
            .collect();

        Self { offsets }
    }

    /// Linear interpolation `self -> other` at `t` in [0, 1]
    pub fn lerp(&self, other: &DisplacementField, t: f32) -> DisplacementField {
        let t = t.clamp(0.0, 1.0);
        let offsets = self
            .offsets
            .iter()
            .zip(&other.offsets)
            .map(|(&a, &b)| a + (b - a) * t)
            .collect();
        DisplacementField { offsets }
    }

    pub fn offsets(&self) -> &[Vector3<f32>] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Largest offset length in the field
    pub fn max_magnitude(&self) -> f32 {
        self.offsets.iter().map(|o| o.magnitude()).fold(0.0, f32::max)
    }
}

/// Holds the previous and current fields and blends between them
pub struct GeometryDistortion {
    amplitude: f32,
    components: u32,
    blend: Duration,
    uvs: Vec<[f32; 2]>,
    previous: DisplacementField,
    current: DisplacementField,
    blend_start: Option<Instant>,
}

impl GeometryDistortion {
    /// Start static on the field derived from the initial key
    pub fn new(config: &DistortionConfig, map: &CanonicalMap, key: &ObfuscationKey) -> Self {
        let amplitude = if config.enabled { config.amplitude } else { 0.0 };
        let uvs = map.uvs().to_vec();
        let current = DisplacementField::derive(key, &uvs, amplitude, config.components);
        Self {
            amplitude,
            components: config.components,
            blend: config.blend(),
            uvs,
            previous: current.clone(),
            current,
            blend_start: None,
        }
    }

    /// React to a geometry-key rotation at `now`.
    ///
    /// An unfinished blend is cut over: the new blend starts from whatever
    /// field is on screen right now.
    pub fn on_rotation(&mut self, key: &ObfuscationKey, now: Instant) {
        let on_screen = self.sample(now);
        if self.is_blending(now) {
            debug!("Geometry blend cut over at {:.2}", self.blend_progress(now));
        }
        self.previous = on_screen;
        self.current = DisplacementField::derive(key, &self.uvs, self.amplitude, self.components);
        self.blend_start = Some(now);
    }

    /// Blend progress in [0, 1]; 1 when no blend is running
    pub fn blend_progress(&self, now: Instant) -> f32 {
        match self.blend_start {
            Some(start) if !self.blend.is_zero() => {
                let elapsed = now.saturating_duration_since(start);
                (elapsed.as_secs_f32() / self.blend.as_secs_f32()).min(1.0)
            }
            _ => 1.0,
        }
    }

    pub fn is_blending(&self, now: Instant) -> bool {
        self.blend_progress(now) < 1.0
    }

    /// Field in effect at `now`
    pub fn sample(&self, now: Instant) -> DisplacementField {
        let t = self.blend_progress(now);
        if t >= 1.0 {
            self.current.clone()
        } else {
            self.previous.lerp(&self.current, t)
        }
    }

    pub fn current(&self) -> &DisplacementField {
        &self.current
    }

    pub fn previous(&self) -> &DisplacementField {
        &self.previous
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::key::{KeySource, SeededKeySource};

    fn engine(source: &mut SeededKeySource) -> (GeometryDistortion, CanonicalMap) {
        let map = CanonicalMap::synthetic_grid(18, 26).unwrap();
        let config = DistortionConfig::default();
        (GeometryDistortion::new(&config, &map, &source.draw()), map)
    }

    #[test]
    fn test_derivation_is_deterministic_per_key() {
        let map = CanonicalMap::synthetic_grid(6, 6).unwrap();
        let mut source = SeededKeySource::new(1);
        let key = source.draw();
        let a = DisplacementField::derive(&key, map.uvs(), 0.05, 4);
        let b = DisplacementField::derive(&key, map.uvs(), 0.05, 4);
        let c = DisplacementField::derive(&source.draw(), map.uvs(), 0.05, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_amplitude_bounds_every_offset() {
        let map = CanonicalMap::synthetic_grid(18, 26).unwrap();
        let mut source = SeededKeySource::new(2);
        for _ in 0..20 {
            let field = DisplacementField::derive(&source.draw(), map.uvs(), 0.04, 5);
            for o in field.offsets() {
                assert!(o.x.abs() <= 0.04 + 1e-6);
                assert!(o.y.abs() <= 0.04 + 1e-6);
                assert!(o.z.abs() <= 0.02 + 1e-6);
            }
        }
    }

    #[test]
    fn test_zero_amplitude_gives_zero_field() {
        let map = CanonicalMap::synthetic_grid(4, 4).unwrap();
        let field = DisplacementField::derive(&SeededKeySource::new(3).draw(), map.uvs(), 0.0, 3);
        assert_eq!(field, DisplacementField::zero(16));
    }

    #[test]
    fn test_no_blend_before_first_rotation() {
        let mut source = SeededKeySource::new(4);
        let (engine, _) = engine(&mut source);
        let now = Instant::now();
        assert!(!engine.is_blending(now));
        assert_eq!(&engine.sample(now), engine.current());
    }

    #[test]
    fn test_blend_endpoints_and_midpoint() {
        let mut source = SeededKeySource::new(5);
        let (mut engine, _) = engine(&mut source);
        let t0 = Instant::now();
        let old = engine.sample(t0);

        engine.on_rotation(&source.draw(), t0);
        let new = engine.current().clone();
        assert_ne!(old, new);

        assert_eq!(engine.sample(t0), old);
        assert_eq!(engine.sample(t0 + Duration::from_millis(400)), new);

        let mid = engine.sample(t0 + Duration::from_millis(200));
        let expected = old.lerp(&new, 0.5);
        for (a, b) in mid.offsets().iter().zip(expected.offsets()) {
            assert!((*a - *b).magnitude() < 1e-4);
        }
    }

    #[test]
    fn test_cut_over_starts_from_on_screen_field() {
        let mut source = SeededKeySource::new(6);
        let (mut engine, _) = engine(&mut source);
        let t0 = Instant::now();

        engine.on_rotation(&source.draw(), t0);
        let t1 = t0 + Duration::from_millis(100);
        let on_screen = engine.sample(t1);

        engine.on_rotation(&source.draw(), t1);
        assert_eq!(engine.previous(), &on_screen);
        assert_eq!(engine.sample(t1), on_screen);
        assert!(engine.is_blending(t1 + Duration::from_millis(399)));
        assert!(!engine.is_blending(t1 + Duration::from_millis(400)));
    }

    #[test]
    fn test_disabled_engine_stays_at_zero() {
        let map = CanonicalMap::synthetic_grid(4, 4).unwrap();
        let config = DistortionConfig {
            enabled: false,
            ..DistortionConfig::default()
        };
        let mut source = SeededKeySource::new(8);
        let mut engine = GeometryDistortion::new(&config, &map, &source.draw());
        let now = Instant::now();
        engine.on_rotation(&source.draw(), now);
        assert_eq!(engine.sample(now + Duration::from_millis(10)).max_magnitude(), 0.0);
    }
}
