//! Tile scramble and color perturbation
//!
//! For each destination tile the scramble picks a source tile at a random
//! non-zero offset within a Chebyshev radius, reflected back into the grid at
//! the edges. Nearby sources keep a face-like silhouette while breaking the
//! exact spatial correspondence. Each tile then gets red/blue shifts and a
//! green attenuation so the output never matches the true colors and never
//! drifts into chroma-key green.

use log::debug;
use rand::Rng;

use super::key::ObfuscationKey;
use crate::config::{MosaicGridConfig, ScrambleConfig};

const PERMUTATION_DOMAIN: u64 = 0x7065_726d;
const PERTURBATION_DOMAIN: u64 = 0x636f_6c72;

/// Destination tile -> source tile mapping over a `tiles_u` x `tiles_v` grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScramblePermutation {
    tiles_u: u32,
    tiles_v: u32,
    source: Vec<u32>,
}

impl ScramblePermutation {
    pub fn identity(tiles_u: u32, tiles_v: u32) -> Self {
        Self {
            tiles_u,
            tiles_v,
            source: (0..tiles_u * tiles_v).collect(),
        }
    }

    /// Key-derived neighbour mapping; `radius == 0` gives the identity
    pub fn derive(key: &ObfuscationKey, tiles_u: u32, tiles_v: u32, radius: u32) -> Self {
        if radius == 0 {
            return Self::identity(tiles_u, tiles_v);
        }

        let mut rng = key.derive_rng(PERMUTATION_DOMAIN);
        let r = radius as i64;
        let mut source = Vec::with_capacity((tiles_u * tiles_v) as usize);
        for y in 0..tiles_v {
            for x in 0..tiles_u {
                let (dx, dy) = loop {
                    let offset = (rng.gen_range(-r..=r), rng.gen_range(-r..=r));
                    if offset != (0, 0) {
                        break offset;
                    }
                };
                let sx = reflect(x as i64 + dx, tiles_u);
                let sy = reflect(y as i64 + dy, tiles_v);
                source.push(sy * tiles_u + sx);
            }
        }

        Self {
            tiles_u,
            tiles_v,
            source,
        }
    }

    pub fn grid(&self) -> (u32, u32) {
        (self.tiles_u, self.tiles_v)
    }

    /// Source tile for destination tile `(x, y)`
    pub fn source_of(&self, x: u32, y: u32) -> (u32, u32) {
        let s = self.source[(y * self.tiles_u + x) as usize];
        (s % self.tiles_u, s / self.tiles_u)
    }

    pub fn sources(&self) -> &[u32] {
        &self.source
    }

    pub fn is_identity(&self) -> bool {
        self.source.iter().enumerate().all(|(i, &s)| i as u32 == s)
    }

    /// Fraction of tiles that draw from themselves
    pub fn fixed_point_ratio(&self) -> f32 {
        let fixed = self
            .source
            .iter()
            .enumerate()
            .filter(|&(i, &s)| i as u32 == s)
            .count();
        fixed as f32 / self.source.len().max(1) as f32
    }
}

/// Mirror an out-of-range index back into `[0, n)`
fn reflect(i: i64, n: u32) -> u32 {
    let n = n as i64;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= n {
        i = 2 * (n - 1) - i;
    }
    i.clamp(0, n - 1) as u32
}

/// Per-tile channel shifts plus a green attenuation
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPerturbation {
    /// (red, blue) additive shift per tile
    shifts: Vec<[f32; 2]>,
    green_gain: f32,
}

impl ColorPerturbation {
    pub fn neutral(tiles: usize) -> Self {
        Self {
            shifts: vec![[0.0, 0.0]; tiles],
            green_gain: 1.0,
        }
    }

    /// Key-derived shifts: a global offset plus per-tile variation, each
    /// channel bounded by `channel_shift`
    pub fn derive(key: &ObfuscationKey, tiles: usize, channel_shift: f32, green_gain: f32) -> Self {
        let mut rng = key.derive_rng(PERTURBATION_DOMAIN);
        let half = channel_shift * 0.5;
        let draw = |rng: &mut rand::rngs::StdRng, bound: f32| {
            if bound > 0.0 {
                rng.gen_range(-bound..=bound)
            } else {
                0.0
            }
        };
        let global = [draw(&mut rng, half), draw(&mut rng, half)];
        let shifts = (0..tiles)
            .map(|_| [global[0] + draw(&mut rng, half), global[1] + draw(&mut rng, half)])
            .collect();
        let green_gain = green_gain * rng.gen_range(0.9..=1.0);

        Self { shifts, green_gain }
    }

    /// Apply to a linear RGBA color of tile `tile`
    #[inline]
    pub fn apply(&self, tile: usize, color: [f32; 4]) -> [f32; 4] {
        let [dr, db] = self.shifts[tile];
        [
            (color[0] + dr).clamp(0.0, 1.0),
            color[1] * self.green_gain,
            (color[2] + db).clamp(0.0, 1.0),
            color[3],
        ]
    }

    pub fn shift(&self, tile: usize) -> [f32; 2] {
        self.shifts[tile]
    }

    pub fn green_gain(&self) -> f32 {
        self.green_gain
    }

    pub fn is_neutral(&self) -> bool {
        self.green_gain == 1.0 && self.shifts.iter().all(|s| *s == [0.0, 0.0])
    }
}

/// Everything the scramble pass needs for one color key
#[derive(Debug, Clone, PartialEq)]
pub struct TileScramble {
    pub permutation: ScramblePermutation,
    pub perturbation: ColorPerturbation,
}

impl TileScramble {
    pub fn passthrough(tiles_u: u32, tiles_v: u32) -> Self {
        Self {
            permutation: ScramblePermutation::identity(tiles_u, tiles_v),
            perturbation: ColorPerturbation::neutral((tiles_u * tiles_v) as usize),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.permutation.is_identity() && self.perturbation.is_neutral()
    }
}

/// Owns the current scramble and, during a blackout, the outgoing one
pub struct TileScrambler {
    enabled: bool,
    tiles_u: u32,
    tiles_v: u32,
    radius: u32,
    channel_shift: f32,
    green_gain: f32,
    current: TileScramble,
    outgoing: Option<TileScramble>,
}

impl TileScrambler {
    pub fn new(grid: &MosaicGridConfig, config: &ScrambleConfig, key: &ObfuscationKey) -> Self {
        let mut scrambler = Self {
            enabled: config.enabled,
            tiles_u: grid.tiles_u,
            tiles_v: grid.tiles_v,
            radius: config.radius,
            channel_shift: config.channel_shift,
            green_gain: config.green_gain,
            current: TileScramble::passthrough(grid.tiles_u, grid.tiles_v),
            outgoing: None,
        };
        scrambler.current = scrambler.derive(key);
        scrambler
    }

    fn derive(&self, key: &ObfuscationKey) -> TileScramble {
        if !self.enabled {
            return TileScramble::passthrough(self.tiles_u, self.tiles_v);
        }
        TileScramble {
            permutation: ScramblePermutation::derive(key, self.tiles_u, self.tiles_v, self.radius),
            perturbation: ColorPerturbation::derive(
                key,
                (self.tiles_u * self.tiles_v) as usize,
                self.channel_shift,
                self.green_gain,
            ),
        }
    }

    /// Replace the scramble for a new color key.
    ///
    /// `hold_outgoing` keeps the replaced scramble around for a blackout.
    /// `keep_outgoing` is true while that blackout is still showing an older
    /// outgoing scramble; that one then stays outgoing. Otherwise the
    /// scramble currently on screen becomes the outgoing one.
    pub fn on_rotation(&mut self, key: &ObfuscationKey, hold_outgoing: bool, keep_outgoing: bool) {
        let next = self.derive(key);
        let previous = std::mem::replace(&mut self.current, next);
        if !hold_outgoing {
            self.outgoing = None;
        } else if !(keep_outgoing && self.outgoing.is_some()) {
            self.outgoing = Some(previous);
        }
        debug!(
            "Tile scramble rederived ({} fixed points)",
            (self.current.permutation.fixed_point_ratio() * (self.tiles_u * self.tiles_v) as f32) as u32
        );
    }

    /// Scramble to render: the outgoing one while `show_outgoing`, if any
    pub fn active(&self, show_outgoing: bool) -> &TileScramble {
        match (&self.outgoing, show_outgoing) {
            (Some(outgoing), true) => outgoing,
            _ => &self.current,
        }
    }

    pub fn current(&self) -> &TileScramble {
        &self.current
    }

    pub fn outgoing(&self) -> Option<&TileScramble> {
        self.outgoing.as_ref()
    }

    pub fn grid(&self) -> (u32, u32) {
        (self.tiles_u, self.tiles_v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::key::{KeySource, SeededKeySource};

    #[test]
    fn test_reflect_keeps_indices_in_grid() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-2, 5), 2);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(6, 5), 2);
        assert_eq!(reflect(3, 1), 0);
        assert_eq!(reflect(-3, 1), 0);
    }

    #[test]
    fn test_permutation_stays_within_radius() {
        let mut keys = SeededKeySource::new(11);
        for radius in 1..=3 {
            let p = ScramblePermutation::derive(&keys.draw(), 12, 16, radius);
            for y in 0..16 {
                for x in 0..12 {
                    let (sx, sy) = p.source_of(x, y);
                    assert!(sx < 12 && sy < 16);
                    assert!((sx as i64 - x as i64).abs() <= radius as i64);
                    assert!((sy as i64 - y as i64).abs() <= radius as i64);
                }
            }
        }
    }

    #[test]
    fn test_interior_tiles_never_map_to_themselves() {
        let p = ScramblePermutation::derive(&SeededKeySource::new(12).draw(), 12, 16, 2);
        for y in 2..14 {
            for x in 2..10 {
                assert_ne!(p.source_of(x, y), (x, y));
            }
        }
        assert!(p.fixed_point_ratio() < 0.1);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let p = ScramblePermutation::derive(&SeededKeySource::new(13).draw(), 4, 4, 0);
        assert!(p.is_identity());
    }

    #[test]
    fn test_perturbation_is_bounded_and_suppresses_green() {
        let c = ColorPerturbation::derive(&SeededKeySource::new(14).draw(), 64, 0.2, 0.8);
        for t in 0..64 {
            let [r, b] = c.shift(t);
            assert!(r.abs() <= 0.2 + 1e-6 && b.abs() <= 0.2 + 1e-6);
        }
        assert!(c.green_gain() <= 0.8 && c.green_gain() >= 0.72);

        let out = c.apply(0, [0.5, 1.0, 0.5, 1.0]);
        assert!(out[1] <= 0.8);
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn test_neutral_perturbation_is_identity() {
        let c = ColorPerturbation::neutral(4);
        assert!(c.is_neutral());
        assert_eq!(c.apply(2, [0.1, 0.2, 0.3, 0.4]), [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_disabled_scrambler_is_passthrough() {
        let grid = MosaicGridConfig::default();
        let config = ScrambleConfig {
            enabled: false,
            ..ScrambleConfig::default()
        };
        let mut keys = SeededKeySource::new(15);
        let mut scrambler = TileScrambler::new(&grid, &config, &keys.draw());
        assert!(scrambler.current().is_passthrough());
        scrambler.on_rotation(&keys.draw(), false, false);
        assert!(scrambler.current().is_passthrough());
    }

    #[test]
    fn test_outgoing_is_held_for_blackout() {
        let grid = MosaicGridConfig::default();
        let mut keys = SeededKeySource::new(16);
        let mut scrambler = TileScrambler::new(&grid, &ScrambleConfig::default(), &keys.draw());
        let first = scrambler.current().clone();

        scrambler.on_rotation(&keys.draw(), true, false);
        let second = scrambler.current().clone();
        assert_eq!(scrambler.active(true), &first);
        assert_eq!(scrambler.active(false), &second);

        // Rotating again while the first is still on screen keeps it outgoing
        scrambler.on_rotation(&keys.draw(), true, true);
        assert_eq!(scrambler.active(true), &first);
        assert_ne!(scrambler.current(), &second);

        // Without a blackout nothing is held
        scrambler.on_rotation(&keys.draw(), false, false);
        assert!(scrambler.outgoing().is_none());
    }
}
