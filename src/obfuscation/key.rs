//! Obfuscation keys and their jittered rotation schedule
//!
//! Each key cycles `Active -> Rotating -> Active`. A rotation draws a
//! completely fresh key from the key source; nothing is carried over from the
//! previous key. The next rotation is scheduled at
//! `now + base + uniform(-jitter, +jitter)`, resampled every time.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::fmt;
use std::time::{Duration, Instant};

/// Size of an obfuscation key in bytes
pub const KEY_BYTES: usize = 32;

/// Opaque pseudo-random key material
#[derive(Clone, PartialEq, Eq)]
pub struct ObfuscationKey([u8; KEY_BYTES]);

impl ObfuscationKey {
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Deterministic generator for one derived artifact.
    ///
    /// `domain` separates artifacts derived from the same key so that, e.g.,
    /// the tile permutation and the color shifts never share a stream.
    pub fn derive_rng(&self, domain: u64) -> StdRng {
        let mut seed = self.0;
        for (i, b) in domain.to_le_bytes().iter().enumerate() {
            seed[i] ^= b;
            seed[KEY_BYTES - 1 - i] ^= b.rotate_left(3);
        }
        StdRng::from_seed(seed)
    }
}

// Key material stays out of logs
impl fmt::Debug for ObfuscationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObfuscationKey(..)")
    }
}

/// Supplies fresh keys on every rotation
pub trait KeySource {
    fn draw(&mut self) -> ObfuscationKey;
}

/// Reseeds a generator from OS entropy for every key.
#[derive(Debug, Default)]
pub struct EntropyKeySource;

impl KeySource for EntropyKeySource {
    fn draw(&mut self) -> ObfuscationKey {
        let mut bytes = [0u8; KEY_BYTES];
        StdRng::from_entropy().fill_bytes(&mut bytes);
        ObfuscationKey(bytes)
    }
}

/// Reproducible key stream for tests, benches and demo recordings
#[derive(Debug)]
pub struct SeededKeySource {
    rng: StdRng,
}

impl SeededKeySource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl KeySource for SeededKeySource {
    fn draw(&mut self) -> ObfuscationKey {
        let mut bytes = [0u8; KEY_BYTES];
        self.rng.fill_bytes(&mut bytes);
        ObfuscationKey(bytes)
    }
}

/// Which of the two independent keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Drives the displacement field
    Geometry,
    /// Drives tile scrambling, color perturbation and blackout
    Color,
}

/// Scheduler state for a single key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    /// Steady: derived artifacts are valid and static
    Active,
    /// A new key was drawn and its transition is still running
    Rotating,
}

/// Timestamps and transition progress of one key
#[derive(Debug, Clone, Copy)]
pub struct KeyRotationState {
    pub last_rotation: Instant,
    pub next_rotation: Instant,
    /// Length of the transition that follows each rotation
    pub transition: Duration,
    /// Whether any rotation (beyond the initial seeding) has happened
    pub rotated: bool,
}

/// Emitted when a key is replaced
#[derive(Debug, Clone)]
pub struct KeyRotation {
    pub kind: KeyKind,
    pub key: ObfuscationKey,
    pub at: Instant,
    /// Time since the previous rotation (or since seeding)
    pub interval: Duration,
}

/// Jittered timer plus the current key for one [`KeyKind`]
pub struct KeyScheduler {
    kind: KeyKind,
    base: Duration,
    jitter: Duration,
    key: ObfuscationKey,
    state: KeyRotationState,
    source: Box<dyn KeySource>,
    jitter_rng: StdRng,
    rotations: u64,
}

impl KeyScheduler {
    /// Seed the key immediately and enter `Active`
    pub fn new(
        kind: KeyKind,
        base: Duration,
        jitter: Duration,
        transition: Duration,
        mut source: Box<dyn KeySource>,
        now: Instant,
    ) -> Self {
        let key = source.draw();
        let mut jitter_rng = StdRng::from_entropy();
        let next_rotation = now + Self::sample_interval(&mut jitter_rng, base, jitter);

        debug!("🔑 Seeded {:?} key, first rotation in {:?}", kind, next_rotation - now);

        Self {
            kind,
            base,
            jitter,
            key,
            state: KeyRotationState {
                last_rotation: now,
                next_rotation,
                transition,
                rotated: false,
            },
            source,
            jitter_rng,
            rotations: 0,
        }
    }

    fn sample_interval(rng: &mut StdRng, base: Duration, jitter: Duration) -> Duration {
        let t: f64 = rng.gen_range(-1.0..=1.0);
        let offset = Duration::try_from_secs_f64(jitter.as_secs_f64() * t.abs())
            .unwrap_or(jitter)
            .min(jitter);
        if t >= 0.0 {
            base.saturating_add(offset)
        } else {
            base.saturating_sub(offset)
        }
    }

    /// Check the timer; rotates at most once per call.
    pub fn update(&mut self, now: Instant) -> Option<KeyRotation> {
        if now < self.state.next_rotation {
            return None;
        }

        self.key = self.source.draw();
        let interval = now.saturating_duration_since(self.state.last_rotation);
        self.state.last_rotation = now;
        self.state.next_rotation = now + Self::sample_interval(&mut self.jitter_rng, self.base, self.jitter);
        self.state.rotated = true;
        self.rotations += 1;

        debug!(
            "🔄 {:?} key rotated after {:?} (#{}), next in {:?}",
            self.kind,
            interval,
            self.rotations,
            self.state.next_rotation - now
        );

        Some(KeyRotation {
            kind: self.kind,
            key: self.key.clone(),
            at: now,
            interval,
        })
    }

    pub fn phase(&self, now: Instant) -> RotationPhase {
        if self.state.rotated
            && now.saturating_duration_since(self.state.last_rotation) < self.state.transition
        {
            RotationPhase::Rotating
        } else {
            RotationPhase::Active
        }
    }

    /// Transition progress since the last rotation in [0, 1]
    pub fn progress(&self, now: Instant) -> f32 {
        if !self.state.rotated || self.state.transition.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.state.last_rotation);
        (elapsed.as_secs_f32() / self.state.transition.as_secs_f32()).min(1.0)
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn key(&self) -> &ObfuscationKey {
        &self.key
    }

    pub fn state(&self) -> &KeyRotationState {
        &self.state
    }

    pub fn next_rotation(&self) -> Instant {
        self.state.next_rotation
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Inclusive bounds every scheduled interval falls within
    pub fn interval_bounds(&self) -> (Duration, Duration) {
        (self.base.saturating_sub(self.jitter), self.base + self.jitter)
    }
}
