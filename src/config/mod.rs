//! Configuration management for facemosaic
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. The resulting [`MosaicConfig`] is built once at startup
//! and handed by reference to every component of the pipeline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration struct containing all mosaic settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MosaicConfig {
    /// Tile grid and canonical face-space settings
    #[serde(default)]
    pub mosaic: MosaicGridConfig,

    /// Geometry distortion settings
    #[serde(default)]
    pub distortion: DistortionConfig,

    /// Key rotation timing
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Tile scramble and color perturbation
    #[serde(default)]
    pub scramble: ScrambleConfig,

    /// Boundary blackout on color-key rotation
    #[serde(default)]
    pub blackout: BlackoutConfig,

    /// Bounding-box fallback pixelation
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// General runtime settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Pixelation grid and canonical render target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MosaicGridConfig {
    /// Number of tile columns in canonical face-space
    pub tiles_u: u32,

    /// Number of tile rows in canonical face-space
    pub tiles_v: u32,

    /// Side length of the square canonical render target (texels)
    pub canonical_resolution: u32,

    /// Vertical extension of the covered face region around its centroid.
    /// 1.0 covers exactly the tracked mesh; larger values reach past the
    /// hairline and chin.
    #[serde(default = "MosaicGridConfig::default_face_scale_y")]
    pub face_scale_y: f32,
}

/// Geometry distortion engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistortionConfig {
    /// Enable per-landmark displacement
    pub enabled: bool,

    /// Maximum displacement as a fraction of face size (0.0-0.1)
    pub amplitude: f32,

    /// Linear blend window between old and new field (milliseconds)
    pub blend_ms: u64,

    /// Number of sinusoidal components summed into the field
    #[serde(default = "DistortionConfig::default_components")]
    pub components: u32,
}

/// Jittered rotation timing for both keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RotationConfig {
    /// Geometry key base interval (milliseconds)
    pub geometry_base_ms: u64,

    /// Geometry key signed jitter bound (milliseconds)
    pub geometry_jitter_ms: u64,

    /// Color key base interval (milliseconds)
    pub color_base_ms: u64,

    /// Color key signed jitter bound (milliseconds)
    pub color_jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrambleConfig {
    /// Enable tile scrambling and color perturbation
    pub enabled: bool,

    /// Chebyshev radius (in tiles) for source tile selection
    pub radius: u32,

    /// Maximum red/blue channel shift (0.0-1.0)
    pub channel_shift: f32,

    /// Multiplier applied to the green channel (0.0-1.0)
    pub green_gain: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlackoutConfig {
    /// Enable the fade-to-black transition on color-key rotation
    pub enabled: bool,

    /// Total fade duration, out and back in (milliseconds)
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackConfig {
    /// Pixelate the detector bounding box while no landmarks are available
    pub enabled: bool,

    /// Tile columns over the bounding box
    pub tiles_u: u32,

    /// Tile rows over the bounding box
    pub tiles_v: u32,
}

/// General runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,

    /// Rendering backend ("cpu" or "gpu")
    pub backend: String,

    /// Max FPS limit (0 = unlimited)
    pub max_fps: u32,
}

impl Default for MosaicGridConfig {
    fn default() -> Self {
        Self {
            tiles_u: 12,
            tiles_v: 16,
            canonical_resolution: 512,
            face_scale_y: Self::default_face_scale_y(),
        }
    }
}

impl MosaicGridConfig {
    fn default_face_scale_y() -> f32 {
        1.1
    }
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            amplitude: 0.035,
            blend_ms: 400,
            components: Self::default_components(),
        }
    }
}

impl DistortionConfig {
    fn default_components() -> u32 {
        4
    }

    pub fn blend(&self) -> Duration {
        Duration::from_millis(self.blend_ms)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            geometry_base_ms: 2000,
            geometry_jitter_ms: 600,
            color_base_ms: 1500,
            color_jitter_ms: 500,
        }
    }
}

impl Default for ScrambleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 2,
            channel_shift: 0.12,
            green_gain: 0.8,
        }
    }
}

impl Default for BlackoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 250,
        }
    }
}

impl BlackoutConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tiles_u: 8,
            tiles_v: 10,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debug: false,
            backend: "cpu".to_string(),
            max_fps: 60,
        }
    }
}

impl MosaicConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            let rest = path.strip_prefix("~").unwrap_or(path);
            Path::new(&home).join(rest)
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: MosaicConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let grid = &self.mosaic;
        if !(16..=4096).contains(&grid.canonical_resolution) {
            anyhow::bail!(
                "Invalid canonical_resolution {}: must be between 16 and 4096",
                grid.canonical_resolution
            );
        }
        if grid.tiles_u == 0 || grid.tiles_v == 0 {
            anyhow::bail!("Invalid tile grid: tiles_u and tiles_v must be non-zero");
        }
        if grid.tiles_u > grid.canonical_resolution || grid.tiles_v > grid.canonical_resolution {
            anyhow::bail!(
                "Invalid tile grid {}x{}: cannot exceed canonical resolution {}",
                grid.tiles_u,
                grid.tiles_v,
                grid.canonical_resolution
            );
        }
        if !(1.0..=2.0).contains(&grid.face_scale_y) {
            anyhow::bail!("Invalid face_scale_y: must be between 1.0 and 2.0");
        }

        if !(0.0..=0.1).contains(&self.distortion.amplitude) {
            anyhow::bail!("Invalid distortion amplitude: must be between 0.0 and 0.1");
        }
        if self.distortion.enabled && self.distortion.blend_ms == 0 {
            anyhow::bail!("Invalid distortion blend_ms: must be non-zero when enabled");
        }
        if self.distortion.components == 0 {
            anyhow::bail!("Invalid distortion components: must be non-zero");
        }

        let rotation = &self.rotation;
        if rotation.geometry_jitter_ms >= rotation.geometry_base_ms {
            anyhow::bail!("Invalid geometry rotation: jitter must be smaller than base interval");
        }
        if rotation.color_jitter_ms >= rotation.color_base_ms {
            anyhow::bail!("Invalid color rotation: jitter must be smaller than base interval");
        }

        if !(0.0..=1.0).contains(&self.scramble.green_gain) {
            anyhow::bail!("Invalid green_gain: must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.scramble.channel_shift) {
            anyhow::bail!("Invalid channel_shift: must be between 0.0 and 1.0");
        }

        if self.blackout.enabled && self.blackout.duration_ms == 0 {
            anyhow::bail!("Invalid blackout duration_ms: must be non-zero when enabled");
        }
        if self.blackout.enabled && self.blackout.duration_ms >= rotation.color_base_ms - rotation.color_jitter_ms {
            anyhow::bail!("Invalid blackout duration_ms: must be shorter than the minimum color rotation interval");
        }

        if self.fallback.tiles_u == 0 || self.fallback.tiles_v == 0 {
            anyhow::bail!("Invalid fallback grid: tiles_u and tiles_v must be non-zero");
        }

        let valid_backends = ["cpu", "gpu"];
        if !valid_backends.contains(&self.general.backend.as_str()) {
            anyhow::bail!("Invalid backend: {}", self.general.backend);
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Merge a partial configuration into this one
    /// Non-default sections from the partial config override this config
    pub fn merge_partial(mut self, partial: MosaicConfig) -> Self {
        let default_config = MosaicConfig::default();

        if partial.mosaic != default_config.mosaic {
            self.mosaic = partial.mosaic;
        }
        if partial.distortion != default_config.distortion {
            self.distortion = partial.distortion;
        }
        if partial.rotation != default_config.rotation {
            self.rotation = partial.rotation;
        }
        if partial.scramble != default_config.scramble {
            self.scramble = partial.scramble;
        }
        if partial.blackout != default_config.blackout {
            self.blackout = partial.blackout;
        }
        if partial.fallback != default_config.fallback {
            self.fallback = partial.fallback;
        }
        if partial.general != default_config.general {
            self.general = partial.general;
        }

        self
    }

    /// Configuration with every obfuscation layer switched off.
    ///
    /// Pixelation still happens; distortion, scrambling and blackout do not.
    pub fn plain_pixelation() -> Self {
        let mut config = Self::default();
        config.distortion.enabled = false;
        config.scramble.enabled = false;
        config.blackout.enabled = false;
        config.mosaic.face_scale_y = 1.0;
        config
    }
}

#[cfg(test)]
mod tests;

#[cfg(test)]
mod property_tests;
