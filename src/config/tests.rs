//! Unit tests for configuration module
//!
//! Tests configuration parsing, validation, serialization/deserialization,
//! and edge cases in configuration handling.

use super::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_configuration_is_valid() {
    let config = MosaicConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.mosaic.tiles_u, 12);
    assert_eq!(config.mosaic.tiles_v, 16);
    assert!(config.distortion.enabled);
    assert!(config.scramble.enabled);
    assert!(config.blackout.enabled);
    assert_eq!(config.general.backend, "cpu");
}

#[test]
fn test_plain_pixelation_disables_obfuscation() {
    let config = MosaicConfig::plain_pixelation();

    assert!(config.validate().is_ok());
    assert!(!config.distortion.enabled);
    assert!(!config.scramble.enabled);
    assert!(!config.blackout.enabled);
    assert_eq!(config.mosaic.face_scale_y, 1.0);
}

#[test]
fn test_configuration_serialization_roundtrip() -> Result<()> {
    let original = MosaicConfig::default();

    let toml_string = toml::to_string(&original)?;
    let deserialized: MosaicConfig = toml::from_str(&toml_string)?;

    assert_eq!(original, deserialized);
    Ok(())
}

#[test]
fn test_configuration_from_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("facemosaic.toml");

    fs::write(
        &path,
        r#"
[mosaic]
tiles_u = 10
tiles_v = 14
canonical_resolution = 256

[scramble]
enabled = false
radius = 1
channel_shift = 0.0
green_gain = 1.0
"#,
    )?;

    let config = MosaicConfig::load(&path)?;
    assert_eq!(config.mosaic.tiles_u, 10);
    assert_eq!(config.mosaic.tiles_v, 14);
    assert_eq!(config.mosaic.canonical_resolution, 256);
    // Missing field falls back to its default
    assert_eq!(config.mosaic.face_scale_y, 1.1);
    assert!(!config.scramble.enabled);
    // Missing sections fall back to defaults
    assert_eq!(config.rotation, RotationConfig::default());
    Ok(())
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempdir().unwrap();
    let result = MosaicConfig::load(dir.path().join("nope.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_rejects_invalid_values() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
[mosaic]
tiles_u = 0
tiles_v = 16
canonical_resolution = 512
"#,
    )?;

    assert!(MosaicConfig::load(&path).is_err());
    Ok(())
}

#[test]
fn test_tiles_cannot_exceed_canonical_resolution() {
    let mut config = MosaicConfig::default();
    config.mosaic.canonical_resolution = 32;
    config.mosaic.tiles_u = 64;
    assert!(config.validate().is_err());

    // Equal is allowed: this is the identity pixelation
    config.mosaic.tiles_u = 32;
    config.mosaic.tiles_v = 32;
    assert!(config.validate().is_ok());
}

#[test]
fn test_jitter_must_be_smaller_than_base() {
    let mut config = MosaicConfig::default();
    config.rotation.geometry_jitter_ms = config.rotation.geometry_base_ms;
    assert!(config.validate().is_err());

    let mut config = MosaicConfig::default();
    config.rotation.color_jitter_ms = config.rotation.color_base_ms + 1;
    assert!(config.validate().is_err());
}

#[test]
fn test_blackout_must_fit_inside_rotation_interval() {
    let mut config = MosaicConfig::default();
    config.blackout.duration_ms = config.rotation.color_base_ms;
    assert!(config.validate().is_err());

    config.blackout.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_backend_rejected() {
    let mut config = MosaicConfig::default();
    config.general.backend = "vulkan".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_amplitude_bounds() {
    let mut config = MosaicConfig::default();
    config.distortion.amplitude = 0.5;
    assert!(config.validate().is_err());

    config.distortion.amplitude = 0.0;
    assert!(config.validate().is_ok());
}

#[test]
fn test_save_and_reload() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("saved.toml");

    let mut config = MosaicConfig::default();
    config.mosaic.tiles_u = 20;
    config.blackout.duration_ms = 300;
    config.save(&path)?;

    let reloaded = MosaicConfig::load(&path)?;
    assert_eq!(reloaded, config);
    Ok(())
}

#[test]
fn test_merge_partial_overrides_changed_sections_only() {
    let base = MosaicConfig::default();

    let mut partial = MosaicConfig::default();
    partial.scramble.radius = 4;

    let merged = base.merge_partial(partial);
    assert_eq!(merged.scramble.radius, 4);
    assert_eq!(merged.mosaic, MosaicGridConfig::default());
    assert_eq!(merged.blackout, BlackoutConfig::default());
}

#[test]
fn test_duration_helpers() {
    let config = MosaicConfig::default();
    assert_eq!(config.distortion.blend(), Duration::from_millis(400));
    assert_eq!(config.blackout.duration(), Duration::from_millis(250));
}
