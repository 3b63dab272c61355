//! Property-based tests for configuration module
//!
//! These tests use proptest to generate random configurations and verify
//! invariants, serialization round-trips, and edge case handling.

use super::*;
use proptest::prelude::*;

// Strategy for generating valid grid configurations
prop_compose! {
    fn valid_grid_config()(
        canonical_resolution in 16u32..1024u32,
        face_scale_y in 1.0f32..2.0f32,
    )(
        tiles_u in 1u32..=canonical_resolution.min(64),
        tiles_v in 1u32..=canonical_resolution.min(64),
        canonical_resolution in Just(canonical_resolution),
        face_scale_y in Just(face_scale_y),
    ) -> MosaicGridConfig {
        MosaicGridConfig {
            tiles_u,
            tiles_v,
            canonical_resolution,
            face_scale_y,
        }
    }
}

// Strategy for generating valid rotation timing
prop_compose! {
    fn valid_rotation_config()(
        geometry_base_ms in 500u64..10_000u64,
        color_base_ms in 500u64..10_000u64,
        geometry_jitter_frac in 0.0f64..0.9f64,
        color_jitter_frac in 0.0f64..0.4f64,
    ) -> RotationConfig {
        RotationConfig {
            geometry_base_ms,
            geometry_jitter_ms: (geometry_base_ms as f64 * geometry_jitter_frac) as u64,
            color_base_ms,
            color_jitter_ms: (color_base_ms as f64 * color_jitter_frac) as u64,
        }
    }
}

prop_compose! {
    fn valid_scramble_config()(
        enabled in any::<bool>(),
        radius in 0u32..8u32,
        channel_shift in 0.0f32..1.0f32,
        green_gain in 0.0f32..1.0f32,
    ) -> ScrambleConfig {
        ScrambleConfig {
            enabled,
            radius,
            channel_shift,
            green_gain,
        }
    }
}

prop_compose! {
    fn valid_config()(
        mosaic in valid_grid_config(),
        rotation in valid_rotation_config(),
        scramble in valid_scramble_config(),
        amplitude in 0.0f32..0.1f32,
        blend_ms in 1u64..2000u64,
        blackout_ms in 1u64..250u64,
    ) -> MosaicConfig {
        let mut config = MosaicConfig {
            mosaic,
            rotation,
            scramble,
            ..MosaicConfig::default()
        };
        config.distortion.amplitude = amplitude;
        config.distortion.blend_ms = blend_ms;
        config.blackout.duration_ms = blackout_ms;
        config
    }
}

proptest! {
    #[test]
    fn prop_generated_configs_validate(config in valid_config()) {
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_toml_roundtrip_preserves_config(config in valid_config()) {
        let serialized = toml::to_string(&config).unwrap();
        let parsed: MosaicConfig = toml::from_str(&serialized).unwrap();
        prop_assert_eq!(parsed.mosaic.tiles_u, config.mosaic.tiles_u);
        prop_assert_eq!(parsed.mosaic.tiles_v, config.mosaic.tiles_v);
        prop_assert_eq!(parsed.rotation, config.rotation);
        prop_assert_eq!(parsed.blackout, config.blackout);
        prop_assert!((parsed.distortion.amplitude - config.distortion.amplitude).abs() < 1e-6);
    }

    #[test]
    fn prop_oversized_tiles_rejected(extra in 1u32..100u32) {
        let mut config = MosaicConfig::default();
        config.mosaic.tiles_v = config.mosaic.canonical_resolution + extra;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn prop_out_of_range_green_gain_rejected(gain in 1.01f32..10.0f32) {
        let mut config = MosaicConfig::default();
        config.scramble.green_gain = gain;
        prop_assert!(config.validate().is_err());
    }
}
