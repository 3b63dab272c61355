//! End-to-end rendering properties checked on the software backend

use std::collections::HashSet;
use std::time::{Duration, Instant};

use facemosaic::geometry::GeometryBuilder;
use facemosaic::obfuscation::{KeyKind, ObfuscationState, SeededKeySource};
use facemosaic::synthetic::{FacePose, SyntheticFace};
use facemosaic::{
    FaceBox, FaceObservation, Frame, FrameOutcome, MosaicConfig, MosaicPipeline, SoftwareRenderer,
};

const SIZE: u32 = 256;

fn gradient_video() -> Frame {
    Frame::from_fn(SIZE, SIZE, |x, y| [x as u8, y as u8, 96, 255])
}

fn seeded_pipeline(config: &MosaicConfig, now: Instant) -> MosaicPipeline<SoftwareRenderer> {
    let map = SyntheticFace::canonical_map().unwrap();
    let obfuscation = ObfuscationState::with_key_sources(
        config,
        &map,
        Box::new(SeededKeySource::new(11)),
        Box::new(SeededKeySource::new(23)),
        now,
    );
    MosaicPipeline::with_obfuscation(config, map, obfuscation, SoftwareRenderer::new(config))
}

fn draw(
    pipeline: &mut MosaicPipeline<SoftwareRenderer>,
    video: &Frame,
    observation: &FaceObservation,
    now: Instant,
) -> (Frame, FrameOutcome) {
    let mut target = Frame::new(SIZE, SIZE, [0, 0, 0, 0]);
    let report = pipeline.draw_frame(video, observation, now, &mut target).unwrap();
    (target, report.outcome)
}

fn mask_of(pipeline: &MosaicPipeline<SoftwareRenderer>) -> Vec<bool> {
    let renderer = pipeline.backend();
    (0..SIZE * SIZE)
        .map(|i| renderer.mask_at(i % SIZE, i / SIZE))
        .collect()
}

#[test]
fn test_identity_pixelation_round_trip() {
    let mut config = MosaicConfig::plain_pixelation();
    config.mosaic.canonical_resolution = 128;
    config.mosaic.tiles_u = 128;
    config.mosaic.tiles_v = 128;

    let video = gradient_video();
    let face = FaceObservation::Mesh(SyntheticFace::landmarks(&FacePose::default()));
    let mut pipeline = seeded_pipeline(&config, Instant::now());
    let (output, outcome) = draw(&mut pipeline, &video, &face, Instant::now());
    assert_eq!(outcome, FrameOutcome::Mesh);

    let mask = mask_of(&pipeline);
    let masked = mask.iter().filter(|&&m| m).count();
    assert!(masked > 5000, "face covers only {} pixels", masked);

    let mut total = 0u64;
    let mut worst = 0u8;
    for (i, inside) in mask.iter().enumerate() {
        if !inside {
            continue;
        }
        let (x, y) = (i as u32 % SIZE, i as u32 / SIZE);
        let (a, b) = (output.get(x, y), video.get(x, y));
        let err = (0..3).map(|c| a[c].abs_diff(b[c])).max().unwrap_or(0);
        worst = worst.max(err);
        total += err as u64;
    }
    let mean = total as f64 / masked as f64;
    assert!(mean <= 2.0, "mean reconstruction error {:.2}", mean);
    assert!(worst <= 8, "worst reconstruction error {}", worst);
}

#[test]
fn test_twelve_by_sixteen_blocks_inside_silhouette_only() {
    let mut config = MosaicConfig::plain_pixelation();
    config.mosaic.tiles_u = 12;
    config.mosaic.tiles_v = 16;

    let video = gradient_video();
    let pose = FacePose {
        center: [0.5, 0.5],
        width: 0.6,
        height: 0.8,
        yaw_degrees: 0.0,
    };
    let face = FaceObservation::Mesh(SyntheticFace::landmarks(&pose));
    let mut pipeline = seeded_pipeline(&config, Instant::now());
    let (output, _) = draw(&mut pipeline, &video, &face, Instant::now());

    let mask = mask_of(&pipeline);
    let mut colors = HashSet::new();
    for (i, inside) in mask.iter().enumerate() {
        let (x, y) = (i as u32 % SIZE, i as u32 / SIZE);
        if *inside {
            colors.insert(output.get(x, y));
        } else {
            assert_eq!(output.get(x, y), video.get(x, y), "background changed at ({}, {})", x, y);
        }
    }
    assert_eq!(colors.len(), 12 * 16);
}

#[test]
fn test_absent_face_passes_video_through() {
    let config = MosaicConfig::default();
    let video = gradient_video();
    let mut pipeline = seeded_pipeline(&config, Instant::now());

    let (output, outcome) = draw(&mut pipeline, &video, &FaceObservation::Absent, Instant::now());
    assert_eq!(outcome, FrameOutcome::Passthrough);
    assert_eq!(output, video);
}

#[test]
fn test_bounding_box_fallback_stays_inside_box() {
    let mut config = MosaicConfig::default();
    config.mosaic.face_scale_y = 1.0;
    let video = gradient_video();
    let face = FaceBox::new(0.25, 0.25, 0.75, 0.75);
    let mut pipeline = seeded_pipeline(&config, Instant::now());

    let (output, outcome) = draw(&mut pipeline, &video, &FaceObservation::BoundingBox(face), Instant::now());
    assert_eq!(outcome, FrameOutcome::Fallback);

    let mut changed = 0;
    for y in 0..SIZE {
        for x in 0..SIZE {
            let inside = (64..192).contains(&x) && (64..192).contains(&y);
            if !inside {
                assert_eq!(output.get(x, y), video.get(x, y));
            } else if output.get(x, y) != video.get(x, y) {
                changed += 1;
            }
        }
    }
    assert!(changed > 0);
    // One flat block per tile
    assert_eq!(output.get(64, 64), output.get(70, 70));
}

#[test]
fn test_blackout_darkens_face_only() {
    let mut config = MosaicConfig::default();
    config.distortion.enabled = false;
    let duration = config.blackout.duration();

    let start = Instant::now();
    let video = gradient_video();
    let face = FaceObservation::Mesh(SyntheticFace::landmarks(&FacePose::default()));
    let mut pipeline = seeded_pipeline(&config, start);
    let at = pipeline.obfuscation().next_rotation(KeyKind::Color);

    let mut lumas = Vec::new();
    for (i, now) in [at, at + duration / 2, at + duration].into_iter().enumerate() {
        let mut target = Frame::new(SIZE, SIZE, [0, 0, 0, 0]);
        let report = pipeline.draw_frame(&video, &face, now, &mut target).unwrap();
        if i == 0 {
            assert!(report.rotations.color);
        }
        assert_eq!(report.outcome, FrameOutcome::Mesh);

        let mask = mask_of(&pipeline);
        for (p, inside) in mask.iter().enumerate() {
            let (x, y) = (p as u32 % SIZE, p as u32 / SIZE);
            if !inside {
                assert_eq!(target.get(x, y), video.get(x, y));
            }
        }
        let luma = target
            .mean_luma_where(|x, y| mask[(y * SIZE + x) as usize])
            .unwrap();
        lumas.push(luma);
    }

    assert!(lumas[1] + 10.0 < lumas[0], "midpoint {:.1} vs start {:.1}", lumas[1], lumas[0]);
    assert!(lumas[1] + 10.0 < lumas[2], "midpoint {:.1} vs end {:.1}", lumas[1], lumas[2]);
}

#[test]
fn test_yawed_head_occludes_far_side() {
    let config = MosaicConfig::plain_pixelation();
    let pose = FacePose {
        center: [0.5, 0.5],
        width: 0.5,
        height: 0.6,
        yaw_degrees: 45.0,
    };
    let landmarks = SyntheticFace::landmarks(&pose);

    // x = center - 0.9 * radius lies on both the near and the far surface
    let (px, py) = (70u32, 128u32);
    let sample_point = [(px as f32 + 0.5) / SIZE as f32, (py as f32 + 0.5) / SIZE as f32];

    let map = SyntheticFace::canonical_map().unwrap();
    let geometry = GeometryBuilder::new(&map, 1.0).build(&landmarks, None);
    let covering: Vec<f32> = geometry
        .rewrap
        .chunks_exact(3)
        .filter(|tri| contains(tri.iter().map(|v| [v.position[0], v.position[1]]), sample_point))
        .map(|tri| tri.iter().map(|v| v.position[2]).sum::<f32>() / 3.0)
        .collect();
    assert!(covering.iter().any(|&z| z > 0.5), "no far-side triangle under the sample point");
    assert!(covering.iter().any(|&z| z < 0.5), "no near-side triangle under the sample point");

    let video = gradient_video();
    let mut pipeline = seeded_pipeline(&config, Instant::now());
    draw(&mut pipeline, &video, &FaceObservation::Mesh(landmarks), Instant::now());

    let renderer = pipeline.backend();
    assert!(renderer.mask_at(px, py));
    assert!(renderer.depth_at(px, py) < 0.5, "depth {}", renderer.depth_at(px, py));
}

#[test]
fn test_tracking_recovers_after_dropout() {
    let config = MosaicConfig::plain_pixelation();
    let video = gradient_video();
    let mesh = FaceObservation::Mesh(SyntheticFace::landmarks(&FacePose::default()));
    let start = Instant::now();
    let mut pipeline = seeded_pipeline(&config, start);

    let (first, _) = draw(&mut pipeline, &video, &mesh, start);
    let (lost, outcome) = draw(&mut pipeline, &video, &FaceObservation::Absent, start + Duration::from_millis(16));
    assert_eq!(outcome, FrameOutcome::Passthrough);
    assert_eq!(lost, video);
    let (again, outcome) = draw(&mut pipeline, &video, &mesh, start + Duration::from_millis(33));
    assert_eq!(outcome, FrameOutcome::Mesh);
    assert_eq!(again, first);
}

fn contains(mut points: impl Iterator<Item = [f32; 2]>, p: [f32; 2]) -> bool {
    let (Some(a), Some(b), Some(c)) = (points.next(), points.next(), points.next()) else {
        return false;
    };
    let edge = |a: [f32; 2], b: [f32; 2]| (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
    let (d0, d1, d2) = (edge(a, b), edge(b, c), edge(c, a));
    (d0 >= 0.0 && d1 >= 0.0 && d2 >= 0.0) || (d0 <= 0.0 && d1 <= 0.0 && d2 <= 0.0)
}
