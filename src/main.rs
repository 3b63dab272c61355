//! # Facemosaic
//!
//! Runs the mosaic pipeline over a synthetic video and face, writing
//! composited frames to disk. Camera capture and on-screen presentation are
//! provided by the host application through the `video` and `landmarks`
//! traits; this binary drives the pipeline with procedural stand-ins.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use facemosaic::landmarks::FACE_MESH_LANDMARKS;
use facemosaic::synthetic::{FacePose, SyntheticFace, SyntheticVideo, VideoPattern};
use facemosaic::video::{FrameSink, NullSink, PngSink};
use facemosaic::{
    CanonicalMap, FrameLoop, GpuMosaicRenderer, MosaicBackend, MosaicConfig, MosaicPipeline,
    SoftwareRenderer,
};

#[derive(Parser)]
#[command(name = "facemosaic")]
#[command(about = "Face-locked anti-reversal mosaic over a live video stream")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/facemosaic/facemosaic.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Rendering backend: cpu or gpu (overrides the config file)
    #[arg(long)]
    backend: Option<String>,

    /// Number of frames to render (runs until Ctrl-C when omitted)
    #[arg(long)]
    frames: Option<u64>,

    /// Directory for PNG frame dumps
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write only every Nth frame to --output
    #[arg(long, default_value_t = 1)]
    every: u64,

    /// Tile grid as COLSxROWS, e.g. 12x16
    #[arg(long)]
    tiles: Option<String>,

    /// Disable tile scrambling and color perturbation
    #[arg(long)]
    no_scramble: bool,

    /// Disable geometry distortion
    #[arg(long)]
    no_distortion: bool,

    /// Head yaw of the synthetic face in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    yaw: f32,

    /// Canonical UV dataset (JSON); requires --triangles
    #[arg(long, requires = "triangles")]
    uvs: Option<PathBuf>,

    /// Canonical triangle dataset (JSON); requires --uvs
    #[arg(long, requires = "uvs")]
    triangles: Option<PathBuf>,

    /// Video width and height
    #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    #[arg(long, default_value_t = 480, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,
}

fn parse_tiles(grid: &str) -> Result<(u32, u32)> {
    let (u, v) = grid
        .split_once(['x', 'X'])
        .with_context(|| format!("Invalid tile grid '{}': expected COLSxROWS", grid))?;
    let u = u.trim().parse().with_context(|| format!("Invalid tile columns in '{}'", grid))?;
    let v = v.trim().parse().with_context(|| format!("Invalid tile rows in '{}'", grid))?;
    Ok((u, v))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting Facemosaic");
    info!(
        "📄 Version: {} (built {}, commit {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATE"),
        env!("GIT_COMMIT")
    );

    // Load configuration
    let mut config = match MosaicConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            warn!("⚠️ Could not load configuration: {:#}", e);
            info!("📝 Using default configuration");
            MosaicConfig::default()
        }
    };

    // Override config with CLI flags
    if let Some(backend) = &cli.backend {
        config.general.backend = backend.clone();
    }
    if let Some(tiles) = &cli.tiles {
        let (u, v) = parse_tiles(tiles)?;
        config.mosaic.tiles_u = u;
        config.mosaic.tiles_v = v;
    }
    if cli.no_scramble {
        config.scramble.enabled = false;
        info!("🚫 Tile scrambling disabled via CLI flag");
    }
    if cli.no_distortion {
        config.distortion.enabled = false;
        info!("🚫 Geometry distortion disabled via CLI flag");
    }
    config.general.debug |= cli.debug;
    config.validate().context("Invalid configuration after CLI overrides")?;

    let map = match (&cli.uvs, &cli.triangles) {
        (Some(uvs), Some(triangles)) => CanonicalMap::load(uvs, triangles, FACE_MESH_LANDMARKS)
            .context("Failed to load canonical mapping table")?,
        _ => SyntheticFace::canonical_map().context("Failed to build synthetic canonical table")?,
    };
    info!(
        "📐 Canonical table: {} landmarks, {} triangles",
        map.landmark_count(),
        map.triangles().len()
    );

    let sink: Box<dyn FrameSink> = match &cli.output {
        Some(dir) => Box::new(PngSink::new(dir, cli.every)?),
        None => Box::new(NullSink),
    };

    let backend: Box<dyn MosaicBackend> = match config.general.backend.as_str() {
        "gpu" => Box::new(
            GpuMosaicRenderer::new_blocking(&config, &map).context("Failed to initialize GPU renderer")?,
        ),
        _ => Box::new(SoftwareRenderer::new(&config)),
    };
    info!("🎛️ Rendering backend: {}", backend.name());

    let mut pipeline = MosaicPipeline::new(&config, map, backend);

    let video = SyntheticVideo::new(cli.width, cli.height, VideoPattern::Gradient);
    let video = match cli.frames {
        Some(frames) => video.with_frame_limit(frames),
        None => video,
    };
    let face = SyntheticFace::new(FacePose::default().with_yaw(cli.yaw))
        .with_warmup(3)
        .with_sway(0.05);

    let mut frame_loop = FrameLoop::new(video, face, sink)
        .with_max_fps(config.general.max_fps)
        .with_max_frames(cli.frames);

    let stop = frame_loop.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    match frame_loop.run(&mut pipeline) {
        Ok(stats) => {
            if stats.frames == 0 {
                warn!("⚠️ No frames were rendered");
            }
            info!("✅ Facemosaic shut down cleanly");
            Ok(())
        }
        Err(e) => {
            error!("❌ Frame loop failed: {:#}", e);
            Err(e)
        }
    }
}
