//! Startup error taxonomy
//!
//! Everything here is fatal: the pipeline refuses to start. Tracking loss and
//! malformed per-frame data are not errors and are reported through
//! [`crate::pipeline::FrameReport`] instead.

use thiserror::Error;

/// Resource initialization failures surfaced before the first frame.
#[derive(Debug, Error)]
pub enum MosaicError {
    /// Canonical mapping dataset is missing, malformed, or inconsistent
    #[error("canonical mapping table is invalid: {0}")]
    CanonicalData(String),

    /// A WGSL shader failed to compile or a pipeline failed to link
    #[error("shader `{shader}` failed to build: {message}")]
    ShaderCompilation { shader: String, message: String },

    /// A render target could not be created with the requested shape
    #[error("framebuffer `{target}` is incomplete: {message}")]
    Framebuffer { target: String, message: String },

    /// No GPU adapter satisfied the request
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// The GPU device could not be created
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    /// A frame did not match the size the pipeline was created for
    #[error("frame is {actual_width}x{actual_height}, pipeline expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// Mapping a GPU readback buffer failed
    #[error("failed to read back `{target}`: {message}")]
    Readback { target: String, message: String },

    #[error("failed to read canonical dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse canonical dataset: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MosaicResult<T> = std::result::Result<T, MosaicError>;
