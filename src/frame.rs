//! RGBA8 frame buffers
//!
//! [`Frame`] is the unit exchanged with video sources, landmark sources and
//! sinks. Pixels are stored row-major, straight (non-premultiplied) alpha.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// A single RGBA8 pixel
pub type Rgba8 = [u8; 4];

/// Row-major RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
}

impl Frame {
    /// Create a frame filled with one color
    pub fn new(width: u32, height: u32, fill: Rgba8) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; (width * height) as usize],
        }
    }

    /// Create a frame by evaluating `f(x, y)` for every pixel
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> Rgba8,
    {
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Wrap tightly packed RGBA8 bytes
    pub fn from_rgba_bytes(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != (width * height * 4) as usize {
            return None;
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when the frame has no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Rgba8] {
        &mut self.pixels
    }

    /// Tightly packed RGBA8 bytes, suitable for texture upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgba8 {
        self.pixels[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn put(&mut self, x: u32, y: u32, pixel: Rgba8) {
        let idx = (y * self.width + x) as usize;
        self.pixels[idx] = pixel;
    }

    /// Bilinear sample at normalized coordinates, clamped to the edge.
    /// Returns linear floats in [0, 1]; an empty frame samples as transparent.
    pub fn sample_bilinear(&self, u: f32, v: f32) -> [f32; 4] {
        if self.is_empty() {
            return [0.0; 4];
        }
        let (max_x, max_y) = (self.width - 1, self.height - 1);
        let fx = (u * self.width as f32 - 0.5).clamp(0.0, max_x as f32);
        let fy = (v * self.height as f32 - 0.5).clamp(0.0, max_y as f32);
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(max_x);
        let y1 = (y0 + 1).min(max_y);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let mut out = [0.0f32; 4];
        let corners = [
            (self.get(x0, y0), (1.0 - tx) * (1.0 - ty)),
            (self.get(x1, y0), tx * (1.0 - ty)),
            (self.get(x0, y1), (1.0 - tx) * ty),
            (self.get(x1, y1), tx * ty),
        ];
        for (pixel, weight) in corners {
            for c in 0..4 {
                out[c] += pixel[c] as f32 / 255.0 * weight;
            }
        }
        out
    }

    /// Mean luminance over the pixels selected by `mask`
    pub fn mean_luma_where<F>(&self, mut mask: F) -> Option<f32>
    where
        F: FnMut(u32, u32) -> bool,
    {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for y in 0..self.height {
            for x in 0..self.width {
                if mask(x, y) {
                    let [r, g, b, _] = self.get(x, y);
                    sum += 0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64;
                    count += 1;
                }
            }
        }
        (count > 0).then(|| (sum / count as f64) as f32)
    }

    /// Write the frame as an 8-bit RGBA PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create frame file: {}", path.display()))?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(self.as_bytes())?;
        Ok(())
    }
}

/// Convert a linear float color to RGBA8, clamping to range
#[inline]
pub fn to_rgba8(color: [f32; 4]) -> Rgba8 {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8)
}
