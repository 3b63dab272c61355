//! Float render targets for the software backend

/// Fully transparent black
pub const TRANSPARENT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// Value the depth buffer is cleared to (farthest)
pub const DEPTH_CLEAR: f32 = 1.0;

/// Linear RGBA f32 render target, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl Texture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![TRANSPARENT; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn clear(&mut self, color: [f32; 4]) {
        self.texels.fill(color);
    }

    /// Reallocate only when the size actually changes
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn put(&mut self, x: u32, y: u32, texel: [f32; 4]) {
        let idx = (y * self.width + x) as usize;
        self.texels[idx] = texel;
    }

    /// Nearest-neighbour sample at normalized coordinates, clamped
    #[inline]
    pub fn sample_nearest(&self, u: f32, v: f32) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return TRANSPARENT;
        }
        let x = ((u * self.width as f32).floor().max(0.0) as u32).min(self.width - 1);
        let y = ((v * self.height as f32).floor().max(0.0) as u32).min(self.height - 1);
        self.get(x, y)
    }
}

/// Single-channel depth target
#[derive(Debug, Clone)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    depth: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: vec![DEPTH_CLEAR; (width * height) as usize],
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            *self = Self::new(width, height);
        }
    }

    pub fn clear(&mut self) {
        self.depth.fill(DEPTH_CLEAR);
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.depth[(y * self.width + x) as usize]
    }

    /// Depth test with `Less`; writes and returns true when `z` passes
    #[inline]
    pub fn test_and_set(&mut self, x: u32, y: u32, z: f32) -> bool {
        let idx = (y * self.width + x) as usize;
        if z < self.depth[idx] {
            self.depth[idx] = z;
            true
        } else {
            false
        }
    }
}
