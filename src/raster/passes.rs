//! Software implementations of each render pass
//!
//! Every pass reads one target and writes another, mirroring the GPU render
//! passes one to one so both backends share the same frame structure.

use crate::frame::{to_rgba8, Frame};
use crate::geometry::MeshVertex;
use crate::landmarks::{FaceBox, PixelRect};
use crate::obfuscation::TileScramble;

use super::texture::{DepthBuffer, Texture, TRANSPARENT};
use super::triangle::{interpolate, rasterize};

/// Tile index covering texel `x` when `res` texels are split into `tiles`
#[inline]
pub fn tile_of(x: u32, res: u32, tiles: u32) -> u32 {
    (x as u64 * tiles as u64 / res as u64) as u32
}

fn to_pixels(position: [f32; 3], width: u32, height: u32) -> [f32; 2] {
    [position[0] * width as f32, position[1] * height as f32]
}

/// Pass A: video -> canonical face-space. Returns covered texels.
pub fn unwrap(video: &Frame, vertices: &[MeshVertex], canonical: &mut Texture) -> usize {
    canonical.clear(TRANSPARENT);
    let (w, h) = (canonical.width(), canonical.height());
    let mut covered = 0;

    for tri in vertices.chunks_exact(3) {
        let positions = [0, 1, 2].map(|k| to_pixels(tri[k].position, w, h));
        let sample_at = [0, 1, 2].map(|k| tri[k].tex_coords);
        covered += rasterize(positions, w, h, |x, y, weights| {
            let [u, v] = interpolate(sample_at, weights);
            let mut color = video.sample_bilinear(u, v);
            color[3] = 1.0;
            canonical.put(x, y, color);
        });
    }
    covered
}

/// Box-filter the canonical image into one texel per tile.
///
/// Alpha of each tile is its coverage fraction; color is the average over
/// covered texels only, so uncovered canonical area never darkens a tile.
pub fn downsample(canonical: &Texture, tiles: &mut Texture) {
    let (res_x, res_y) = (canonical.width(), canonical.height());
    let (tiles_u, tiles_v) = (tiles.width(), tiles.height());
    let mut sums = vec![[0.0f32; 5]; (tiles_u * tiles_v) as usize];

    for y in 0..res_y {
        let ty = tile_of(y, res_y, tiles_v);
        for x in 0..res_x {
            let tx = tile_of(x, res_x, tiles_u);
            let c = canonical.get(x, y);
            let s = &mut sums[(ty * tiles_u + tx) as usize];
            s[0] += c[0] * c[3];
            s[1] += c[1] * c[3];
            s[2] += c[2] * c[3];
            s[3] += c[3];
            s[4] += 1.0;
        }
    }

    for ty in 0..tiles_v {
        for tx in 0..tiles_u {
            let s = sums[(ty * tiles_u + tx) as usize];
            let texel = if s[3] > 0.0 {
                [s[0] / s[3], s[1] / s[3], s[2] / s[3], s[3] / s[4]]
            } else {
                TRANSPARENT
            };
            tiles.put(tx, ty, texel);
        }
    }
}

/// Tile scramble: each destination tile takes its source tile's color and
/// the destination's perturbation. An empty source falls back to the
/// destination tile itself so no covered tile turns into a hole.
pub fn scramble(tiles: &Texture, scramble: &TileScramble, out: &mut Texture) {
    let tiles_u = tiles.width();
    for ty in 0..tiles.height() {
        for tx in 0..tiles_u {
            let (sx, sy) = scramble.permutation.source_of(tx, ty);
            let source = tiles.get(sx, sy);
            let color = if source[3] > 0.0 { source } else { tiles.get(tx, ty) };
            let tile = (ty * tiles_u + tx) as usize;
            out.put(tx, ty, scramble.perturbation.apply(tile, color));
        }
    }
}

/// Nearest-neighbour upsample of the tile grid back to canonical resolution
pub fn upsample(tiles: &Texture, pixelated: &mut Texture) {
    let (res_x, res_y) = (pixelated.width(), pixelated.height());
    for y in 0..res_y {
        let ty = tile_of(y, res_y, tiles.height());
        for x in 0..res_x {
            let tx = tile_of(x, res_x, tiles.width());
            pixelated.put(x, y, tiles.get(tx, ty));
        }
    }
}

/// Pass B: pixelated canonical -> screen-space face layer with depth test.
///
/// The face layer's alpha is the silhouette mask: 1 wherever a mesh triangle
/// won the depth test, 0 elsewhere. Returns the number of fragments written.
pub fn rewrap(pixelated: &Texture, vertices: &[MeshVertex], face: &mut Texture, depth: &mut DepthBuffer) -> usize {
    face.clear(TRANSPARENT);
    depth.clear();
    let (w, h) = (face.width(), face.height());
    let mut written = 0;

    for tri in vertices.chunks_exact(3) {
        let positions = [0, 1, 2].map(|k| to_pixels(tri[k].position, w, h));
        let attrs = [0, 1, 2].map(|k| [tri[k].tex_coords[0], tri[k].tex_coords[1], tri[k].position[2]]);
        rasterize(positions, w, h, |x, y, weights| {
            let [u, v, z] = interpolate(attrs, weights);
            if depth.test_and_set(x, y, z) {
                let c = pixelated.sample_nearest(u, v);
                face.put(x, y, [c[0], c[1], c[2], 1.0]);
                written += 1;
            }
        });
    }
    written
}

/// Straight-alpha composite of the face layer over the video.
///
/// `brightness` scales face pixels only; pixels outside the mask are copied
/// from the video bit for bit.
pub fn composite(video: &Frame, face: &Texture, brightness: f32, target: &mut Frame) {
    let width = video.width();
    for (i, (out, src)) in target.pixels_mut().iter_mut().zip(video.pixels()).enumerate() {
        let i = i as u32;
        let layer = face.get(i % width, i / width);
        let a = layer[3];
        if a <= 0.0 {
            *out = *src;
            continue;
        }
        let mut mixed = [0.0f32; 4];
        for c in 0..3 {
            let background = src[c] as f32 / 255.0;
            mixed[c] = layer[c] * brightness * a + background * (1.0 - a);
        }
        mixed[3] = src[3] as f32 / 255.0;
        *out = to_rgba8(mixed);
    }
}

/// Bounding-box fallback: a fixed grid of flat blocks over `face`
pub fn pixelate_box(video: &Frame, face: FaceBox, tiles_u: u32, tiles_v: u32, target: &mut Frame) {
    target.pixels_mut().copy_from_slice(video.pixels());

    let (w, h) = video.size();
    let Some(rect) = face.pixel_rect(w, h) else {
        return;
    };
    let PixelRect { x0, y0, x1, y1 } = rect;
    let (bw, bh) = (rect.width(), rect.height());
    let (tiles_u, tiles_v) = rect.tile_grid(tiles_u, tiles_v);

    let mut sums = vec![[0u64; 5]; (tiles_u * tiles_v) as usize];
    for y in y0..y1 {
        let ty = tile_of(y - y0, bh, tiles_v);
        for x in x0..x1 {
            let tx = tile_of(x - x0, bw, tiles_u);
            let p = video.get(x, y);
            let s = &mut sums[(ty * tiles_u + tx) as usize];
            for c in 0..4 {
                s[c] += p[c] as u64;
            }
            s[4] += 1;
        }
    }

    for y in y0..y1 {
        let ty = tile_of(y - y0, bh, tiles_v);
        for x in x0..x1 {
            let tx = tile_of(x - x0, bw, tiles_u);
            let s = sums[(ty * tiles_u + tx) as usize];
            let n = s[4].max(1);
            let avg = [0, 1, 2, 3].map(|c| ((s[c] + n / 2) / n) as u8);
            target.put(x, y, avg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(depth: f32, uv: [[f32; 2]; 4], pos: [[f32; 2]; 4]) -> Vec<MeshVertex> {
        [[0, 1, 2], [1, 3, 2]]
            .iter()
            .flatten()
            .map(|&i| MeshVertex {
                position: [pos[i][0], pos[i][1], depth],
                tex_coords: uv[i],
            })
            .collect()
    }

    const UNIT: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

    #[test]
    fn test_tile_of_partitions_evenly() {
        let counts = (0..512).fold([0u32; 12], |mut acc, x| {
            acc[tile_of(x, 512, 12) as usize] += 1;
            acc
        });
        assert!(counts.iter().all(|&c| c == 42 || c == 43));
        assert_eq!(tile_of(511, 512, 12), 11);
    }

    #[test]
    fn test_downsample_averages_covered_texels_only() {
        let mut canonical = Texture::new(4, 4);
        canonical.put(0, 0, [1.0, 0.0, 0.0, 1.0]);
        canonical.put(1, 0, [0.0, 1.0, 0.0, 1.0]);
        let mut tiles = Texture::new(2, 2);
        downsample(&canonical, &mut tiles);

        let t = tiles.get(0, 0);
        assert!((t[0] - 0.5).abs() < 1e-6 && (t[1] - 0.5).abs() < 1e-6);
        assert!((t[3] - 0.5).abs() < 1e-6);
        assert_eq!(tiles.get(1, 1), TRANSPARENT);
    }

    #[test]
    fn test_upsample_is_flat_per_tile() {
        let mut tiles = Texture::new(2, 1);
        tiles.put(0, 0, [1.0, 0.0, 0.0, 1.0]);
        tiles.put(1, 0, [0.0, 0.0, 1.0, 1.0]);
        let mut out = Texture::new(8, 8);
        upsample(&tiles, &mut out);
        for y in 0..8 {
            for x in 0..8 {
                let expected = if x < 4 { tiles.get(0, 0) } else { tiles.get(1, 0) };
                assert_eq!(out.get(x, y), expected);
            }
        }
    }

    #[test]
    fn test_front_triangle_wins_regardless_of_order() {
        // Left half of the canonical texture is red, right half blue
        let mut pixelated = Texture::new(2, 1);
        pixelated.put(0, 0, [1.0, 0.0, 0.0, 1.0]);
        pixelated.put(1, 0, [0.0, 0.0, 1.0, 1.0]);

        let screen = [[0.25, 0.25], [0.75, 0.25], [0.25, 0.75], [0.75, 0.75]];
        let near = quad(0.3, [[0.0, 0.0], [0.4, 0.0], [0.0, 1.0], [0.4, 1.0]], screen);
        let far = quad(0.7, [[0.6, 0.0], [1.0, 0.0], [0.6, 1.0], [1.0, 1.0]], screen);

        for order in [[&near, &far], [&far, &near]] {
            let vertices: Vec<MeshVertex> = order.iter().flat_map(|v| v.iter().copied()).collect();
            let mut face = Texture::new(16, 16);
            let mut depth = DepthBuffer::new(16, 16);
            rewrap(&pixelated, &vertices, &mut face, &mut depth);
            assert_eq!(face.get(8, 8), [1.0, 0.0, 0.0, 1.0]);
            assert!((depth.get(8, 8) - 0.3).abs() < 1e-6);
            assert_eq!(face.get(1, 1), TRANSPARENT);
        }
    }

    #[test]
    fn test_composite_leaves_unmasked_pixels_untouched() {
        let video = Frame::from_fn(4, 4, |x, y| [x as u8 * 50, y as u8 * 50, 7, 255]);
        let mut face = Texture::new(4, 4);
        face.put(1, 1, [1.0, 1.0, 1.0, 1.0]);
        let mut out = Frame::new(4, 4, [0, 0, 0, 0]);
        composite(&video, &face, 0.0, &mut out);

        assert_eq!(out.get(1, 1), [0, 0, 0, 255]);
        for (x, y) in [(0, 0), (3, 2), (1, 3)] {
            assert_eq!(out.get(x, y), video.get(x, y));
        }
    }

    #[test]
    fn test_unwrap_fills_canonical_from_video() {
        let video = Frame::new(8, 8, [255, 0, 0, 255]);
        let vertices = quad(0.0, [[0.2, 0.2], [0.8, 0.2], [0.2, 0.8], [0.8, 0.8]], UNIT);
        let mut canonical = Texture::new(8, 8);
        assert_eq!(unwrap(&video, &vertices, &mut canonical), 64);
        assert_eq!(canonical.get(3, 5), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_pixelate_box_flattens_blocks_inside_box() {
        let video = Frame::from_fn(8, 8, |x, y| [(x * 30) as u8, (y * 30) as u8, 0, 255]);
        let mut out = Frame::new(8, 8, [0, 0, 0, 0]);
        pixelate_box(&video, FaceBox::new(0.0, 0.0, 0.5, 0.5), 2, 2, &mut out);

        assert_eq!(out.get(0, 0), out.get(1, 1));
        assert_ne!(out.get(0, 0), out.get(2, 0));
        assert_eq!(out.get(5, 5), video.get(5, 5));
    }
}
